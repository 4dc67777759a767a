impl UnitBackend {
    /// 为一个函数声明建立可调用工件。符号名由调用方定（mangle 规则在
    /// 声明检查器里），这里只负责 CLIF 签名与模块登记。
    /// 同名重复声明直接复用既有 FuncId。
    pub fn declare_function(
        &mut self,
        mangled: &str,
        sig: &FnSig,
        linkage: Linkage,
    ) -> Result<FuncId> {
        if let Some(&id) = self.fn_ids.get(mangled) {
            return Ok(id);
        }
        let clif_sig = abi::clif_signature(sig, self.module.isa().default_call_conv());
        let id = self
            .module
            .declare_function(mangled, linkage, &clif_sig)
            .map_err(|e| anyhow!("declare `{}`: {e}", mangled))?;
        self.fn_ids.insert(mangled.to_string(), id);
        Ok(id)
    }
}
