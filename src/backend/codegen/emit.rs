impl UnitBackend {
    /// 定义一个函数体（lowering 协作者在外面填好 `cctx.func`）。
    /// 按需捕获 CLIF 文本与机器码反汇编。
    pub fn define_function(
        &mut self,
        fid: FuncId,
        cctx: &mut cranelift_codegen::Context,
    ) -> Result<()> {
        if self.want_clif {
            self.clif_text.push_str(&cctx.func.display().to_string());
            self.clif_text.push('\n');
        }
        cctx.set_disasm(self.want_asm);
        self.module
            .define_function(fid, cctx)
            .map_err(|e| anyhow!("define function: {e}"))?;
        if self.want_asm {
            if let Some(code) = cctx.compiled_code() {
                if let Some(vcode) = &code.vcode {
                    self.asm_text.push_str(vcode);
                    self.asm_text.push('\n');
                }
            }
        }
        Ok(())
    }

    /// 收尾：物化全局变量并产出目标文件字节。
    pub fn finish(mut self) -> Result<UnitOutput> {
        self.materialize_globals()?;
        let product = self.module.finish();
        let bytes = product.emit().map_err(|e| anyhow!("emit object: {e}"))?;
        Ok(UnitOutput {
            object: bytes,
            asm: self.asm_text,
            clif: self.clif_text,
        })
    }
}

/// 一个编译单元的最终产物
pub struct UnitOutput {
    pub object: Vec<u8>,
    pub asm: String,
    pub clif: String,
}
