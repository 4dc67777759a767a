// src/backend/dispatch.rs
//! 运行期分发蹦床的合成。
//!
//! 每个导出函数名对应一张“ISA -> 该目标编译出的变体”表；这里为每个
//! 名字在合并模块里发射一个对外可见的蹦床：运行期探测硬件能力，
//! 从高到低找第一个可用变体转发过去，全都不可用则中止进程。

use anyhow::{Result, anyhow, bail};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{InstBuilder, MemFlags, TrapCode, types};
use cranelift_codegen::verifier::verify_function;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{Linkage, Module};
use std::collections::BTreeMap;

use crate::backend::abi::clif_signature;
use crate::backend::reconcile::DispatchModule;
use crate::backend::target::Isa;
use crate::frontend::ast::{AtomicKind, FnSig, Ty};
use crate::middle::symtab::SymbolTable;
use crate::utils::fast::SmallVec8;

/// 一个目标上编译出的导出函数变体
#[derive(Clone, Debug)]
pub struct FuncVariant {
    pub mangled: String,
    pub sig: FnSig,
}

/// 导出函数名 -> 按 ISA 索引的变体表。
/// 表是稀疏的：某个 ISA 没编译就没有对应键。
pub type TargetVariantMap = BTreeMap<String, BTreeMap<Isa, FuncVariant>>;

/// 把一个单元符号表里的导出函数并进变体表（驱动循环里逐目标调用）
pub fn collect_exported_functions(symtab: &SymbolTable, isa: Isa, map: &mut TargetVariantMap) {
    for sym in symtab.exported_functions() {
        let (Some(sig), Some(mangled)) = (sym.fn_sig(), sym.mangled()) else {
            continue;
        };
        map.entry(sym.name.clone()).or_default().insert(
            isa,
            FuncVariant { mangled: mangled.to_string(), sig: sig.clone() },
        );
    }
}

/// 统一调用签名：任取一个变体为基线；指向 varying 数据的指针参数
/// 的具体布局随目标 lane 宽度变化，没有一个在所有目标上都成立的
/// 具体指针类型，统一签名里改写成不透明字节指针。
pub fn unify_signature(variants: &BTreeMap<Isa, FuncVariant>) -> Option<FnSig> {
    let mut unified = variants.values().next()?.sig.clone();
    for (j, p) in unified.params.iter_mut().enumerate() {
        let rewrite = variants.values().any(|v| {
            matches!(&v.sig.params.get(j).map(|q| &q.ty), Some(Ty::Ptr(base, _)) if base.is_varying())
        });
        if rewrite {
            p.ty = Ty::uniform_ptr(Ty::uniform(AtomicKind::UInt8));
        }
    }
    Some(unified)
}

impl DispatchModule {
    /// 为变体表里的每个导出名发射蹦床，然后做模块级收尾清理与自检。
    pub fn emit_dispatch(&mut self, map: &TargetVariantMap) -> Result<()> {
        for (name, variants) in map {
            if variants.is_empty() {
                continue;
            }
            self.create_dispatch_function(name, variants)?;
        }
        self.run_cleanup()
    }

    fn create_dispatch_function(
        &mut self,
        name: &str,
        variants: &BTreeMap<Isa, FuncVariant>,
    ) -> Result<()> {
        let unified = unify_signature(variants).expect("non-empty variant table");
        let clif_sig = clif_signature(&unified, self.module.isa().default_call_conv());

        // 变体的真实定义在别的编译单元/目标文件里；这里按统一签名
        // 插入类型一致的 extern 声明，跨 lane 宽度强制同一视图。
        let mut targets: SmallVec8<(Isa, cranelift_module::FuncId)> = SmallVec8::new();
        for (isa, v) in variants {
            let fid = self
                .module
                .declare_function(&v.mangled, Linkage::Import, &clif_sig)
                .map_err(|e| anyhow!("declare target variant `{}`: {e}", v.mangled))?;
            targets.push((*isa, fid));
        }

        // 蹦床本体：对外名字就是原始导出名
        let dispatch_id = self
            .module
            .declare_function(name, Linkage::Export, &clif_sig)
            .map_err(|e| anyhow!("declare dispatch function `{}`: {e}", name))?;

        let mut cctx = self.module.make_context();
        cctx.func.signature = clif_sig.clone();
        let mut fb_ctx = FunctionBuilderContext::new();
        let mut b = FunctionBuilder::new(&mut cctx.func, &mut fb_ctx);

        let entry = b.create_block();
        b.append_block_params_for_function_params(entry);
        b.switch_to_block(entry);
        b.seal_block(entry);
        let args: Vec<_> = b.block_params(entry).to_vec();

        // 先确保能力探测跑过（幂等，结果缓存在支持库的进程级状态里），
        // 再读出“系统最佳 ISA”枚举值
        let set_isa = self.module.declare_func_in_func(self.set_isa_func, b.func);
        b.ins().call(set_isa, &[]);
        let best_gv = self.module.declare_data_in_func(self.best_isa_data, b.func);
        let ptr_ty = self.module.target_config().pointer_type();
        let best_addr = b.ins().global_value(ptr_ty, best_gv);
        let system_isa = b.ins().load(types::I32, MemFlags::trusted(), best_addr, 0);

        // 从最高能力档往下试：第一个命中的分支就是当前硬件上
        // 最优化的那个变体——这正是降序测试的全部意义
        for (isa, fid) in targets.iter().rev() {
            let cand = b.ins().iconst(types::I32, isa.index() as i64);
            let ok = b.ins().icmp(IntCC::SignedGreaterThanOrEqual, system_isa, cand);
            let call_block = b.create_block();
            let next_block = b.create_block();
            b.ins().brif(ok, call_block, &[], next_block, &[]);

            b.switch_to_block(call_block);
            b.seal_block(call_block);
            let callee = self.module.declare_func_in_func(*fid, b.func);
            // 参数按位置透传。统一签名与目标签名在第 1 步改写过的
            // 指针位上语义类型不同，但在这套 IR 里指针表示同宽，
            // 表示层转换是零开销的恒等
            let call = b.ins().call(callee, &args);
            let results = b.inst_results(call).to_vec();
            b.ins().return_(&results);

            b.switch_to_block(next_block);
            b.seal_block(next_block);
        }

        // 所有变体都跑不了：硬件低于编译基线，故意致命而不是静默降级
        let abort = self.module.declare_func_in_func(self.abort_func, b.func);
        b.ins().call(abort, &[]);
        b.ins().trap(TrapCode::unwrap_user(1));

        b.finalize();

        if self.want_clif {
            self.clif_text.push_str(&cctx.func.display().to_string());
            self.clif_text.push('\n');
        }

        // 自检失败说明是合成器自己的 bug，按致命工具错误上抛
        if let Err(errors) = verify_function(&cctx.func, self.module.isa()) {
            bail!("dispatch trampoline `{}` failed verification:\n{}", name, errors);
        }

        cctx.set_disasm(self.want_asm);
        self.module
            .define_function(dispatch_id, &mut cctx)
            .map_err(|e| anyhow!("define dispatch function `{}`: {e}", name))?;
        if self.want_asm {
            if let Some(code) = cctx.compiled_code() {
                if let Some(vcode) = &code.vcode {
                    self.asm_text.push_str(vcode);
                    self.asm_text.push('\n');
                }
            }
        }
        self.module.clear_context(&mut cctx);
        self.trampolines.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target::{self, OptLevel};
    use crate::frontend::ast::Param;
    use crate::frontend::span::Span;

    fn exported_sig(params: Vec<Ty>) -> FnSig {
        FnSig {
            params: params
                .into_iter()
                .enumerate()
                .map(|(i, ty)| Param { name: format!("p{}", i), ty, default: None, span: Span::DUMMY })
                .collect(),
            ret: Ty::Void,
            exported: true,
            extern_c: false,
            is_task: false,
            inline: false,
        }
    }

    fn variants_for(sig: &FnSig, isas: &[Isa]) -> BTreeMap<Isa, FuncVariant> {
        isas.iter()
            .map(|&isa| {
                (isa, FuncVariant { mangled: format!("f$x_{}", isa.name()), sig: sig.clone() })
            })
            .collect()
    }

    #[test]
    fn unify_rewrites_pointer_to_varying_as_byte_pointer() {
        let sig = exported_sig(vec![
            Ty::uniform(AtomicKind::Float),
            Ty::uniform_ptr(Ty::varying(AtomicKind::Float)),
            Ty::uniform_ptr(Ty::uniform(AtomicKind::Float)),
        ]);
        let unified = unify_signature(&variants_for(&sig, &[Isa::Sse2, Isa::Avx2])).unwrap();
        assert_eq!(unified.params[0].ty, Ty::uniform(AtomicKind::Float));
        assert_eq!(unified.params[1].ty, Ty::uniform_ptr(Ty::uniform(AtomicKind::UInt8)));
        assert_eq!(unified.params[2].ty, Ty::uniform_ptr(Ty::uniform(AtomicKind::Float)));
    }

    #[test]
    fn variant_tables_tolerate_sparse_slots() {
        let sig = exported_sig(vec![]);
        let v = variants_for(&sig, &[Isa::Sse41, Isa::Avx512]);
        assert!(unify_signature(&v).is_some());
        // 降序遍历顺序：avx512 先于 sse4
        let order: Vec<Isa> = v.keys().rev().copied().collect();
        assert_eq!(order, vec![Isa::Avx512, Isa::Sse41]);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn emits_verified_trampolines() {
        let spec = *target::lookup("sse2").unwrap();
        let mut dm = DispatchModule::new(&spec, OptLevel::None, true).unwrap();
        let sig = exported_sig(vec![
            Ty::uniform(AtomicKind::Int32),
            Ty::uniform_ptr(Ty::varying(AtomicKind::Float)),
        ]);
        let mut map = TargetVariantMap::new();
        map.insert("kernel".into(), variants_for(&sig, &[Isa::Sse2, Isa::Avx2]));
        dm.emit_dispatch(&map).unwrap();
        let out = dm.finish().unwrap();
        assert!(!out.object.is_empty());
    }
}
