// src/backend/reconcile.rs
//! 合并模块（reconciled module）与跨目标全局变量收编。
//!
//! 多目标构建里，第一个编译成功的目标贡献每个外部链接全局的
//! 规范定义；后续目标只做结构兼容检查。各单元自己的定义一律降级
//! 为外部引用，避免多个目标文件与分发模块重复定义同名符号。

use anyhow::{Result, anyhow, bail};
use cranelift_codegen::ir::Signature;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module, default_libcall_names};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::backend::abi::LayoutTy;
use crate::backend::codegen::{UnitBackend, UnitOutput};
use crate::backend::target::{OptLevel, TargetSpec, build_isa};
use crate::diag::{DiagSink, SourceMap, Span, codes};
use crate::utils::fast::{FastMap, FastSet, fast_map, fast_set};

/// 分发支持库的符号名。支持库（lanert）按宿主 OS 构建成静态库，
/// 链接期补上这些定义。
pub const SET_ISA_FN: &str = "__lane_set_system_isa";
pub const BEST_ISA_GLOBAL: &str = "__lane_system_best_isa";

/// 一个被收编进合并模块的全局变量（规范定义）
#[derive(Clone, Debug)]
pub struct ReconGlobal {
    pub layout: LayoutTy,
    pub bytes: Vec<u8>,
    pub writable: bool,
    pub span: Span,
}

/// 合并模块：规范全局定义 + 全部 dispatch 蹦床。
/// 初始只含从支持库引入的运行期符号。
pub struct DispatchModule {
    pub(crate) module: ObjectModule,

    globals: Vec<String>, // 收编顺序
    g_index: FastMap<String, ReconGlobal>,
    referenced: FastSet<String>,

    pub(crate) set_isa_func: FuncId,
    pub(crate) best_isa_data: DataId,
    pub(crate) abort_func: FuncId,

    pub(crate) trampolines: Vec<String>,
    pub(crate) want_asm: bool,
    pub(crate) want_clif: bool,
    pub(crate) asm_text: String,
    pub(crate) clif_text: String,
}

impl DispatchModule {
    /// 以“已编译目标里能力最低的那个”为目标机创建合并模块——
    /// 它是所有目标的公共下界，生成的蹦床在哪个目标上都能跑。
    pub fn new(spec: &TargetSpec, opt: OptLevel, pic: bool) -> Result<Self> {
        let isa = build_isa(spec, opt, pic, None)?;
        let obj = ObjectBuilder::new(isa, "lane_dispatch".to_string(), default_libcall_names())?;
        let mut module = ObjectModule::new(obj);

        let void_sig = Signature::new(module.isa().default_call_conv());
        let set_isa_func = module.declare_function(SET_ISA_FN, Linkage::Import, &void_sig)?;
        let best_isa_data = module.declare_data(BEST_ISA_GLOBAL, Linkage::Import, true, false)?;
        let abort_func = module.declare_function("abort", Linkage::Import, &void_sig)?;

        Ok(Self {
            module,
            globals: Vec::new(),
            g_index: fast_map(),
            referenced: fast_set(),
            set_isa_func,
            best_isa_data,
            abort_func,
            trampolines: Vec::new(),
            want_asm: false,
            want_clif: false,
            asm_text: String::new(),
            clif_text: String::new(),
        })
    }

    pub fn set_capture(&mut self, asm: bool, clif: bool) {
        self.want_asm = asm;
        self.want_clif = clif;
    }

    pub fn global(&self, name: &str) -> Option<&ReconGlobal> {
        self.g_index.get(name)
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// 已发射的蹦床名（发射顺序）
    pub fn trampolines(&self) -> &[String] {
        &self.trampolines
    }

    /// 从一个编译完的单元提取（首个单元）或核对（后续单元）全局变量。
    ///
    /// 只处理“外部链接且有定义”的全局；static 与纯 extern 声明留在单元里。
    /// 后续单元出现首单元没有的全局属于内部不变量破坏，直接当工具错误抛出。
    /// 布局对不上只告警：varying 全局跨 lane 宽度尺寸本来就会变。
    pub fn extract_or_check_globals(
        &mut self,
        unit: &mut UnitBackend,
        sm: &SourceMap,
        diags: &mut DiagSink,
        check: bool,
    ) -> Result<()> {
        let extracted: Vec<_> = unit
            .globals()
            .filter(|g| g.is_extractable())
            .map(|g| {
                (
                    g.name.clone(),
                    ReconGlobal {
                        layout: g.layout.clone(),
                        bytes: g.init.clone().unwrap_or_default(),
                        writable: g.writable,
                        span: g.span,
                    },
                )
            })
            .collect();

        for (name, g) in extracted {
            if check {
                let Some(existing) = self.g_index.get(&name) else {
                    bail!("global `{}` appeared on a later target but not on the first", name);
                };
                if !compatible(&existing.layout, &g.layout) {
                    let file = sm.name(g.span.file).to_string();
                    diags.warn(
                        codes::GLOBAL_LAYOUT_MISMATCH,
                        &file,
                        Some(g.span),
                        format!(
                            "mismatch in size/layout of global variable `{}` with different targets; \
                             globals must not include `varying` types or arrays sized by the lane count \
                             when compiling to targets with differing vector widths",
                            name
                        ),
                    );
                }
            } else {
                // 不变量：合并模块里每个名字至多一份定义
                if self.g_index.insert(name.clone(), g).is_none() {
                    self.globals.push(name.clone());
                }
            }
            unit.demote_global(&name);
            self.referenced.insert(name);
        }
        Ok(())
    }

    /// 蹦床全部发射后的模块级收尾：
    /// 丢掉没有任何引用方的全局（模块范围的死代码清理），
    /// 再复核内部一致性——不一致是合成器自身的 bug，按致命错误处理。
    pub fn run_cleanup(&mut self) -> Result<()> {
        self.globals.retain(|n| self.referenced.contains(n));
        self.g_index.retain(|n, _| self.referenced.contains(n));

        for name in &self.globals {
            let g = &self.g_index[name];
            if g.bytes.len() != g.layout.size() as usize {
                bail!(
                    "reconciled module self-check failed: global `{}` has {} bytes for a {}-byte layout",
                    name,
                    g.bytes.len(),
                    g.layout.size()
                );
            }
        }
        Ok(())
    }

    /// 物化规范全局定义并产出合并模块的目标文件
    pub fn finish(mut self) -> Result<UnitOutput> {
        for name in std::mem::take(&mut self.globals) {
            let g = self.g_index.remove(&name).expect("indexed global");
            let id = self
                .module
                .declare_data(&name, Linkage::Export, g.writable, false)?;
            let mut dc = DataDescription::new();
            dc.define(g.bytes.into_boxed_slice());
            dc.set_align(g.layout.align().max(1) as u64);
            self.module.define_data(id, &dc)?;
        }
        let product = self.module.finish();
        let bytes = product.emit().map_err(|e| anyhow!("emit dispatch object: {e}"))?;
        Ok(UnitOutput {
            object: bytes,
            asm: self.asm_text,
            clif: self.clif_text,
        })
    }
}

/// IR 级结构兼容：标量/指针精确相等；数组比长度再递归元素；
/// struct 要布局完全一致。对称且自反。
pub fn compatible(a: &LayoutTy, b: &LayoutTy) -> bool {
    match (a, b) {
        (LayoutTy::Scalar(x), LayoutTy::Scalar(y)) => x == y,
        (LayoutTy::Vector(x, n), LayoutTy::Vector(y, m)) => x == y && n == m,
        (LayoutTy::Ptr, LayoutTy::Ptr) => true,
        (LayoutTy::Array(ea, na), LayoutTy::Array(eb, nb)) => na == nb && compatible(ea, eb),
        (
            LayoutTy::Struct { fields: fa, size: sa, align: aa },
            LayoutTy::Struct { fields: fb, size: sb, align: ab },
        ) => {
            sa == sb
                && aa == ab
                && fa.len() == fb.len()
                && fa
                    .iter()
                    .zip(fb.iter())
                    .all(|((oa, ta), (ob, tb))| oa == ob && compatible(ta, tb))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::types;

    fn vec4() -> LayoutTy {
        LayoutTy::Vector(types::F32, 4)
    }

    fn vec8() -> LayoutTy {
        LayoutTy::Vector(types::F32, 8)
    }

    #[test]
    fn compatible_is_reflexive_and_symmetric() {
        let s = LayoutTy::Struct {
            fields: vec![(0, LayoutTy::Scalar(types::I32)), (8, LayoutTy::Ptr)],
            size: 16,
            align: 8,
        };
        for t in [LayoutTy::Scalar(types::I64), LayoutTy::Ptr, vec4(), s] {
            assert!(compatible(&t, &t));
        }
        assert_eq!(compatible(&vec4(), &vec8()), compatible(&vec8(), &vec4()));
    }

    #[test]
    fn arrays_of_different_length_never_match() {
        let a = LayoutTy::Array(Box::new(LayoutTy::Scalar(types::I32)), 4);
        let b = LayoutTy::Array(Box::new(LayoutTy::Scalar(types::I32)), 8);
        assert!(!compatible(&a, &b));
    }

    #[test]
    fn lane_width_changes_break_compatibility() {
        assert!(!compatible(&vec4(), &vec8()));
        assert!(!compatible(&vec4(), &LayoutTy::Scalar(types::F32)));
    }
}
