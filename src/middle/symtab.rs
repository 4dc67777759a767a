// src/middle/symtab.rs
//! 符号表：全局变量、函数重载集、类型别名与导出类型列表。
//!
//! 符号本体放在 arena 里，`SymbolId` 即下标；一个编译单元一张表，
//! 生命周期与单元一致。

use cranelift_module::FuncId;

use crate::diag::Span;
use crate::frontend::ast::{FnSig, StorageClass, Ty};
use crate::middle::fold::ConstValue;
use crate::utils::fast::{FastMap, fast_map};

pub type SymbolId = u32;

/// 编译单元内全局变量数据的句柄（后端全局表下标）
pub type GlobalId = u32;

/// 符号关联的已生成 IR 工件
#[derive(Clone, Debug)]
pub enum Artifact {
    Global(GlobalId),
    Func { id: FuncId, mangled: String },
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub ty: Ty,
    pub storage: StorageClass,
    pub span: Span,
    pub const_value: Option<ConstValue>,
    pub artifact: Option<Artifact>,
    /// 指针/引用参数的 no-alias 约定（函数符号用；任务函数首个隐式参数恒为 true）
    pub noalias_params: Vec<bool>,
}

impl Symbol {
    pub fn new(name: String, ty: Ty, storage: StorageClass, span: Span) -> Self {
        Symbol {
            name,
            ty,
            storage,
            span,
            const_value: None,
            artifact: None,
            noalias_params: Vec::new(),
        }
    }

    pub fn fn_sig(&self) -> Option<&FnSig> {
        match &self.ty {
            Ty::Func(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn mangled(&self) -> Option<&str> {
        match &self.artifact {
            Some(Artifact::Func { mangled, .. }) => Some(mangled),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
    vars: FastMap<String, SymbolId>,
    funcs: FastMap<String, Vec<SymbolId>>,
    aliases: FastMap<String, (Ty, Span)>,
    exported_types: Vec<(Ty, Span)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            syms: Vec::new(),
            vars: fast_map(),
            funcs: fast_map(),
            aliases: fast_map(),
            exported_types: Vec::new(),
        }
    }

    pub fn sym(&self, id: SymbolId) -> &Symbol {
        &self.syms[id as usize]
    }

    pub fn sym_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.syms[id as usize]
    }

    // —— 全局变量 —— //

    pub fn add_variable(&mut self, sym: Symbol) -> SymbolId {
        let id = self.syms.len() as SymbolId;
        self.vars.insert(sym.name.clone(), id);
        self.syms.push(sym);
        id
    }

    pub fn lookup_variable_id(&self, name: &str) -> Option<SymbolId> {
        self.vars.get(name).copied()
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&Symbol> {
        self.lookup_variable_id(name).map(|id| self.sym(id))
    }

    // —— 函数与重载集 —— //

    pub fn add_function(&mut self, sym: Symbol) -> SymbolId {
        let id = self.syms.len() as SymbolId;
        self.funcs.entry(sym.name.clone()).or_default().push(id);
        self.syms.push(sym);
        id
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.funcs.get(name).is_some_and(|v| !v.is_empty())
    }

    pub fn function_overloads(&self, name: &str) -> &[SymbolId] {
        self.funcs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 按“参数类型完全一致”找函数（定义落到声明上时用）
    pub fn lookup_function_exact(&self, name: &str, sig: &FnSig) -> Option<SymbolId> {
        self.function_overloads(name)
            .iter()
            .copied()
            .find(|&id| self.sym(id).fn_sig().is_some_and(|s| s.same_params(sig)))
    }

    /// 满足谓词的全部函数符号（导出函数、extern "C" 函数列举用）
    pub fn matching_functions<F: Fn(&Symbol) -> bool>(&self, pred: F) -> Vec<&Symbol> {
        let mut out: Vec<&Symbol> = self
            .funcs
            .values()
            .flatten()
            .map(|&id| self.sym(id))
            .filter(|s| pred(s))
            .collect();
        // FastMap 无序，按声明位置排稳
        out.sort_by_key(|s| (s.span.file.0, s.span.start, s.name.clone()));
        out
    }

    pub fn exported_functions(&self) -> Vec<&Symbol> {
        self.matching_functions(|s| s.fn_sig().is_some_and(|f| f.exported))
    }

    pub fn extern_c_functions(&self) -> Vec<&Symbol> {
        self.matching_functions(|s| s.fn_sig().is_some_and(|f| f.extern_c))
    }

    // —— 类型别名与导出类型 —— //

    /// 返回与 name 冲突的既有别名（类型不同）；成功登记返回 None
    pub fn add_alias(&mut self, name: &str, ty: Ty, span: Span) -> Option<(Ty, Span)> {
        if let Some((prev, pspan)) = self.aliases.get(name) {
            if *prev != ty {
                return Some((prev.clone(), *pspan));
            }
            return None;
        }
        self.aliases.insert(name.to_string(), (ty, span));
        None
    }

    pub fn lookup_alias(&self, name: &str) -> Option<&Ty> {
        self.aliases.get(name).map(|(t, _)| t)
    }

    pub fn add_exported_type(&mut self, ty: Ty, span: Span) {
        self.exported_types.push((ty, span));
    }

    pub fn exported_types(&self) -> &[(Ty, Span)] {
        &self.exported_types
    }
}
