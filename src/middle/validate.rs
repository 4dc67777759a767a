// src/middle/validate.rs
//! 声明检查器：对外部前端送来的每个全局声明做语言规则校验，
//! 通过后登记符号并在当前编译单元的 IR 模块里建立工件。
//!
//! 错误策略：用户错误写入 DiagSink 后尽量继续（跳过出错的符号），
//! 让一趟解析能攒出更多诊断；内部错误走 `anyhow::Result` 往上抛。
//! 依赖值因早前的解析错误缺失时静默返回，不重复报错。

use anyhow::Result;
use cranelift_module::Linkage;

use crate::backend::abi::{encode_const, layout_of};
use crate::backend::codegen::{DebugGlobal, GlobalDef, PendingBody, UnitBackend};
use crate::backend::mangle;
use crate::diag::{DiagSink, SourceMap, Span, codes};
use crate::driver::BuildContext;
use crate::frontend::ast::{
    Body, Expr, FnSig, Item, Program, StorageClass, Ty, Variability,
};
use crate::middle::fold::{self, ConstValue};
use crate::middle::symtab::{Artifact, Symbol, SymbolTable};

pub struct Validator<'a> {
    pub ctx: &'a BuildContext,
    pub symtab: &'a mut SymbolTable,
    pub be: &'a mut UnitBackend,
    pub diags: &'a mut DiagSink,
    pub sm: &'a SourceMap,
}

impl<'a> Validator<'a> {
    pub fn new(
        ctx: &'a BuildContext,
        symtab: &'a mut SymbolTable,
        be: &'a mut UnitBackend,
        diags: &'a mut DiagSink,
        sm: &'a SourceMap,
    ) -> Self {
        Validator { ctx, symtab, be, diags, sm }
    }

    fn err(&mut self, code: &str, span: Span, msg: impl Into<String>) {
        let file = self.sm.name(span.file).to_string();
        self.diags.error(code, &file, Some(span), msg);
    }

    fn warn(&mut self, code: &str, span: Span, msg: impl Into<String>) {
        let file = self.sm.name(span.file).to_string();
        self.diags.warn(code, &file, Some(span), msg);
    }

    /// 逐条消费声明事件流
    pub fn walk_program(&mut self, prog: &Program) -> Result<()> {
        for item in &prog.items {
            match item {
                Item::Global { name, ty, init, is_const, storage, span } => {
                    self.add_global_variable(name, ty.clone(), init.as_ref(), *is_const, *storage, *span)?;
                }
                Item::FnDecl { name, sig, storage, is_noinline, span } => {
                    self.add_function_declaration(name, sig.clone(), *storage, *is_noinline, *span)?;
                }
                Item::FnDef { name, sig, body, span } => {
                    // 前端允许只送定义；声明是幂等的
                    self.add_function_declaration(name, sig.clone(), StorageClass::Default, false, *span)?;
                    self.define_function_body(name, sig, body, *span);
                }
                Item::ExportType { ty, span } => {
                    self.add_exported_type(ty.clone(), *span);
                }
                Item::TypeAlias { name, ty, span } => {
                    self.add_type_alias(name, ty.clone(), *span);
                }
            }
        }
        Ok(())
    }

    // —— 全局变量 —— //

    pub fn add_global_variable(
        &mut self,
        name: &str,
        ty: Ty,
        init: Option<&Expr>,
        is_const: bool,
        storage: StorageClass,
        span: Span,
    ) -> Result<()> {
        // 解析早已报错时的级联产物，静默返回
        if name.is_empty() {
            return Ok(());
        }

        if self.symtab.has_function(name) {
            self.err(
                codes::SHADOWING,
                span,
                format!("global variable `{}` shadows previously-declared function", name),
            );
            return Ok(());
        }

        if storage == StorageClass::ExternC {
            self.err(
                codes::QUALIFIER,
                span,
                "foreign-linkage qualifier can only be used for functions",
            );
            return Ok(());
        }

        if ty.is_void() {
            self.err(codes::QUALIFIER, span, "`void` type global variable is illegal");
            return Ok(());
        }

        // 未定长数组靠初始化器定尺寸
        let ty = match resolve_unsized(&ty, init) {
            Some(t) => t,
            None => {
                self.err(
                    codes::UNSIZED_ARRAY,
                    span,
                    format!(
                        "global variable `{}` has unsized array dimensions that aren't set by an initializer",
                        name
                    ),
                );
                return Ok(());
            }
        };

        let Some(layout) = layout_of(&ty, self.be.width()) else {
            // 类型本身没有数据布局（级联错误）
            return Ok(());
        };

        // 初始化器：必须折成编译期常量；折不出来就报错并退化为零值
        let is_extern = storage == StorageClass::Extern;
        let mut const_value: Option<ConstValue> = None;
        if is_extern {
            if init.is_some() {
                self.err(
                    codes::EXTERN_INIT,
                    span,
                    format!("initializer can't be provided with `extern` global variable `{}`", name),
                );
            }
        } else if let Some(expr) = init {
            match fold::fold(expr, self.symtab) {
                Some(folded) => match fold::convert(&folded, &ty) {
                    Some(v) => const_value = Some(v),
                    None => {
                        self.err(
                            codes::BAD_INIT,
                            expr.span(),
                            format!(
                                "initializer for `{}` cannot be converted to type `{}`",
                                name,
                                ty.display()
                            ),
                        );
                    }
                },
                None => {
                    self.err(
                        codes::NONCONST_INIT,
                        expr.span(),
                        format!("initializer for global variable `{}` must be a constant", name),
                    );
                }
            }
        }

        // 重声明/重定义规则
        if let Some(prev_id) = self.symtab.lookup_variable_id(name) {
            let prev = self.symtab.sym(prev_id).clone();
            let storage_ok = prev.storage == storage
                || prev.storage == StorageClass::Extern
                || storage == StorageClass::Extern;
            if prev.ty != ty || !storage_ok {
                let prev_at = format!(
                    "{}:{}",
                    self.sm.name(prev.span.file),
                    self.sm.line_of(prev.span)
                );
                self.err(
                    codes::CONFLICTING_DECL,
                    span,
                    format!("declaration of variable `{}` conflicts with declaration at {}", name, prev_at),
                );
                return Ok(());
            }

            let prev_defined = self
                .be
                .global(name)
                .is_some_and(|g| g.init.is_some())
                && prev.storage != StorageClass::Extern;
            if prev_defined && !is_extern {
                let prev_at = format!(
                    "{}:{}",
                    self.sm.name(prev.span.file),
                    self.sm.line_of(prev.span)
                );
                self.err(
                    codes::REDEFINITION,
                    span,
                    format!("redefinition of variable `{}` is illegal (previous definition at {})", name, prev_at),
                );
                return Ok(());
            }

            if !is_extern {
                // 声明落成定义：原地替换，所有既有引用指向最终定义
                let mut bytes = vec![0u8; layout.size() as usize];
                encode_const(const_value.as_ref(), &layout, &mut bytes);
                let gid = self.be.upsert_global(GlobalDef {
                    name: name.to_string(),
                    ty: ty.clone(),
                    layout,
                    init: Some(bytes),
                    writable: !is_const,
                    storage,
                    span,
                    demoted: false,
                });
                let sym = self.symtab.sym_mut(prev_id);
                sym.storage = storage;
                sym.span = span;
                sym.const_value = const_value;
                sym.artifact = Some(Artifact::Global(gid));
            }
            // extern 再声明落在已有定义上：什么都不用做，仍是一份定义
        } else {
            let mut def = GlobalDef {
                name: name.to_string(),
                ty: ty.clone(),
                layout: layout.clone(),
                init: None,
                writable: !is_const,
                storage,
                span,
                demoted: false,
            };
            if !is_extern {
                let mut bytes = vec![0u8; layout.size() as usize];
                encode_const(const_value.as_ref(), &layout, &mut bytes);
                def.init = Some(bytes);
            }
            let gid = self.be.upsert_global(def);
            let mut sym = Symbol::new(name.to_string(), ty.clone(), storage, span);
            sym.const_value = const_value;
            sym.artifact = Some(Artifact::Global(gid));
            self.symtab.add_variable(sym);
        }

        if self.ctx.debug_info {
            let line = self.sm.line_of(span);
            self.be.record_debug_global(DebugGlobal {
                name: name.to_string(),
                line,
                ty: ty.display(),
            });
        }
        Ok(())
    }

    // —— 函数声明 —— //

    pub fn add_function_declaration(
        &mut self,
        name: &str,
        mut sig: FnSig,
        storage: StorageClass,
        is_noinline: bool,
        span: Span,
    ) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        if storage == StorageClass::ExternC {
            sig.extern_c = true;
        }

        if self.symtab.lookup_variable(name).is_some() {
            self.err(
                codes::SHADOWING,
                span,
                format!("function `{}` shadows previously-declared global variable; ignoring this declaration", name),
            );
            return Ok(());
        }

        // 重载集扫描
        for &prev_id in self.symtab.function_overloads(name).to_vec().iter() {
            let prev = self.symtab.sym(prev_id).clone();
            let Some(prev_sig) = prev.fn_sig() else { continue };

            // 完全一致的再声明是幂等的成功
            if full_sig_equal(prev_sig, &sig) {
                return Ok(());
            }

            let prev_at = format!(
                "{}:{}",
                self.sm.name(prev.span.file),
                self.sm.line_of(prev.span)
            );

            if sig.exported || prev_sig.exported {
                self.err(
                    codes::EXPORT_OVERLOAD,
                    span,
                    format!(
                        "illegal to provide `export` qualifier for functions with the same name but different types (previous declaration at {})",
                        prev_at
                    ),
                );
            }

            if prev_sig.same_params(&sig) && prev_sig.ret != sig.ret {
                self.err(
                    codes::RETURN_OVERLOAD,
                    span,
                    format!(
                        "illegal to overload function `{}` by return type only; previous declaration at {} returns `{}`",
                        name,
                        prev_at,
                        prev_sig.ret.display()
                    ),
                );
                return Ok(());
            }
        }

        if sig.extern_c {
            if sig.is_task {
                self.err(
                    codes::TASK_LINKAGE,
                    span,
                    format!("`task` qualifier is illegal with foreign-linkage function `{}`; ignoring this function", name),
                );
                return Ok(());
            }
            // 外部 C 链接的名字不可重载
            let overload_count = self.symtab.function_overloads(name).len();
            if overload_count > 1 {
                self.err(
                    codes::EXTERN_C_OVERLOAD,
                    span,
                    format!(
                        "can't overload foreign-linkage function `{}`; {} functions with the same name have already been declared",
                        name,
                        overload_count
                    ),
                );
                return Ok(());
            }
            if overload_count == 1 {
                // 上面已放过完全一致的签名，到这里一定是冲突
                self.err(
                    codes::EXTERN_C_OVERLOAD,
                    span,
                    format!("can't overload foreign-linkage function `{}`", name),
                );
                return Ok(());
            }
        }

        if sig.inline && is_noinline {
            self.err(
                codes::QUALIFIER_CONFLICT,
                span,
                format!("illegal to use `noinline` and `inline` qualifiers together on function `{}`", name),
            );
            return Ok(());
        }

        if sig.is_task && !sig.ret.is_void() {
            self.err(codes::TASK_RETURN, span, "task-qualified functions must have void return type");
        }

        if sig.exported && !sig.ret.exportable(false) {
            self.err(
                codes::EXPORT_ILLEGAL_TYPE,
                span,
                format!("illegal to return a `varying` or vector type from exported function `{}`", name),
            );
        }

        if sig.exported || sig.extern_c {
            for p in &sig.params {
                if matches!(p.ty, Ty::Struct(_)) {
                    self.err(
                        codes::STRUCT_BY_VALUE,
                        span,
                        "passing structs to/from application functions by value is not supported; use a reference or pointer to the struct instead",
                    );
                    break;
                }
            }
        }

        // 参数检查：导出合法性 / no-alias 约定 / 默认值顺序 / 函数名遮蔽
        let mut noalias = vec![false; sig.params.len()];
        let mut seen_default = false;
        for (i, p) in sig.params.iter().enumerate() {
            if sig.exported {
                self.check_exported_param(&p.ty, &p.name, p.span);
            }

            let uniform_ptr = matches!(&p.ty, Ty::Ptr(_, Variability::Uniform));
            let is_ref = matches!(&p.ty, Ty::Ref(..));
            if !sig.is_task && (uniform_ptr || is_ref) {
                noalias[i] = true;
            }

            if self.symtab.has_function(&p.name) {
                self.warn(
                    codes::PARAM_SHADOW,
                    p.span,
                    format!("function parameter `{}` shadows a function declared in global scope", p.name),
                );
            }

            if p.default.is_some() {
                seen_default = true;
            } else if seen_default {
                self.err(
                    codes::DEFAULT_ORDER,
                    p.span,
                    format!(
                        "parameter `{}` is missing a default: all parameters after the first one with a default value must have defaults as well",
                        p.name
                    ),
                );
            }
        }
        // 任务函数的隐式首参数（启动上下文指针）恒为 no-alias
        if sig.is_task && !noalias.is_empty() {
            noalias[0] = true;
        }

        // 建立可调用工件。foreign-linkage 不 mangle；多目标构建再追加 ISA 限定
        let mangled = if sig.extern_c {
            name.to_string()
        } else {
            let base = mangle::mangle_fn(name, &sig);
            if self.ctx.mangle_with_target {
                mangle::with_isa(&base, self.ctx.target.isa)
            } else {
                base
            }
        };
        let linkage = if storage == StorageClass::Static || sig.inline {
            Linkage::Local
        } else {
            Linkage::Export
        };
        let fid = self.be.declare_function(&mangled, &sig, linkage)?;

        let mut sym = Symbol::new(name.to_string(), Ty::Func(Box::new(sig)), storage, span);
        sym.artifact = Some(Artifact::Func { id: fid, mangled });
        sym.noalias_params = noalias;
        self.symtab.add_function(sym);
        Ok(())
    }

    /// 导出参数的专项诊断：点名非法构造
    fn check_exported_param(&mut self, ty: &Ty, pname: &str, span: Span) {
        if ty.exportable(false) {
            return;
        }
        match ty {
            Ty::Ptr(..) => self.err(
                codes::EXPORT_ILLEGAL_TYPE,
                span,
                format!("varying pointer type parameter `{}` is illegal in an exported function", pname),
            ),
            Ty::Struct(_) | Ty::Arr(..) if contains_vector_member(ty) => self.err(
                codes::EXPORT_ILLEGAL_TYPE,
                span,
                format!("struct parameter `{}` with vector typed member(s) is illegal in an exported function", pname),
            ),
            Ty::Vec(..) => self.err(
                codes::EXPORT_ILLEGAL_TYPE,
                span,
                format!("vector-typed parameter `{}` is illegal in an exported function", pname),
            ),
            _ => self.err(
                codes::EXPORT_ILLEGAL_TYPE,
                span,
                format!("varying parameter `{}` is illegal in an exported function", pname),
            ),
        }
    }

    // —— 函数体定义 —— //

    /// 按签名找到已声明的符号，更新记录并把函数体交给 lowering 协作者。
    /// 找不到符号是早前错误的级联，静默返回。
    pub fn define_function_body(&mut self, name: &str, sig: &FnSig, body: &Body, span: Span) {
        let Some(id) = self.symtab.lookup_function_exact(name, sig) else {
            return;
        };
        let sym = self.symtab.sym_mut(id);
        // 定义可能带上了声明时没有的正式参数名
        sym.ty = Ty::Func(Box::new(sig.clone()));
        sym.span = span;
        let Some(Artifact::Func { id: fid, .. }) = &sym.artifact else {
            return;
        };
        let fid = *fid;
        self.be.push_body(PendingBody {
            fid,
            name: name.to_string(),
            sig: sig.clone(),
            body: body.clone(),
        });
    }

    // —— 导出类型与别名 —— //

    pub fn add_exported_type(&mut self, ty: Ty, span: Span) {
        match ty {
            Ty::Struct(_) | Ty::Vec(..) | Ty::Enum(..) => {
                self.symtab.add_exported_type(ty, span);
            }
            other => self.err(
                codes::INVALID_EXPORT_TYPE,
                span,
                format!(
                    "only struct, vector, and enum types, not `{}`, are allowed in type export lists",
                    other.display()
                ),
            ),
        }
    }

    pub fn add_type_alias(&mut self, name: &str, ty: Ty, span: Span) {
        if let Some((prev, _)) = self.symtab.add_alias(name, ty, span) {
            self.err(
                codes::ALIAS_CONFLICT,
                span,
                format!("type alias `{}` conflicts with earlier alias for `{}`", name, prev.display()),
            );
        }
    }
}

/// 签名完全一致（参数类型 + 返回类型 + 限定符；参数名与默认值不参与）
fn full_sig_equal(a: &FnSig, b: &FnSig) -> bool {
    a.same_params(b)
        && a.ret == b.ret
        && a.exported == b.exported
        && a.extern_c == b.extern_c
        && a.is_task == b.is_task
        && a.inline == b.inline
}

/// 数组首维缺尺寸时用初始化器列表长度补上
fn resolve_unsized(ty: &Ty, init: Option<&Expr>) -> Option<Ty> {
    match ty {
        Ty::Arr(elem, None) => match init {
            Some(Expr::List { items, .. }) if !items.is_empty() => {
                let elem = resolve_unsized(elem, items.first())?;
                Some(Ty::Arr(Box::new(elem), Some(items.len() as u32)))
            }
            _ => None,
        },
        Ty::Arr(elem, Some(n)) => {
            let inner_init = match init {
                Some(Expr::List { items, .. }) => items.first(),
                other => other,
            };
            let elem = resolve_unsized(elem, inner_init)?;
            Some(Ty::Arr(Box::new(elem), Some(*n)))
        }
        _ => Some(ty.clone()),
    }
}

fn contains_vector_member(ty: &Ty) -> bool {
    match ty {
        Ty::Vec(..) => true,
        Ty::Arr(elem, _) => contains_vector_member(elem),
        Ty::Struct(st) => st.fields.iter().any(|(_, t)| contains_vector_member(t)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::target;
    use crate::driver::BuildContext;
    use crate::frontend::ast::{AtomicKind, Param};

    struct Fixture {
        ctx: BuildContext,
        symtab: SymbolTable,
        be: UnitBackend,
        diags: DiagSink,
        sm: SourceMap,
    }

    fn fixture() -> Fixture {
        let spec = *target::lookup("sse2").unwrap();
        let ctx = BuildContext::new(spec);
        let be = UnitBackend::new(&ctx).unwrap();
        let mut sm = SourceMap::new();
        sm.add_file("test.lane".into(), "int x;\n".into());
        Fixture { ctx, symtab: SymbolTable::new(), be, diags: DiagSink::new(), sm }
    }

    impl Fixture {
        fn v(&mut self) -> Validator<'_> {
            Validator::new(&self.ctx, &mut self.symtab, &mut self.be, &mut self.diags, &self.sm)
        }
    }

    fn i32u() -> Ty {
        Ty::uniform(AtomicKind::Int32)
    }

    fn sp(start: usize) -> Span {
        Span { file: crate::diag::FileId(0), start, end: start + 1 }
    }

    fn sig(params: Vec<Ty>, ret: Ty) -> FnSig {
        FnSig {
            params: params
                .into_iter()
                .enumerate()
                .map(|(i, ty)| Param { name: format!("p{}", i), ty, default: None, span: sp(0) })
                .collect(),
            ret,
            exported: false,
            extern_c: false,
            is_task: false,
            inline: false,
        }
    }

    #[test]
    fn global_then_extern_redeclaration_is_one_definition() {
        let mut f = fixture();
        f.v().add_global_variable("x", i32u(), None, false, StorageClass::Default, sp(0)).unwrap();
        f.v().add_global_variable("x", i32u(), None, false, StorageClass::Extern, sp(2)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        assert!(f.be.global("x").unwrap().init.is_some());

        // 再来一个类型不匹配的 extern 声明
        f.v().add_global_variable("x", Ty::uniform(AtomicKind::Float), None, false, StorageClass::Extern, sp(4)).unwrap();
        assert!(f.diags.has_code(codes::CONFLICTING_DECL));
    }

    #[test]
    fn extern_then_concrete_definition_patches_symbol() {
        let mut f = fixture();
        f.v().add_global_variable("g", i32u(), None, false, StorageClass::Extern, sp(0)).unwrap();
        assert!(f.be.global("g").unwrap().init.is_none());
        let init = Expr::Int { value: 3, span: sp(1) };
        f.v().add_global_variable("g", i32u(), Some(&init), false, StorageClass::Default, sp(2)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        let def = f.be.global("g").unwrap();
        assert_eq!(def.init.as_deref(), Some(&3i32.to_le_bytes()[..]));
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut f = fixture();
        let one = Expr::Int { value: 1, span: sp(0) };
        let two = Expr::Int { value: 2, span: sp(2) };
        f.v().add_global_variable("x", i32u(), Some(&one), false, StorageClass::Default, sp(0)).unwrap();
        f.v().add_global_variable("x", i32u(), Some(&two), false, StorageClass::Default, sp(2)).unwrap();
        assert!(f.diags.has_code(codes::REDEFINITION));
    }

    #[test]
    fn global_shadowing_function_is_rejected() {
        let mut f = fixture();
        f.v().add_function_declaration("f", sig(vec![], Ty::Void), StorageClass::Default, false, sp(0)).unwrap();
        f.v().add_global_variable("f", i32u(), None, false, StorageClass::Default, sp(1)).unwrap();
        assert!(f.diags.has_code(codes::SHADOWING));
    }

    #[test]
    fn void_global_and_foreign_linkage_global_are_rejected() {
        let mut f = fixture();
        f.v().add_global_variable("v", Ty::Void, None, false, StorageClass::Default, sp(0)).unwrap();
        f.v().add_global_variable("c", i32u(), None, false, StorageClass::ExternC, sp(1)).unwrap();
        assert_eq!(f.diags.error_count(), 2);
        assert!(f.diags.has_code(codes::QUALIFIER));
    }

    #[test]
    fn unsized_array_without_initializer_is_rejected() {
        let mut f = fixture();
        let ty = Ty::Arr(Box::new(i32u()), None);
        f.v().add_global_variable("a", ty.clone(), None, false, StorageClass::Default, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::UNSIZED_ARRAY));

        // 有初始化器就能定尺寸
        let init = Expr::List {
            items: vec![Expr::Int { value: 1, span: sp(1) }, Expr::Int { value: 2, span: sp(2) }],
            span: sp(1),
        };
        f.v().add_global_variable("b", ty, Some(&init), false, StorageClass::Default, sp(3)).unwrap();
        let def = f.be.global("b").unwrap();
        assert_eq!(def.ty, Ty::Arr(Box::new(i32u()), Some(2)));
        assert_eq!(def.init.as_ref().unwrap().len(), 8);
    }

    #[test]
    fn nonconstant_initializer_is_rejected() {
        let mut f = fixture();
        // 引用一个不存在的名字折不出常量
        let init = Expr::Ident { name: "unknown".into(), span: sp(1) };
        f.v().add_global_variable("x", i32u(), Some(&init), false, StorageClass::Default, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::NONCONST_INIT));
        // 仍然以零值登记，后续引用不再级联报错
        assert!(f.be.global("x").unwrap().init.is_some());
    }

    #[test]
    fn const_global_feeds_later_initializers() {
        let mut f = fixture();
        let seven = Expr::Int { value: 7, span: sp(0) };
        f.v().add_global_variable("k", i32u(), Some(&seven), true, StorageClass::Default, sp(0)).unwrap();
        let init = Expr::Ident { name: "k".into(), span: sp(2) };
        f.v().add_global_variable("x", i32u(), Some(&init), false, StorageClass::Default, sp(2)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        assert_eq!(f.be.global("x").unwrap().init.as_deref(), Some(&7i32.to_le_bytes()[..]));
    }

    #[test]
    fn identical_redeclaration_is_silent() {
        let mut f = fixture();
        let s = sig(vec![i32u()], Ty::Void);
        f.v().add_function_declaration("f", s.clone(), StorageClass::Default, false, sp(0)).unwrap();
        f.v().add_function_declaration("f", s, StorageClass::Default, false, sp(1)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        assert_eq!(f.symtab.function_overloads("f").len(), 1);
    }

    #[test]
    fn return_type_only_overload_is_rejected() {
        let mut f = fixture();
        f.v().add_function_declaration("f", sig(vec![i32u()], Ty::Void), StorageClass::Default, false, sp(0)).unwrap();
        f.v().add_function_declaration("f", sig(vec![i32u()], i32u()), StorageClass::Default, false, sp(1)).unwrap();
        assert!(f.diags.has_code(codes::RETURN_OVERLOAD));
    }

    #[test]
    fn different_params_coexist_as_overloads() {
        let mut f = fixture();
        f.v().add_function_declaration("f", sig(vec![i32u()], Ty::Void), StorageClass::Default, false, sp(0)).unwrap();
        f.v().add_function_declaration("f", sig(vec![Ty::uniform(AtomicKind::Float)], Ty::Void), StorageClass::Default, false, sp(1)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        assert_eq!(f.symtab.function_overloads("f").len(), 2);
    }

    #[test]
    fn export_qualifier_forbids_overloading() {
        let mut f = fixture();
        let mut a = sig(vec![i32u()], Ty::Void);
        a.exported = true;
        f.v().add_function_declaration("f", a, StorageClass::Default, false, sp(0)).unwrap();
        f.v().add_function_declaration("f", sig(vec![Ty::uniform(AtomicKind::Float)], Ty::Void), StorageClass::Default, false, sp(1)).unwrap();
        assert!(f.diags.has_code(codes::EXPORT_OVERLOAD));
    }

    #[test]
    fn foreign_linkage_cannot_be_overloaded() {
        let mut f = fixture();
        f.v().add_function_declaration("puts", sig(vec![i32u()], Ty::Void), StorageClass::ExternC, false, sp(0)).unwrap();
        f.v().add_function_declaration("puts", sig(vec![Ty::uniform(AtomicKind::Float)], Ty::Void), StorageClass::ExternC, false, sp(1)).unwrap();
        assert!(f.diags.has_code(codes::EXTERN_C_OVERLOAD));

        // 完全一致的再声明没问题
        let mut g = fixture();
        let s = sig(vec![i32u()], Ty::Void);
        g.v().add_function_declaration("q", s.clone(), StorageClass::ExternC, false, sp(0)).unwrap();
        g.v().add_function_declaration("q", s, StorageClass::ExternC, false, sp(1)).unwrap();
        assert_eq!(g.diags.error_count(), 0);
    }

    #[test]
    fn inline_noinline_conflict() {
        let mut f = fixture();
        let mut s = sig(vec![], Ty::Void);
        s.inline = true;
        f.v().add_function_declaration("f", s, StorageClass::Default, true, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::QUALIFIER_CONFLICT));
    }

    #[test]
    fn task_rules() {
        let mut f = fixture();
        let mut s = sig(vec![], i32u());
        s.is_task = true;
        f.v().add_function_declaration("t", s, StorageClass::Default, false, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::TASK_RETURN));

        let mut g = fixture();
        let mut s = sig(vec![], Ty::Void);
        s.is_task = true;
        g.v().add_function_declaration("t", s, StorageClass::ExternC, false, sp(0)).unwrap();
        assert!(g.diags.has_code(codes::TASK_LINKAGE));
    }

    #[test]
    fn exported_varying_pointer_param_is_diagnosed_by_name() {
        let mut f = fixture();
        let mut s = sig(vec![], Ty::Void);
        s.exported = true;
        s.params.push(Param {
            name: "data".into(),
            ty: Ty::Ptr(Box::new(Ty::uniform(AtomicKind::Float)), Variability::Varying),
            default: None,
            span: sp(3),
        });
        f.v().add_function_declaration("kernel", s, StorageClass::Default, false, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::EXPORT_ILLEGAL_TYPE));
        assert!(f.diags.iter().any(|d| d.message.contains("data")));
    }

    #[test]
    fn exported_pointer_to_varying_is_fine() {
        let mut f = fixture();
        let mut s = sig(vec![Ty::uniform_ptr(Ty::varying(AtomicKind::Float))], Ty::Void);
        s.exported = true;
        f.v().add_function_declaration("kernel", s, StorageClass::Default, false, sp(0)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
    }

    #[test]
    fn struct_by_value_is_rejected_for_exported() {
        use crate::frontend::ast::StructTy;
        let mut f = fixture();
        let st = Ty::Struct(StructTy { name: "S".into(), fields: vec![("a".into(), i32u())] });
        let mut s = sig(vec![st], Ty::Void);
        s.exported = true;
        f.v().add_function_declaration("f", s, StorageClass::Default, false, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::STRUCT_BY_VALUE));
    }

    #[test]
    fn default_arguments_must_be_trailing() {
        let mut f = fixture();
        let mut s = sig(vec![i32u(), i32u()], Ty::Void);
        s.params[0].default = Some(Expr::Int { value: 1, span: sp(0) });
        f.v().add_function_declaration("f", s, StorageClass::Default, false, sp(0)).unwrap();
        assert!(f.diags.has_code(codes::DEFAULT_ORDER));
    }

    #[test]
    fn param_shadowing_function_is_a_warning_only() {
        let mut f = fixture();
        f.v().add_function_declaration("g", sig(vec![], Ty::Void), StorageClass::Default, false, sp(0)).unwrap();
        let mut s = sig(vec![i32u()], Ty::Void);
        s.params[0].name = "g".into();
        f.v().add_function_declaration("f", s, StorageClass::Default, false, sp(1)).unwrap();
        assert_eq!(f.diags.error_count(), 0);
        assert!(f.diags.has_code(codes::PARAM_SHADOW));
    }

    #[test]
    fn noalias_contract_is_recorded() {
        let mut f = fixture();
        let s = sig(
            vec![
                Ty::uniform_ptr(Ty::varying(AtomicKind::Float)),
                i32u(),
                Ty::Ref(Box::new(i32u()), true),
            ],
            Ty::Void,
        );
        f.v().add_function_declaration("f", s, StorageClass::Default, false, sp(0)).unwrap();
        let sym = f.symtab.sym(f.symtab.function_overloads("f")[0]);
        assert_eq!(sym.noalias_params, vec![true, false, true]);
    }

    #[test]
    fn body_definition_updates_symbol_and_queues_lowering() {
        let mut f = fixture();
        let s = sig(vec![i32u()], Ty::Void);
        f.v().add_function_declaration("f", s.clone(), StorageClass::Default, false, sp(0)).unwrap();
        let mut def_sig = s.clone();
        def_sig.params[0].name = "count".into();
        f.v().define_function_body("f", &def_sig, &Body::default(), sp(5));
        let sym = f.symtab.sym(f.symtab.function_overloads("f")[0]);
        assert_eq!(sym.fn_sig().unwrap().params[0].name, "count");
        assert_eq!(f.be.take_bodies().len(), 1);
    }

    #[test]
    fn exported_type_registration_accepts_aggregates_only() {
        use crate::frontend::ast::StructTy;
        let mut f = fixture();
        let st = Ty::Struct(StructTy { name: "S".into(), fields: vec![] });
        f.v().add_exported_type(st, sp(0));
        f.v().add_exported_type(Ty::Vec(AtomicKind::Float, 4), sp(1));
        f.v().add_exported_type(Ty::Enum("E".into(), Variability::Uniform), sp(2));
        assert_eq!(f.diags.error_count(), 0);
        f.v().add_exported_type(i32u(), sp(3));
        assert!(f.diags.has_code(codes::INVALID_EXPORT_TYPE));
        assert_eq!(f.symtab.exported_types().len(), 3);
    }
}
