// src/backend/mangle.rs
use crate::backend::target::Isa;
use crate::frontend::ast::{FnSig, Ty, Variability};

/// 把类型转为搅拌后的字符串（重载识别与符号名保持一致）
pub fn mangle_ty(t: &Ty) -> String {
    fn vr(v: Variability) -> &'static str {
        match v {
            Variability::Uniform => "un",
            Variability::Varying => "vy",
        }
    }
    match t {
        Ty::Void => "Void".into(),
        Ty::Atomic(k, v) => format!("{}{:?}", vr(*v), k),
        Ty::Enum(n, v) => format!("{}Enum_{}", vr(*v), n),
        Ty::Ptr(base, v) => format!("{}Ptr<{}>", vr(*v), mangle_ty(base)),
        Ty::Ref(inner, true) => format!("CRef<{}>", mangle_ty(inner)),
        Ty::Ref(inner, false) => format!("Ref<{}>", mangle_ty(inner)),
        Ty::Arr(elem, Some(n)) => format!("Arr{}<{}>", n, mangle_ty(elem)),
        Ty::Arr(elem, None) => format!("Arr<{}>", mangle_ty(elem)),
        Ty::Vec(k, n) => format!("Vec{}<{:?}>", n, k),
        Ty::Struct(st) => st.name.clone(),
        Ty::Func(_) => "Fn".into(),
    }
}

/// 普通函数符号：base$T1,T2,...（extern "C" 的函数不经过这里）
pub fn mangle_fn(base: &str, sig: &FnSig) -> String {
    if sig.params.is_empty() {
        format!("{}$", base)
    } else {
        let parts: Vec<String> = sig.params.iter().map(|p| mangle_ty(&p.ty)).collect();
        format!("{}${}", base, parts.join(","))
    }
}

/// 多目标同时编译时再加一层 ISA 限定
pub fn with_isa(sym: &str, isa: Isa) -> String {
    format!("{}_{}", sym, isa.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{AtomicKind, Param};
    use crate::frontend::span::Span;

    #[test]
    fn overloads_get_distinct_symbols() {
        let p = |ty: Ty| Param { name: "x".into(), ty, default: None, span: Span::DUMMY };
        let a = FnSig {
            params: vec![p(Ty::uniform(AtomicKind::Int32))],
            ret: Ty::Void,
            exported: false,
            extern_c: false,
            is_task: false,
            inline: false,
        };
        let mut b = a.clone();
        b.params[0].ty = Ty::uniform(AtomicKind::Float);
        assert_ne!(mangle_fn("f", &a), mangle_fn("f", &b));
        assert_eq!(with_isa(&mangle_fn("f", &a), Isa::Avx2), format!("{}_avx2", mangle_fn("f", &a)));
    }
}
