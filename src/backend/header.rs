// src/backend/header.rs
//! C 兼容头文件生成。
//!
//! 多目标构建的“合并头文件”跨驱动循环增量拼装：门面/每宽度结构体
//! 布局/函数原型/收尾四段各写一次。用显式状态机而不是一把布尔开关，
//! 无论循环以什么顺序调用，每段都恰好发射一次。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::frontend::ast::{AtomicKind, StructTy, Ty, Variability};
use crate::middle::symtab::{Symbol, SymbolTable};
use crate::utils::fast::{FastSet, fast_set};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderState {
    NotStarted,
    FrontMatterDone,
    FunctionsDone,
    Closed,
}

/// 从文件名造 include guard：字母数字保留（转大写），其余变下划线
fn guard_from(path: &Path) -> String {
    let mut g = String::from("LANE_");
    for ch in path.to_string_lossy().chars() {
        if ch.is_ascii_alphanumeric() {
            g.push(ch.to_ascii_uppercase());
        } else {
            g.push('_');
        }
    }
    g
}

pub(crate) fn c_type(ty: &Ty) -> String {
    match ty {
        Ty::Void => "void".into(),
        Ty::Atomic(k, _) => k.c_name().into(),
        Ty::Enum(n, _) => n.clone(),
        // 指向 varying 数据的指针在 C 侧没有具体布局，统一成 void *
        Ty::Ptr(base, _) if base.is_varying() => "void *".into(),
        Ty::Ptr(base, _) => format!("{} *", c_type(base)),
        Ty::Ref(inner, true) => format!("const {} &", c_type(inner)),
        Ty::Ref(inner, false) => format!("{} &", c_type(inner)),
        Ty::Arr(elem, _) => c_type(elem),
        Ty::Vec(k, n) => format!("{}{}", short_kind(*k), n),
        Ty::Struct(st) => format!("struct {}", st.name),
        Ty::Func(_) => "void *".into(),
    }
}

fn short_kind(k: AtomicKind) -> &'static str {
    match k {
        AtomicKind::Float => "float",
        AtomicKind::Double => "double",
        AtomicKind::Bool => "bool",
        AtomicKind::Int8 => "int8",
        AtomicKind::UInt8 => "uint8",
        AtomicKind::Int16 => "int16",
        AtomicKind::UInt16 => "uint16",
        AtomicKind::Int32 => "int32",
        AtomicKind::UInt32 => "uint32",
        AtomicKind::Int64 => "int64",
        AtomicKind::UInt64 => "uint64",
    }
}

/// 带变量名的 C 声明；varying 标量展开成 lane 数组
pub fn c_decl(ty: &Ty, name: &str, width: u32) -> String {
    match ty {
        Ty::Atomic(k, Variability::Varying) => format!("{} {}[{}]", k.c_name(), name, width),
        Ty::Enum(n, Variability::Varying) => format!("{} {}[{}]", n, name, width),
        Ty::Arr(elem, Some(n)) => c_decl(elem, &format!("{}[{}]", name, n), width),
        _ => format!("{} {}", c_type(ty), name),
    }
}

fn struct_has_varying(st: &StructTy) -> bool {
    st.fields.iter().any(|(_, t)| match t {
        Ty::Struct(inner) => struct_has_varying(inner),
        Ty::Arr(elem, _) => matches!(&**elem, Ty::Struct(i) if struct_has_varying(i)) || elem.is_varying(),
        other => other.is_varying(),
    })
}

/// 收集导出函数签名（与显式导出列表）里出现的聚合类型，按名去重
fn collect_exported_types(
    funcs: &[&Symbol],
    explicit: &[(Ty, crate::diag::Span)],
) -> (Vec<StructTy>, Vec<String>, Vec<(AtomicKind, u32)>) {
    let mut structs = Vec::new();
    let mut enums = Vec::new();
    let mut vecs = Vec::new();
    let mut seen: FastSet<String> = fast_set();

    fn walk(
        ty: &Ty,
        structs: &mut Vec<StructTy>,
        enums: &mut Vec<String>,
        vecs: &mut Vec<(AtomicKind, u32)>,
        seen: &mut FastSet<String>,
    ) {
        match ty {
            Ty::Struct(st) => {
                if seen.insert(format!("s:{}", st.name)) {
                    for (_, f) in &st.fields {
                        walk(f, structs, enums, vecs, seen);
                    }
                    structs.push(st.clone());
                }
            }
            Ty::Enum(n, _) => {
                if seen.insert(format!("e:{}", n)) {
                    enums.push(n.clone());
                }
            }
            Ty::Vec(k, n) => {
                if seen.insert(format!("v:{}{}", short_kind(*k), n)) {
                    vecs.push((*k, *n));
                }
            }
            Ty::Ptr(base, _) => walk(base, structs, enums, vecs, seen),
            Ty::Ref(inner, _) => walk(inner, structs, enums, vecs, seen),
            Ty::Arr(elem, _) => walk(elem, structs, enums, vecs, seen),
            _ => {}
        }
    }

    for sym in funcs {
        if let Some(sig) = sym.fn_sig() {
            for p in &sig.params {
                walk(&p.ty, &mut structs, &mut enums, &mut vecs, &mut seen);
            }
            walk(&sig.ret, &mut structs, &mut enums, &mut vecs, &mut seen);
        }
    }
    for (ty, _) in explicit {
        walk(ty, &mut structs, &mut enums, &mut vecs, &mut seen);
    }
    (structs, enums, vecs)
}

fn push_enum_and_vec_decls(buf: &mut String, enums: &[String], vecs: &[(AtomicKind, u32)]) {
    for e in enums {
        buf.push_str(&format!("typedef int32_t {};\n", e));
    }
    for (k, n) in vecs {
        buf.push_str(&format!("typedef {} {}{}[{}];\n", k.c_name(), short_kind(*k), n, n));
    }
    if !enums.is_empty() || !vecs.is_empty() {
        buf.push('\n');
    }
}

fn push_struct_decl(buf: &mut String, st: &StructTy, width: u32) {
    buf.push_str(&format!("struct {} {{\n", st.name));
    for (fname, fty) in &st.fields {
        buf.push_str(&format!("    {};\n", c_decl(fty, fname, width)));
    }
    buf.push_str("};\n\n");
}

fn push_function_decls(buf: &mut String, funcs: &[&Symbol], width: u32) {
    buf.push_str("\n///////////////////////////////////////////////////////////////////////////\n");
    buf.push_str("// Functions exported from lane code\n");
    buf.push_str("///////////////////////////////////////////////////////////////////////////\n");
    buf.push_str("#if defined(__cplusplus)\nextern \"C\" {\n#endif // __cplusplus\n");
    for sym in funcs {
        let Some(sig) = sym.fn_sig() else { continue };
        let params: Vec<String> = sig
            .params
            .iter()
            .map(|p| c_decl(&p.ty, &p.name, width))
            .collect();
        let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
        buf.push_str(&format!("    extern {} {}({});\n", c_type(&sig.ret), sym.name, params));
    }
    buf.push_str("#if defined(__cplusplus)\n} /* end extern C */\n#endif // __cplusplus\n");
}

/// 单目标（或按目标拆分）的完整头文件，一次写完
pub fn write_header(path: &Path, symtab: &SymbolTable, width: u32) -> Result<()> {
    let mut h = CombinedHeader::new(path.to_path_buf());
    h.front_matter();
    h.width_section(symtab, width);
    h.functions(symtab, width);
    h.back_matter();
    h.write()
}

/// 多目标合并头文件：跨驱动循环增量拼装
pub struct CombinedHeader {
    path: PathBuf,
    buf: String,
    state: HeaderState,
    widths_seen: FastSet<u32>,
    unifs_done: bool,
}

impl CombinedHeader {
    pub fn new(path: PathBuf) -> Self {
        CombinedHeader {
            path,
            buf: String::new(),
            state: HeaderState::NotStarted,
            widths_seen: fast_set(),
            unifs_done: false,
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    pub fn widths_seen(&self) -> usize {
        self.widths_seen.len()
    }

    /// 门面：guard、stdint、命名空间。只在第一次调用时生效。
    pub fn front_matter(&mut self) {
        if self.state != HeaderState::NotStarted {
            return;
        }
        let guard = guard_from(&self.path);
        self.buf.push_str(&format!(
            "//\n// {}\n// (Header automatically generated by the lane compiler.)\n// DO NOT EDIT THIS FILE.\n//\n\n",
            self.path.display()
        ));
        self.buf.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
        self.buf.push_str("#include <stdint.h>\n\n");
        self.buf.push_str("#ifdef __cplusplus\nnamespace lane { /* namespace */\n#endif // __cplusplus\n\n");
        self.state = HeaderState::FrontMatterDone;
    }

    /// 某个 lane 宽度的结构体布局段。同一宽度只发射一次；
    /// 第一次调用顺带发射与宽度无关的 enum/向量 typedef 和 uniform 结构体。
    pub fn width_section(&mut self, symtab: &SymbolTable, width: u32) {
        self.front_matter();
        if self.state == HeaderState::Closed || !self.widths_seen.insert(width) {
            return;
        }
        let mut funcs = symtab.exported_functions();
        funcs.extend(symtab.extern_c_functions());
        let (structs, enums, vecs) = collect_exported_types(&funcs, symtab.exported_types());

        if !self.unifs_done {
            push_enum_and_vec_decls(&mut self.buf, &enums, &vecs);
            for st in structs.iter().filter(|s| !struct_has_varying(s)) {
                push_struct_decl(&mut self.buf, st, width);
            }
            self.unifs_done = true;
        }

        let varying: Vec<&StructTy> = structs.iter().filter(|s| struct_has_varying(s)).collect();
        if !varying.is_empty() {
            self.buf.push_str(&format!("#if LANE_PROGRAM_COUNT == {}\n", width));
            for st in varying {
                push_struct_decl(&mut self.buf, st, width);
            }
            self.buf.push_str(&format!("#endif // LANE_PROGRAM_COUNT == {}\n\n", width));
        }
    }

    /// 导出函数原型段，只发射一次。
    /// 原型里不允许出现逐 lane 布局（导出合法性已保证），宽度只用于
    /// 渲染指到 varying 数据的指针之外的残余场景。
    pub fn functions(&mut self, symtab: &SymbolTable, width: u32) {
        self.front_matter();
        if matches!(self.state, HeaderState::FunctionsDone | HeaderState::Closed) {
            return;
        }
        let funcs = symtab.exported_functions();
        if !funcs.is_empty() {
            push_function_decls(&mut self.buf, &funcs, width);
        }
        self.state = HeaderState::FunctionsDone;
    }

    /// 收尾段：关命名空间与 guard。之后的任何段调用都是 no-op。
    pub fn back_matter(&mut self) {
        if self.state == HeaderState::Closed {
            return;
        }
        self.front_matter();
        let guard = guard_from(&self.path);
        self.buf.push_str("\n#ifdef __cplusplus\n} /* namespace */\n#endif // __cplusplus\n");
        self.buf.push_str(&format!("\n#endif // {}\n", guard));
        self.state = HeaderState::Closed;
    }

    pub fn write(&self) -> Result<()> {
        std::fs::write(&self.path, &self.buf)
            .with_context(|| format!("write header `{}`", self.path.display()))
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{FnSig, Param};
    use crate::frontend::span::Span;
    use crate::middle::symtab::Symbol;
    use crate::frontend::ast::StorageClass;

    fn symtab_with_export() -> SymbolTable {
        let mut st = SymbolTable::new();
        let sig = FnSig {
            params: vec![Param {
                name: "out".into(),
                ty: Ty::uniform_ptr(Ty::varying(AtomicKind::Float)),
                default: None,
                span: Span::DUMMY,
            }],
            ret: Ty::Void,
            exported: true,
            extern_c: false,
            is_task: false,
            inline: false,
        };
        let mut sym = Symbol::new(
            "kernel".into(),
            Ty::Func(Box::new(sig)),
            StorageClass::Default,
            Span::DUMMY,
        );
        sym.artifact = Some(crate::middle::symtab::Artifact::Func {
            id: cranelift_module::FuncId::from_u32(0),
            mangled: "kernel$x".into(),
        });
        st.add_function(sym);
        st
    }

    #[test]
    fn sections_are_emitted_exactly_once() {
        let st = symtab_with_export();
        let mut h = CombinedHeader::new(PathBuf::from("out.h"));
        // 乱序、重复调用
        h.functions(&st, 4);
        h.front_matter();
        h.functions(&st, 8);
        h.width_section(&st, 4);
        h.width_section(&st, 4);
        h.width_section(&st, 8);
        h.back_matter();
        h.back_matter();
        assert_eq!(h.state(), HeaderState::Closed);
        assert_eq!(h.widths_seen(), 2);
        let text = h.buffer();
        assert_eq!(text.matches("#include <stdint.h>").count(), 1);
        assert_eq!(text.matches("Functions exported from lane code").count(), 1);
        assert_eq!(text.matches("#endif // LANE_").count(), 1);
    }

    #[test]
    fn pointer_to_varying_renders_as_void_pointer() {
        let st = symtab_with_export();
        let mut h = CombinedHeader::new(PathBuf::from("out.h"));
        h.functions(&st, 4);
        h.back_matter();
        assert!(h.buffer().contains("extern void kernel(void * out);"));
    }
}
