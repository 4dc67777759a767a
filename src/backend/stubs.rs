// src/backend/stubs.rs
//! offload 执行模型的宿主侧/设备侧调用桩生成。
//!
//! 这是外围胶水：每个返回 void 的导出函数得到一个“非指针参数打包
//! 结构体”和一个包装函数，指针参数单独走指针表做地址翻译。
//! 带返回值的导出函数发告警后跳过。引用参数先拆到指向对象再分类：
//! const 引用按值打包，非 const 引用在 offload 模型里没有回写通道，报错。

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::backend::header::c_decl;
use crate::diag::{DiagSink, SourceMap, codes};
use crate::frontend::ast::{FnSig, Param, Ty};
use crate::middle::symtab::{Symbol, SymbolTable};

fn is_pointerish(ty: &Ty) -> bool {
    matches!(ty, Ty::Ptr(..) | Ty::Arr(..))
}

/// 引用参数的封送视角是指向对象本身；其余类型按原样
fn marshal_ty(ty: &Ty) -> &Ty {
    match ty {
        Ty::Ref(inner, _) => &**inner,
        other => other,
    }
}

/// 参数打包结构体：只收非指针参数（指针单独传递并翻译）。
/// 非 const 引用在这里报错（两个桩写出器共用这条路径，只报一次）。
fn param_struct(
    name: &str,
    sig: &FnSig,
    width: u32,
    sm: &SourceMap,
    diags: &mut DiagSink,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "struct {} {{", name);
    for p in &sig.params {
        if let Ty::Ref(_, false) = &p.ty {
            let file = sm.name(p.span.file).to_string();
            diags.error(
                codes::STUB_REF_PARAM,
                &file,
                Some(p.span),
                format!(
                    "when emitting offload stubs, exported functions cannot have non-const reference-type parameters (`{}`)",
                    p.name
                ),
            );
        }
        let pty = marshal_ty(&p.ty);
        if is_pointerish(pty) {
            continue;
        }
        let _ = writeln!(out, "   {};", c_decl(pty, &p.name, width));
    }
    let _ = writeln!(out, "}};");
    out
}

fn warn_nonvoid(sym: &Symbol, sm: &SourceMap, diags: &mut DiagSink) {
    let file = sm.name(sym.span.file).to_string();
    diags.warn(
        codes::STUB_NONVOID,
        &file,
        Some(sym.span),
        format!(
            "when emitting offload stubs, ignoring exported function `{}` with non-void return type",
            sym.name
        ),
    );
}

/// 本参数是否走指针表（引用先拆到指向对象再判断）
fn passes_as_pointer(p: &Param) -> bool {
    is_pointerish(marshal_ty(&p.ty))
}

/// 设备侧桩：解包参数结构体与指针表，调用导出函数本体
pub fn write_dev_stub(
    path: &Path,
    symtab: &SymbolTable,
    width: u32,
    sm: &SourceMap,
    diags: &mut DiagSink,
) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "//\n// {}\n// (device stubs automatically generated by the lane compiler.)\n// DO NOT EDIT THIS FILE.\n//\n",
        path.display()
    );
    let _ = writeln!(out, "#include \"lane/dev/offload.h\"\n");
    let _ = writeln!(out, "#include <stdint.h>");
    let _ = writeln!(out, "#include <string.h>\n");
    let _ = writeln!(out, "extern \"C\" {{\n");

    for sym in symtab.exported_functions() {
        let Some(sig) = sym.fn_sig() else { continue };
        if !sig.ret.is_void() {
            warn_nonvoid(sym, sm, diags);
            continue;
        }

        let struct_name = format!("__lane_dev_stub_{}", sym.name);
        out.push_str(&param_struct(&struct_name, sig, width, sm, diags));
        out.push('\n');

        let _ = writeln!(
            out,
            "void __lane_dev_stub_{}(\n\
             \x20           uint32_t         in_BufferCount,\n\
             \x20           void**           in_ppBufferPointers,\n\
             \x20           uint64_t*        in_pBufferLengths,\n\
             \x20           void*            in_pMiscData,\n\
             \x20           uint16_t         in_MiscDataLength)",
            sym.name
        );
        let _ = writeln!(out, "{{");
        let _ = writeln!(out, "  struct {} args;", struct_name);
        let _ = writeln!(out, "  memcpy(&args, in_pMiscData, sizeof(args));");

        let mut call_args: Vec<String> = Vec::new();
        for p in &sig.params {
            if passes_as_pointer(p) {
                let tmp = format!("_{}", p.name);
                let _ = writeln!(out, "  {};", c_decl(marshal_ty(&p.ty), &tmp, width));
                let _ = writeln!(
                    out,
                    "  (void *&){} = lane_dev_translate_pointer(*in_ppBufferPointers++);",
                    tmp
                );
                call_args.push(tmp);
            } else {
                call_args.push(format!("args.{}", p.name));
            }
        }
        let _ = writeln!(out, "  {}({});", sym.name, call_args.join(", "));
        let _ = writeln!(out, "}}\n");
    }

    let _ = writeln!(out, "}} /* end extern C */");
    std::fs::write(path, out).with_context(|| format!("write dev stub `{}`", path.display()))
}

/// 宿主侧桩：打包参数、收集指针表，转交 offload 运行库调用设备内核
pub fn write_host_stub(
    path: &Path,
    symtab: &SymbolTable,
    width: u32,
    sm: &SourceMap,
    diags: &mut DiagSink,
) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "//\n// {}\n// (host stubs automatically generated by the lane compiler.)\n// DO NOT EDIT THIS FILE.\n//\n",
        path.display()
    );
    let _ = writeln!(out, "#include \"lane/host/offload.h\"\n");
    let _ = writeln!(out, "#include <assert.h>");
    let _ = writeln!(out, "#include <stdint.h>\n");

    for sym in symtab.exported_functions() {
        let Some(sig) = sym.fn_sig() else { continue };
        if !sig.ret.is_void() {
            warn_nonvoid(sym, sm, diags);
            continue;
        }

        let struct_name = format!("__lane_dev_stub_{}", sym.name);
        out.push_str(&param_struct(&struct_name, sig, width, sm, diags));
        out.push('\n');

        let params: Vec<String> = sig
            .params
            .iter()
            .map(|p| c_decl(&p.ty, &p.name, width))
            .collect();
        let _ = writeln!(out, "extern void {}({}) {{", sym.name, params.join(", "));
        let _ = writeln!(out, "  struct {} __args;", struct_name);

        let mut pointer_args: Vec<String> = Vec::new();
        for p in &sig.params {
            if passes_as_pointer(p) {
                pointer_args.push(format!("(void*){}", p.name));
            } else {
                let _ = writeln!(out, "  __args.{} = {};", p.name, p.name);
            }
        }
        let ptr_list = if pointer_args.is_empty() { "NULL".to_string() } else { pointer_args.join(", ") };
        let _ = writeln!(out, "  void *ptr_args[] = {{ {} }};", ptr_list);
        let _ = writeln!(out, "  static lane_kernel_handle_t kernel_handle = NULL;");
        let _ = writeln!(
            out,
            "  if (!kernel_handle) kernel_handle = lane_host_get_kernel_handle(\"__lane_dev_stub_{}\");",
            sym.name
        );
        let _ = writeln!(out, "  assert(kernel_handle);");
        let _ = writeln!(
            out,
            "  lane_host_call_kernel(kernel_handle,\n\
             \x20                       &__args, sizeof(__args),\n\
             \x20                       ptr_args, {});",
            pointer_args.len()
        );
        let _ = writeln!(out, "}}\n");
    }

    std::fs::write(path, out).with_context(|| format!("write host stub `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{AtomicKind, StorageClass};
    use crate::frontend::span::{FileId, Span};
    use crate::middle::symtab::Artifact;

    fn sp(start: usize) -> Span {
        Span { file: FileId(0), start, end: start + 1 }
    }

    fn exported_void(name: &str, params: Vec<Param>) -> Symbol {
        let sig = FnSig {
            params,
            ret: Ty::Void,
            exported: true,
            extern_c: false,
            is_task: false,
            inline: false,
        };
        let mut sym = Symbol::new(
            name.into(),
            Ty::Func(Box::new(sig)),
            StorageClass::Default,
            sp(0),
        );
        sym.artifact = Some(Artifact::Func {
            id: cranelift_module::FuncId::from_u32(0),
            mangled: format!("{}$x", name),
        });
        sym
    }

    fn p(name: &str, ty: Ty) -> Param {
        Param { name: name.into(), ty, default: None, span: sp(0) }
    }

    #[test]
    fn reference_to_pointer_goes_through_the_pointer_table() {
        let mut st = SymbolTable::new();
        st.add_function(exported_void(
            "kern",
            vec![
                // const 引用到指针：走指针表翻译
                p("buf", Ty::Ref(Box::new(Ty::uniform_ptr(Ty::uniform(AtomicKind::Float))), true)),
                // const 引用到标量：按值打包
                p("cfg", Ty::Ref(Box::new(Ty::uniform(AtomicKind::Int32)), true)),
            ],
        ));
        let mut sm = SourceMap::new();
        sm.add_file("prog.lane".into(), "export void kern(...);\n".into());
        let mut diags = DiagSink::new();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.cpp");
        write_dev_stub(&path, &st, 4, &sm, &mut diags).unwrap();
        assert_eq!(diags.error_count(), 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("(void *&)_buf = lane_dev_translate_pointer"));
        assert!(text.contains("kern(_buf, args.cfg);"));
        // 指针不进参数结构体
        assert!(!text.contains("float * buf;"));
        assert!(text.contains("int32_t cfg;"));
    }

    #[test]
    fn non_const_reference_parameters_are_an_error() {
        let mut st = SymbolTable::new();
        st.add_function(exported_void(
            "kern",
            vec![p("io", Ty::Ref(Box::new(Ty::uniform(AtomicKind::Float)), false))],
        ));
        let mut sm = SourceMap::new();
        sm.add_file("prog.lane".into(), "export void kern(...);\n".into());

        let dir = tempfile::tempdir().unwrap();

        let mut diags = DiagSink::new();
        write_dev_stub(&dir.path().join("dev.cpp"), &st, 4, &sm, &mut diags).unwrap();
        assert!(diags.has_code(codes::STUB_REF_PARAM));
        assert_eq!(diags.error_count(), 1);

        let mut diags = DiagSink::new();
        write_host_stub(&dir.path().join("host.cpp"), &st, 4, &sm, &mut diags).unwrap();
        assert!(diags.has_code(codes::STUB_REF_PARAM));
    }

    #[test]
    fn non_void_exports_are_skipped_with_a_warning() {
        let mut st = SymbolTable::new();
        let mut sym = exported_void("sum", vec![]);
        if let Ty::Func(sig) = &mut sym.ty {
            sig.ret = Ty::uniform(AtomicKind::Float);
        }
        st.add_function(sym);
        let mut sm = SourceMap::new();
        sm.add_file("prog.lane".into(), "export float sum();\n".into());
        let mut diags = DiagSink::new();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.cpp");
        write_host_stub(&path, &st, 4, &sm, &mut diags).unwrap();
        assert_eq!(diags.error_count(), 0);
        assert!(diags.has_code(codes::STUB_NONVOID));
        assert!(!std::fs::read_to_string(&path).unwrap().contains("sum("));
    }
}
