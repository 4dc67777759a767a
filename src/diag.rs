// src/diag.rs
use std::fmt;

// 统一复用 frontend 的 Span / FileId，并沿用 crate::diag::Span 的访问路径
pub use crate::frontend::span::{FileId, Span};

use ariadne::{Color, Label, Report, ReportKind, Source};

/// 稳定的诊断码。测试与调用方按码断言，不按消息文本。
pub mod codes {
    // —— 语义/声明检查 —— //
    pub const SHADOWING: &str = "SM0101";
    pub const QUALIFIER: &str = "SM0102";
    pub const UNSIZED_ARRAY: &str = "SM0103";
    pub const NONCONST_INIT: &str = "SM0104";
    pub const CONFLICTING_DECL: &str = "SM0105";
    pub const REDEFINITION: &str = "SM0106";
    pub const EXPORT_OVERLOAD: &str = "SM0107";
    pub const RETURN_OVERLOAD: &str = "SM0108";
    pub const EXTERN_C_OVERLOAD: &str = "SM0109";
    pub const QUALIFIER_CONFLICT: &str = "SM0110";
    pub const TASK_RETURN: &str = "SM0111";
    pub const TASK_LINKAGE: &str = "SM0112";
    pub const EXPORT_ILLEGAL_TYPE: &str = "SM0113";
    pub const STRUCT_BY_VALUE: &str = "SM0114";
    pub const DEFAULT_ORDER: &str = "SM0115";
    pub const INVALID_EXPORT_TYPE: &str = "SM0116";
    pub const PARAM_SHADOW: &str = "SM0117";
    pub const EXTERN_INIT: &str = "SM0118";
    pub const ALIAS_CONFLICT: &str = "SM0119";
    pub const BAD_INIT: &str = "SM0120";

    // —— 多目标驱动 —— //
    pub const BAD_TARGET: &str = "DR0201";
    pub const DUPLICATE_ISA: &str = "DR0202";
    pub const CPU_OVERRIDE: &str = "DR0203";
    pub const STREAMED_SOURCE: &str = "DR0204";
    pub const STDOUT_MULTI: &str = "DR0205";
    pub const BAD_CPU: &str = "DR0206";
    pub const BAD_ARCH: &str = "DR0207";

    // —— 全局变量合并 —— //
    pub const GLOBAL_LAYOUT_MISMATCH: &str = "RC0301";

    // —— 输出阶段 —— //
    pub const SUFFIX_MISMATCH: &str = "OA0501";
    pub const STUB_NONVOID: &str = "OA0502";
    pub const STUB_REF_PARAM: &str = "OA0503";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: String,
    pub file_id: String,       // 用于显示的“逻辑文件名/路径”字符串
    pub span: Option<Span>,
    pub message: String,
    pub severity: Severity,
}

#[derive(Default, Clone)]
pub struct DiagSink {
    buf: Vec<Diagnostic>,
}

impl DiagSink {
    #[inline]
    pub fn new() -> Self { Self { buf: Vec::new() } }

    pub fn error<S: Into<String>>(
        &mut self,
        code: &str,
        file_id: &str,
        span: Option<Span>,
        msg: S,
    ) {
        self.buf.push(Diagnostic {
            code: code.to_string(),
            file_id: file_id.to_string(),
            span,
            message: msg.into(),
            severity: Severity::Error,
        });
    }

    pub fn warn<S: Into<String>>(
        &mut self,
        code: &str,
        file_id: &str,
        span: Option<Span>,
        msg: S,
    ) {
        self.buf.push(Diagnostic {
            code: code.to_string(),
            file_id: file_id.to_string(),
            span,
            message: msg.into(),
            severity: Severity::Warning,
        });
    }

    pub fn note<S: Into<String>>(
        &mut self,
        code: &str,
        file_id: &str,
        span: Option<Span>,
        msg: S,
    ) {
        self.buf.push(Diagnostic {
            code: code.to_string(),
            file_id: file_id.to_string(),
            span,
            message: msg.into(),
            severity: Severity::Note,
        });
    }

    /// 进程退出码只看 error 数量，warning 永远不算
    pub fn error_count(&self) -> usize {
        self.buf.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.buf.iter().any(|d| d.code == code)
    }

    pub fn append_from(&mut self, v: Vec<Diagnostic>) {
        self.buf.extend(v);
    }

    #[inline] pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    #[inline] pub fn len(&self) -> usize { self.buf.len() }
    #[inline] pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> { self.buf.iter() }
    #[inline] pub fn into_vec(self) -> Vec<Diagnostic> { self.buf }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        if let Some(sp) = self.span {
            write!(
                f,
                "[{} {}] {} @{}:{}..{}: {}",
                sev, self.code, self.file_id, sp.file.0, sp.start, sp.end, self.message
            )
        } else {
            write!(f, "[{} {}] {}: {}", sev, self.code, self.file_id, self.message)
        }
    }
}

/// 文件名 + 源文本的登记表；FileId 即下标
#[derive(Default)]
pub struct SourceMap {
    files: Vec<(String, String)>,
}

impl SourceMap {
    pub fn new() -> Self { Self { files: Vec::new() } }

    pub fn add_file(&mut self, name: String, src: String) -> FileId {
        self.files.push((name, src));
        FileId(self.files.len() - 1)
    }

    pub fn name(&self, fid: FileId) -> &str {
        self.files.get(fid.0).map(|(n, _)| n.as_str()).unwrap_or("<unknown>")
    }

    pub fn source(&self, fid: FileId) -> &str {
        self.files.get(fid.0).map(|(_, s)| s.as_str()).unwrap_or("")
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|(n, _)| n.clone()).collect()
    }

    /// span 起点所在的 1-based 行号（诊断文本展示用）
    pub fn line_of(&self, span: Span) -> usize {
        let src = self.source(span.file);
        let upto = span.start.min(src.len());
        src[..upto].bytes().filter(|&b| b == b'\n').count() + 1
    }
}

/// 渲染收集到的诊断。有 span 且源文本可得时走 ariadne，否则退化为 stderr 单行。
pub fn render_diagnostics_colored(diags: &[Diagnostic], sm: &SourceMap) {
    for d in diags {
        let kind = match d.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Note => ReportKind::Advice,
        };
        let rendered = match d.span {
            Some(sp) if sp.file != FileId::DUMMY && !sm.source(sp.file).is_empty() => {
                let name = sm.name(sp.file);
                let color = match d.severity {
                    Severity::Error => Color::Red,
                    Severity::Warning => Color::Yellow,
                    Severity::Note => Color::Cyan,
                };
                Report::build(kind, (name, sp.range()))
                    .with_code(d.code.clone())
                    .with_message(&d.message)
                    .with_label(Label::new((name, sp.range())).with_color(color))
                    .finish()
                    .eprint((name, Source::from(sm.source(sp.file))))
                    .is_ok()
            }
            _ => false,
        };
        if !rendered {
            eprintln!("{}", d);
        }
    }
}
