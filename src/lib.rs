// src/lib.rs
//! Lane 编译器的语义分析与多目标代码生成编排层。
//!
//! 词法/语法、表达式 lowering、优化管线都是外部协作者；这里负责
//! 全局声明校验、逐目标编译驱动、跨目标全局收编与运行期分发合成。

pub mod backend;
pub mod cli;
pub mod diag;
pub mod driver;
pub mod frontend;
pub mod middle;
pub mod project;
pub mod utils;

pub use diag::{DiagSink, SourceMap, render_diagnostics_colored};
pub use driver::{BuildContext, BuildOptions, OutputKind, SourceInput, compile_and_output};
