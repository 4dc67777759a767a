//! 前端边界：AST 数据形状 + 声明事件流的装载。
//!
//! 词法与语法分析在独立的前端里完成，这里只消费它产出的 `Program`。

pub mod ast;
pub mod span;

use anyhow::{Context, Result};

use crate::frontend::ast::Program;

/// 从外部前端序列化出的 JSON 声明流装载 `Program`
pub fn load_program_str(src: &str) -> Result<Program> {
    serde_json::from_str(src).context("malformed declaration stream from front end")
}
