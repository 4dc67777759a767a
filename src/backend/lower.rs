// src/backend/lower.rs
//! 表达式/语句 lowering 的协作者接口。
//!
//! 函数体如何降为 IR 指令不属于本仓库；驱动只负责把通过校验的定义
//! （连同其可调用工件）递交给装配进来的 lowerer。没有 lowerer 时
//! 函数保持“已声明未定义”，目标文件里是未解析符号。

use anyhow::Result;

use crate::backend::codegen::{PendingBody, UnitBackend};

pub trait BodyLowerer {
    fn lower(&mut self, be: &mut UnitBackend, body: &PendingBody) -> Result<()>;
}
