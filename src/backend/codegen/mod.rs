use anyhow::{Result, anyhow};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module, default_libcall_names};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::backend::abi::{self, LayoutTy};
use crate::backend::target::build_isa;
use crate::diag::Span;
use crate::driver::BuildContext;
use crate::frontend::ast::{Body, FnSig, StorageClass, Ty};
use crate::middle::symtab::GlobalId;
use crate::utils::fast::{FastMap, fast_map};

// 顺序很重要：上下文/结构体 → 全局数据 → 函数声明 → 产出
include!("context.rs");
include!("data.rs");
include!("declare.rs");
include!("emit.rs");
