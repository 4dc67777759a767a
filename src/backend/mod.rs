pub mod abi;
pub mod codegen;
pub mod deps;
pub mod dispatch;
pub mod header;
pub mod lower;
pub mod mangle;
pub mod reconcile;
pub mod stubs;
pub mod target;
