pub mod fold;
pub mod symtab;
pub mod validate;
