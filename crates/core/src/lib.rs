pub mod ast;
pub mod cfg;
pub mod emit;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod token;

pub use cfg::{build_cfg, FunctionCfg};
pub use emit::emit_unit;
pub use parser::parse_unit;
pub use symbols::resolve;
