//! Shader IR and WGSL program assembly

pub mod assemble;
pub mod expr;

pub use assemble::{assemble, ProgramInputs, ShaderProgram};
pub use expr::{BinaryOp, Builtin, ShaderExpr, ShaderScope, ShaderType, ShaderValue};
