//! Strata Style
//!
//! Compiles declarative style specifications into GPU programs:
//!
//! - **Lowering**: per-property tier selection and translation to a typed
//!   shader IR
//! - **Packing**: the per-vertex attribute layout and its quantization
//! - **Assembly**: one WGSL vertex/fragment pair per geometry kind
//! - **Uniforms**: the per-draw block and the values that fill it
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use strata_style::{compile, ProgramKind, StyleSpec};
//!
//! let spec = StyleSpec::new()
//!     .with_property("circle-radius", json!(4))
//!     .with_property("circle-fill-color", json!("#777"));
//! let style = compile(&spec).unwrap();
//!
//! assert_eq!(style.plan().stride(), 0);
//! assert!(style.program(ProgramKind::Symbol).is_some());
//! ```

pub mod cache;
pub mod compile;
pub mod lower;
pub mod packer;
pub mod property;
pub mod shader;
pub mod spec;
pub mod uniforms;

pub use cache::StyleCache;
pub use compile::{compile, parse_style, CompiledProperty, CompiledStyle, ParsedStyle, StyleHash};
pub use lower::Tier;
pub use packer::{
    AttributePacker, AttributeRequest, AttributeSource, CompiledAttribute, PackIssue, PackingPlan,
    Quantization, VertexLayout, VertexSlot, BASE_FLOATS,
};
pub use property::{ProgramKind, StyleProperty};
pub use shader::{ShaderExpr, ShaderProgram, ShaderScope, ShaderType, ShaderValue};
pub use spec::StyleSpec;
pub use uniforms::{FrameState, UniformLayout, UniformSlot, UniformSource};
