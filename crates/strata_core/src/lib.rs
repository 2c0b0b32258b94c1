//! Strata Core
//!
//! The expression half of the style compiler:
//!
//! - **Values**: colors, numbers, strings and their static types
//! - **Expression IR**: a closed, typed tree built once per style property
//! - **Parser**: JSON-like style values to IR, with type inference
//! - **Interpreter**: CPU evaluation of the IR against feature properties
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use strata_core::{evaluate, EvalContext, ExternalRegistry, ParseEnv, Parser, Value, ValueType};
//!
//! let variables = BTreeMap::new();
//! let externals = ExternalRegistry::new();
//! let env = ParseEnv { schema: None, variables: &variables, externals: &externals };
//!
//! let spec = serde_json::json!(["case", [">", ["get", "x"], 10], "a", "b"]);
//! let expr = Parser::new(env).parse_property("text-field", &spec, ValueType::String).unwrap();
//!
//! let feature = BTreeMap::from([("x".to_string(), Value::Number(5.0))]);
//! let ctx = EvalContext::new(&feature, &variables, &externals);
//! assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::from("b"));
//! ```

pub mod color;
pub mod error;
pub mod eval;
pub mod expr;
pub mod parse;
pub mod schema;
pub mod value;

pub use color::Color;
pub use error::{CompileError, EvalError};
pub use eval::{evaluate, read_property, EvalContext, FeatureProperties, NoProperties};
pub use expr::{Dependencies, Expr, ExternalId, FrameInput, Interpolation, Op};
pub use parse::{ParseEnv, Parser};
pub use schema::{ExternalFn, ExternalRegistry, FeatureSchema, PropertyDecl};
pub use value::{string_id, Value, ValueType};
