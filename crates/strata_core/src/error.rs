//! Compile and evaluation error types

use thiserror::Error;

use crate::value::ValueType;

/// Structural style errors. Any of these makes the whole style unusable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("`{property}`: unknown operator `{operator}`")]
    UnknownOperator { property: String, operator: String },

    #[error("`{property}`: `{operator}` expected {expected}, got {got}")]
    TypeMismatch {
        property: String,
        operator: String,
        expected: String,
        got: String,
    },

    #[error("`{property}`: `{operator}` expects {expected} arguments, got {got}")]
    ArityMismatch {
        property: String,
        operator: String,
        expected: String,
        got: usize,
    },

    #[error("`{property}`: feature property `{name}` is not declared in the schema")]
    UnresolvedProperty { property: String, name: String },

    #[error("`{property}`: style variable `{name}` is not declared")]
    UnresolvedVariable { property: String, name: String },

    #[error("`{property}`: no external function named `{name}` is registered")]
    UnknownExternal { property: String, name: String },

    #[error("`{property}`: invalid literal: {reason}")]
    InvalidLiteral { property: String, reason: String },

    #[error("`{property}`: interpolation stops must be ascending number literals")]
    InvalidStops { property: String },

    #[error("unknown style property `{0}`")]
    UnknownStyleProperty(String),

    #[error("invalid style specification: {0}")]
    InvalidSpec(String),
}

impl CompileError {
    /// Style property the error was raised for, if any
    pub fn property(&self) -> Option<&str> {
        match self {
            CompileError::UnknownOperator { property, .. }
            | CompileError::TypeMismatch { property, .. }
            | CompileError::ArityMismatch { property, .. }
            | CompileError::UnresolvedProperty { property, .. }
            | CompileError::UnresolvedVariable { property, .. }
            | CompileError::UnknownExternal { property, .. }
            | CompileError::InvalidLiteral { property, .. }
            | CompileError::InvalidStops { property } => Some(property),
            CompileError::UnknownStyleProperty(name) => Some(name),
            CompileError::InvalidSpec(_) => None,
        }
    }
}

/// Per-feature evaluation failures. Callers default the affected value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("property `{name}` expected {expected}, found {found}")]
    PropertyType {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("external `{name}` returned {found}, expected {expected}")]
    ExternalType {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("operand of `{operator}` evaluated to {found}")]
    Operand {
        operator: &'static str,
        found: ValueType,
    },

    #[error("external function #{0} is not registered")]
    MissingExternal(usize),
}

pub type Result<T> = std::result::Result<T, CompileError>;
