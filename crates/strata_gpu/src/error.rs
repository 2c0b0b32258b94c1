//! Error types for the GPU layer

use std::sync::Arc;

use strata_core::{EvalError, ValueType};
use strata_style::{ProgramKind, StyleHash};
use thiserror::Error;

use crate::tile::TileId;

/// Recoverable per-feature diagnostic. The tile build always succeeds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TessellationWarning {
    #[error("feature {feature}: degenerate {kind} geometry skipped")]
    DegenerateGeometry { feature: usize, kind: &'static str },

    #[error("feature {feature}: property `{name}` expected {expected}, found {found}; using default")]
    PropertyType {
        feature: usize,
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    #[error("feature {feature}: `{attribute}` value {value} clamped to [{min}, {max}]")]
    OutOfRange {
        feature: usize,
        attribute: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("feature {feature}: evaluating `{target}` failed: {error}")]
    Evaluation {
        feature: usize,
        target: String,
        error: EvalError,
    },
}

impl TessellationWarning {
    pub(crate) fn from_eval(feature: usize, target: &str, error: EvalError) -> Self {
        match error {
            EvalError::PropertyType {
                name,
                expected,
                found,
            } => TessellationWarning::PropertyType {
                feature,
                name,
                expected,
                found,
            },
            error => TessellationWarning::Evaluation {
                feature,
                target: target.to_string(),
                error,
            },
        }
    }

    /// Input position of the affected feature
    pub fn feature(&self) -> usize {
        match self {
            TessellationWarning::DegenerateGeometry { feature, .. }
            | TessellationWarning::PropertyType { feature, .. }
            | TessellationWarning::OutOfRange { feature, .. }
            | TessellationWarning::Evaluation { feature, .. } => *feature,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("build for tile {tile} failed: {source}")]
    BuildFailed {
        tile: TileId,
        #[source]
        source: Arc<tokio::task::JoinError>,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("style {style} has no {kind} program")]
    MissingProgram { style: StyleHash, kind: ProgramKind },

    #[error("tile {0} has no geometry to upload")]
    EmptyTile(TileId),

    #[error("{what} buffer of {size} bytes exceeds the device limit of {limit} bytes")]
    BufferTooLarge {
        what: &'static str,
        size: u64,
        limit: u64,
    },
}
