//! Strata GPU
//!
//! Everything between a compiled style and a draw call:
//!
//! - **Tessellation**: decoded tiles to packed vertex and index buffers
//! - **Cache**: one build per `(tile, style)`, refcounted residency
//! - **Upload**: wgpu buffers, shader modules and render pipelines
//!
//! Tessellation is pure CPU work and runs on blocking worker threads. Only
//! [`GpuTileBuffers::upload`] and [`GpuProgramCache`] touch the device and
//! must run on the thread that owns it.

pub mod buffers;
pub mod cache;
pub mod config;
pub mod error;
pub mod program;
pub mod tessellate;
pub mod tile;
pub mod upload;

pub use buffers::{DrawRange, SymbolPlacement, TileBuffers};
pub use cache::{BuildOutcome, CacheKey, CacheStats, TileCache};
pub use config::{CacheConfig, TessellationConfig};
pub use error::{CacheError, GpuError, TessellationWarning};
pub use program::{GpuProgram, GpuProgramCache, GpuUniforms};
pub use tessellate::{Tessellator, TileBuilder};
pub use tile::{DecodedTile, Feature, Geometry, TileId};
pub use upload::{vertex_attributes, vertex_format, GpuTileBuffers};
