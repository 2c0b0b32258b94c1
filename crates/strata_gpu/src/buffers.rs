//! CPU-side tile buffers

use std::ops::Range;

use smallvec::SmallVec;
use strata_style::{ProgramKind, StyleHash, VertexLayout};

use crate::error::TessellationWarning;
use crate::tile::TileId;

/// Index range drawn with one program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRange {
    pub kind: ProgramKind,
    pub first_index: u32,
    pub index_count: u32,
}

impl DrawRange {
    pub fn indices(&self) -> Range<u32> {
        self.first_index..self.first_index + self.index_count
    }
}

/// CPU-only symbol content for one point
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolPlacement {
    /// Input position of the feature
    pub feature: usize,
    pub id: Option<u64>,
    pub position: [f64; 2],
    pub icon: Option<String>,
    pub text: Option<String>,
}

/// Vertex and index data for one tile under one compiled style.
///
/// Never patched after creation; a data or style change builds a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct TileBuffers {
    pub tile: TileId,
    pub style: StyleHash,
    pub generation: u64,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub layout: VertexLayout,
    /// Kind-major: fills, then strokes, then symbols
    pub draw_ranges: SmallVec<[DrawRange; 3]>,
    pub symbols: Vec<SymbolPlacement>,
    /// Features that passed the filter and had usable geometry
    pub feature_count: usize,
    pub warnings: Vec<TessellationWarning>,
}

impl TileBuffers {
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn vertex_count(&self) -> usize {
        let floats = (self.layout.stride_bytes / 4) as usize;
        if floats == 0 {
            0
        } else {
            self.vertices.len() / floats
        }
    }

    /// Bytes these buffers occupy once uploaded
    pub fn byte_size(&self) -> u64 {
        (self.vertex_bytes().len() + self.index_bytes().len()) as u64
    }

    pub fn draw_range(&self, kind: ProgramKind) -> Option<DrawRange> {
        self.draw_ranges.iter().find(|r| r.kind == kind).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
