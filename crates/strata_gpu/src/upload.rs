//! GPU upload of tile buffers

use smallvec::SmallVec;
use strata_style::{ProgramKind, VertexLayout};
use wgpu::util::DeviceExt;

use crate::buffers::{DrawRange, TileBuffers};
use crate::error::GpuError;
use crate::tile::TileId;

/// Vertex format for an attribute of `components` f32 words
pub fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// Vertex attributes matching a packing layout, in shader location order
pub fn vertex_attributes(layout: &VertexLayout) -> Vec<wgpu::VertexAttribute> {
    layout
        .slots
        .iter()
        .map(|slot| wgpu::VertexAttribute {
            format: vertex_format(slot.components),
            offset: slot.offset_bytes,
            shader_location: slot.location,
        })
        .collect()
}

/// Tile buffers resident on the device
#[derive(Debug)]
pub struct GpuTileBuffers {
    pub tile: TileId,
    pub generation: u64,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub draw_ranges: SmallVec<[DrawRange; 3]>,
}

impl GpuTileBuffers {
    /// Upload on the thread that owns `device`
    pub fn upload(device: &wgpu::Device, buffers: &TileBuffers) -> Result<Self, GpuError> {
        if buffers.is_empty() {
            return Err(GpuError::EmptyTile(buffers.tile));
        }

        let limit = device.limits().max_buffer_size;
        for (what, size) in [
            ("vertex", buffers.vertex_bytes().len() as u64),
            ("index", buffers.index_bytes().len() as u64),
        ] {
            if size > limit {
                return Err(GpuError::BufferTooLarge { what, size, limit });
            }
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Tile {} Vertices", buffers.tile)),
            contents: buffers.vertex_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("Tile {} Indices", buffers.tile)),
            contents: buffers.index_bytes(),
            usage: wgpu::BufferUsages::INDEX,
        });

        tracing::debug!(
            tile = %buffers.tile,
            bytes = buffers.byte_size(),
            "uploaded tile buffers"
        );

        Ok(Self {
            tile: buffers.tile,
            generation: buffers.generation,
            vertex_buffer,
            index_buffer,
            index_count: buffers.indices.len() as u32,
            draw_ranges: buffers.draw_ranges.clone(),
        })
    }

    pub fn draw_range(&self, kind: ProgramKind) -> Option<DrawRange> {
        self.draw_ranges.iter().find(|r| r.kind == kind).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_style::VertexSlot;

    #[test]
    fn attributes_follow_the_layout() {
        let layout = VertexLayout {
            stride_bytes: 28,
            slots: vec![
                VertexSlot {
                    name: "position".to_string(),
                    location: 0,
                    components: 2,
                    offset_bytes: 0,
                },
                VertexSlot {
                    name: "a_style_fill_color".to_string(),
                    location: 2,
                    components: 2,
                    offset_bytes: 16,
                },
                VertexSlot {
                    name: "a_prop_lanes".to_string(),
                    location: 3,
                    components: 1,
                    offset_bytes: 24,
                },
            ],
        };
        let attributes = vertex_attributes(&layout);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Float32x2);
        assert_eq!(attributes[2].format, wgpu::VertexFormat::Float32);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[2].shader_location, 3);
    }
}
