//! Tile tessellation
//!
//! Turns a decoded tile into one vertex buffer in the style's packing
//! layout plus one index buffer. Every vertex is `[x, y, ex, ey, attrs...]`
//! where `ex, ey` is the stroke normal, the symbol quad corner, or zero for
//! fills. Attribute words are computed once per feature and repeated on
//! each of its vertices.
//!
//! Building is pure: the same tile and style always produce byte-identical
//! buffers, so results can be cached by `(tile, style hash)`.

use std::cmp::Ordering;

use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};
use lyon::math::point;
use lyon::path::Path;
use smallvec::SmallVec;
use strata_core::{evaluate, read_property, EvalContext, Value};
use strata_style::{
    AttributeSource, CompiledStyle, PackIssue, ProgramKind, StyleProperty, BASE_FLOATS,
};

use crate::buffers::{DrawRange, SymbolPlacement, TileBuffers};
use crate::config::TessellationConfig;
use crate::error::TessellationWarning;
use crate::tile::{DecodedTile, Feature, Geometry};

const STROKE_INDICES: [u32; 6] = [0, 1, 2, 1, 3, 2];
const SYMBOL_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];
const SYMBOL_CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

/// Builds CPU-side buffers for one tile under one style.
///
/// The cache runs builders on blocking worker threads.
pub trait TileBuilder: Send + Sync + 'static {
    fn build(&self, tile: &DecodedTile, style: &CompiledStyle) -> TileBuffers;
}

#[derive(Clone, Debug, Default)]
pub struct Tessellator {
    config: TessellationConfig,
}

/// A feature that survived filtering, with its packed attribute words
struct Prepared<'t> {
    index: usize,
    feature: &'t Feature,
    z_index: f64,
    words: Vec<f32>,
    icon: Option<String>,
    text: Option<String>,
}

impl Prepared<'_> {
    fn draw_order(&self, other: &Self) -> Ordering {
        self.z_index
            .total_cmp(&other.z_index)
            .then_with(|| {
                let a = self.feature.id.unwrap_or(u64::MAX);
                let b = other.feature.id.unwrap_or(u64::MAX);
                a.cmp(&b)
            })
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Growing vertex/index output
struct Mesh {
    vertex_floats: usize,
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl Mesh {
    fn next_index(&self) -> u32 {
        (self.vertices.len() / self.vertex_floats) as u32
    }

    fn push_vertex(&mut self, position: [f32; 2], extrude: [f32; 2], words: &[f32]) {
        self.vertices
            .extend_from_slice(&[position[0], position[1], extrude[0], extrude[1]]);
        self.vertices.extend_from_slice(words);
    }
}

impl Tessellator {
    pub fn new(config: TessellationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TessellationConfig {
        &self.config
    }

    fn prepare<'t>(
        &self,
        tile: &'t DecodedTile,
        style: &CompiledStyle,
        warnings: &mut Vec<TessellationWarning>,
    ) -> Vec<Prepared<'t>> {
        let zoom = tile.id.z as f64;
        let has_symbols = style.property(StyleProperty::IconSrc).is_some()
            || style.property(StyleProperty::TextField).is_some();
        let mut prepared = Vec::with_capacity(tile.features.len());

        for (index, feature) in tile.features.iter().enumerate() {
            let ctx = style.build_context(&feature.properties, zoom);
            match style.passes_filter(&ctx) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    tracing::warn!(tile = %tile.id, feature = index, error = %err, "filter failed, feature skipped");
                    warnings.push(TessellationWarning::from_eval(index, "filter", err));
                    continue;
                }
            }

            if feature.geometry.is_degenerate() {
                tracing::warn!(tile = %tile.id, feature = index, kind = feature.geometry.kind(), "degenerate geometry skipped");
                warnings.push(TessellationWarning::DegenerateGeometry {
                    feature: index,
                    kind: feature.geometry.kind(),
                });
                continue;
            }

            let z_index = self
                .evaluate(style, StyleProperty::ZIndex, &ctx, index, warnings)
                .as_number()
                .unwrap_or(0.0);
            let words = pack_words(style, &ctx, index, warnings);

            let (icon, text) = if has_symbols && matches!(feature.geometry, Geometry::Point(_)) {
                let icon = self.evaluate(style, StyleProperty::IconSrc, &ctx, index, warnings);
                let text = self.evaluate(style, StyleProperty::TextField, &ctx, index, warnings);
                (non_empty(icon), non_empty(text))
            } else {
                (None, None)
            };

            prepared.push(Prepared {
                index,
                feature,
                z_index,
                words,
                icon,
                text,
            });
        }

        prepared.sort_by(|a, b| a.draw_order(b));
        prepared
    }

    fn evaluate(
        &self,
        style: &CompiledStyle,
        property: StyleProperty,
        ctx: &EvalContext<'_>,
        feature: usize,
        warnings: &mut Vec<TessellationWarning>,
    ) -> Value {
        style.evaluate(property, ctx).unwrap_or_else(|err| {
            warnings.push(TessellationWarning::from_eval(feature, property.name(), err));
            property.default_value()
        })
    }

    fn fill(&self, mesh: &mut Mesh, prepared: &Prepared<'_>, tessellator: &mut FillTessellator) {
        let Geometry::Polygon(rings) = &prepared.feature.geometry else {
            return;
        };

        let mut builder = Path::builder();
        for ring in rings {
            if ring.len() < 3 || !ring.iter().all(|p| p[0].is_finite() && p[1].is_finite()) {
                continue;
            }
            builder.begin(point(ring[0][0] as f32, ring[0][1] as f32));
            for p in &ring[1..] {
                builder.line_to(point(p[0] as f32, p[1] as f32));
            }
            builder.end(true);
        }
        let path = builder.build();

        let mut geometry: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
        let options = FillOptions::default()
            .with_tolerance(self.config.fill_tolerance)
            .with_fill_rule(FillRule::EvenOdd);
        let result = tessellator.tessellate_path(
            &path,
            &options,
            &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
                vertex.position().to_array()
            }),
        );
        if let Err(err) = result {
            tracing::warn!("polygon fill tessellation failed: {:?}", err);
            return;
        }

        let base = mesh.next_index();
        for position in &geometry.vertices {
            mesh.push_vertex(*position, [0.0, 0.0], &prepared.words);
        }
        mesh.indices.extend(geometry.indices.iter().map(|i| base + i));
    }

    fn stroke(&self, mesh: &mut Mesh, prepared: &Prepared<'_>) {
        match &prepared.feature.geometry {
            Geometry::Line(lines) => {
                for line in lines {
                    stroke_segments(mesh, line.windows(2).map(|w| (w[0], w[1])), &prepared.words);
                }
            }
            Geometry::Polygon(rings) => {
                for ring in rings {
                    let closing = match (ring.first(), ring.last()) {
                        (Some(first), Some(last)) if first != last => Some((*last, *first)),
                        _ => None,
                    };
                    let segments = ring.windows(2).map(|w| (w[0], w[1])).chain(closing);
                    stroke_segments(mesh, segments, &prepared.words);
                }
            }
            Geometry::Point(_) => {}
        }
    }

    fn symbols(&self, mesh: &mut Mesh, prepared: &Prepared<'_>) {
        let Geometry::Point(points) = &prepared.feature.geometry else {
            return;
        };
        for p in points.iter().filter(|p| p[0].is_finite() && p[1].is_finite()) {
            let base = mesh.next_index();
            let position = [p[0] as f32, p[1] as f32];
            for corner in SYMBOL_CORNERS {
                mesh.push_vertex(position, corner, &prepared.words);
            }
            mesh.indices.extend(SYMBOL_INDICES.iter().map(|i| base + i));
        }
    }
}

impl TileBuilder for Tessellator {
    fn build(&self, tile: &DecodedTile, style: &CompiledStyle) -> TileBuffers {
        let plan = style.plan();
        let mut warnings = Vec::new();
        let prepared = self.prepare(tile, style, &mut warnings);

        let mut mesh = Mesh {
            vertex_floats: BASE_FLOATS + plan.stride(),
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        let mut draw_ranges = SmallVec::new();
        let mut fill_tessellator = FillTessellator::new();

        for kind in ProgramKind::ALL {
            if !style.has_program(kind) {
                continue;
            }
            let first_index = mesh.indices.len() as u32;
            for feature in &prepared {
                match kind {
                    ProgramKind::Fill => self.fill(&mut mesh, feature, &mut fill_tessellator),
                    ProgramKind::Stroke => self.stroke(&mut mesh, feature),
                    ProgramKind::Symbol => self.symbols(&mut mesh, feature),
                }
            }
            let index_count = mesh.indices.len() as u32 - first_index;
            if index_count > 0 {
                draw_ranges.push(DrawRange {
                    kind,
                    first_index,
                    index_count,
                });
            }
        }

        let mut symbols = Vec::new();
        for feature in &prepared {
            if feature.icon.is_none() && feature.text.is_none() {
                continue;
            }
            if let Geometry::Point(points) = &feature.feature.geometry {
                for p in points.iter().filter(|p| p[0].is_finite() && p[1].is_finite()) {
                    symbols.push(SymbolPlacement {
                        feature: feature.index,
                        id: feature.feature.id,
                        position: *p,
                        icon: feature.icon.clone(),
                        text: feature.text.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            tile = %tile.id,
            style = %style.hash(),
            features = prepared.len(),
            vertices = mesh.vertices.len() / mesh.vertex_floats,
            indices = mesh.indices.len(),
            warnings = warnings.len(),
            "tessellated tile"
        );

        TileBuffers {
            tile: tile.id,
            style: style.hash(),
            generation: tile.generation,
            vertices: mesh.vertices,
            indices: mesh.indices,
            layout: plan.vertex_layout(),
            draw_ranges,
            symbols,
            feature_count: prepared.len(),
            warnings,
        }
    }
}

/// Attribute words for one feature, in plan order
fn pack_words(
    style: &CompiledStyle,
    ctx: &EvalContext<'_>,
    feature: usize,
    warnings: &mut Vec<TessellationWarning>,
) -> Vec<f32> {
    let plan = style.plan();
    let mut words = Vec::with_capacity(plan.stride());
    for attribute in plan.attributes() {
        let (value, fallback) = match &attribute.source {
            AttributeSource::Property { name } => (
                read_property(ctx.properties, name, attribute.ty),
                Value::default_for(attribute.ty),
            ),
            AttributeSource::Evaluated { property, expr } => {
                (evaluate(expr, ctx), property.default_value())
            }
        };
        let value = value.unwrap_or_else(|err| {
            warnings.push(TessellationWarning::from_eval(feature, &attribute.name, err));
            fallback
        });
        if let Some(PackIssue::OutOfRange { value, min, max }) = attribute.pack(&value, &mut words) {
            warnings.push(TessellationWarning::OutOfRange {
                feature,
                attribute: attribute.name.clone(),
                value,
                min,
                max,
            });
        }
    }
    words
}

/// One quad per segment of non-zero length
fn stroke_segments(
    mesh: &mut Mesh,
    segments: impl Iterator<Item = ([f64; 2], [f64; 2])>,
    words: &[f32],
) {
    for (a, b) in segments {
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        let length = (dx * dx + dy * dy).sqrt();
        if !length.is_finite() || length == 0.0 {
            continue;
        }
        let normal = [(-dy / length) as f32, (dx / length) as f32];
        let flipped = [-normal[0], -normal[1]];
        let start = [a[0] as f32, a[1] as f32];
        let end = [b[0] as f32, b[1] as f32];

        let base = mesh.next_index();
        mesh.push_vertex(start, normal, words);
        mesh.push_vertex(start, flipped, words);
        mesh.push_vertex(end, normal, words);
        mesh.push_vertex(end, flipped, words);
        mesh.indices.extend(STROKE_INDICES.iter().map(|i| base + i));
    }
}

fn non_empty(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}
