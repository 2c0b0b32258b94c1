//! Vertex attribute packing
//!
//! Every vertex starts with `[x, y, ex, ey]`. The packer appends one slot per
//! feature-varying value the shaders need and fixes, once per style, how
//! each value is quantized into f32 words and unpacked again in WGSL.

use rustc_hash::FxHashSet;
use serde::Serialize;
use strata_core::{string_id, Color, Expr, Value, ValueType};

use crate::property::StyleProperty;
use crate::shader::expr::{wgsl_float, ShaderType, ShaderValue};

/// Floats per vertex ahead of the attribute block: position and extrusion
pub const BASE_FLOATS: usize = 4;

/// Where the per-feature value of an attribute comes from
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeSource {
    /// A raw feature property read by inline shader code
    Property { name: String },
    /// A whole style property evaluated on the CPU
    Evaluated { property: StyleProperty, expr: Expr },
}

/// How a value is squeezed into f32 words
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Quantization {
    /// Stored as-is
    Raw,
    /// Four 8-bit channels, two per word
    PackedColor,
    /// `[min, max]` mapped onto `[0, 1]`, clamped
    Normalized { min: f64, max: f64 },
    /// 0.0 or 1.0
    Flag,
    /// 24-bit string id
    StringId,
}

impl Quantization {
    fn for_type(ty: ValueType, bounds: Option<(f64, f64)>) -> Self {
        match ty {
            ValueType::Color => Quantization::PackedColor,
            ValueType::Boolean => Quantization::Flag,
            ValueType::String => Quantization::StringId,
            ValueType::Number | ValueType::NumberArray => match bounds {
                Some((min, max)) => Quantization::Normalized { min, max },
                None => Quantization::Raw,
            },
        }
    }

    pub fn components(self) -> usize {
        match self {
            Quantization::PackedColor => 2,
            _ => 1,
        }
    }
}

/// A value that could not be packed exactly
#[derive(Clone, Debug, PartialEq)]
pub enum PackIssue {
    /// Clamped into the declared range, or saturated to the f32 range
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// One attribute slot the tessellator must fill for every vertex
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeRequest {
    /// Base identifier; sanitized and made unique by the packer
    pub ident: String,
    pub ty: ValueType,
    pub source: AttributeSource,
    /// Declared numeric range of the source, if any
    pub bounds: Option<(f64, f64)>,
}

impl AttributeRequest {
    pub fn property(name: &str, ty: ValueType, bounds: Option<(f64, f64)>) -> Self {
        Self {
            ident: format!("prop_{name}"),
            ty,
            source: AttributeSource::Property {
                name: name.to_string(),
            },
            bounds,
        }
    }

    pub fn evaluated(property: StyleProperty, expr: Expr) -> Self {
        Self {
            ident: format!("style_{}", property.ident()),
            ty: property.value_type(),
            source: AttributeSource::Evaluated { property, expr },
            bounds: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledAttribute {
    /// Vertex input field, `a_<ident>`
    pub name: String,
    /// Local bound to the unpacked value inside `vs_main`
    pub local: String,
    pub ty: ValueType,
    pub source: AttributeSource,
    pub quantization: Quantization,
    /// Float offset within the attribute block
    pub offset: usize,
}

impl CompiledAttribute {
    pub fn components(&self) -> usize {
        self.quantization.components()
    }

    pub fn shader_type(&self) -> ShaderType {
        ShaderType::of(self.ty)
    }

    /// Append the packed words for `value`.
    ///
    /// `value` must already have the attribute's type; anything else packs
    /// as the type's zero value.
    pub fn pack(&self, value: &Value, out: &mut Vec<f32>) -> Option<PackIssue> {
        match self.quantization {
            Quantization::PackedColor => {
                out.extend(value.as_color().unwrap_or(Color::TRANSPARENT).pack());
                None
            }
            Quantization::Flag => {
                out.push(if value.as_bool().unwrap_or(false) { 1.0 } else { 0.0 });
                None
            }
            Quantization::StringId => {
                out.push(string_id(value.as_str().unwrap_or_default()) as f32);
                None
            }
            Quantization::Raw => {
                let raw = value.as_number().unwrap_or(0.0);
                let limit = f32::MAX as f64;
                let saturated = if raw.is_nan() { 0.0 } else { raw.clamp(-limit, limit) };
                out.push(saturated as f32);
                (saturated != raw).then_some(PackIssue::OutOfRange {
                    value: raw,
                    min: -limit,
                    max: limit,
                })
            }
            Quantization::Normalized { min, max } => {
                let raw = value.as_number().unwrap_or(min);
                let clamped = raw.clamp(min, max);
                out.push(((clamped - min) / (max - min)) as f32);
                (clamped != raw).then_some(PackIssue::OutOfRange {
                    value: raw,
                    min,
                    max,
                })
            }
        }
    }

    /// Mirror of the WGSL unpack expression
    pub fn decode(&self, words: &[f32]) -> ShaderValue {
        let word = |i: usize| words.get(i).copied().unwrap_or(0.0);
        match self.quantization {
            Quantization::PackedColor => {
                ShaderValue::Vec4(Color::unpack([word(0), word(1)]).to_array())
            }
            Quantization::Flag => ShaderValue::Bool(word(0) > 0.5),
            Quantization::Raw | Quantization::StringId => ShaderValue::Float(word(0)),
            Quantization::Normalized { min, max } => {
                let (min, max) = (min as f32, max as f32);
                let t = word(0);
                ShaderValue::Float(min * (1.0 - t) + max * t)
            }
        }
    }

    /// WGSL type of the vertex input field
    pub fn wgsl_input_type(&self) -> &'static str {
        match self.quantization {
            Quantization::PackedColor => "vec2<f32>",
            _ => "f32",
        }
    }

    /// WGSL expression that recovers the value from `vertex_in`
    pub fn unpack_wgsl(&self) -> String {
        let field = format!("vertex_in.{}", self.name);
        match self.quantization {
            Quantization::PackedColor => format!("unpack_color({field})"),
            Quantization::Flag => format!("({field} > 0.5)"),
            Quantization::Raw | Quantization::StringId => field,
            Quantization::Normalized { min, max } => format!(
                "mix({}, {}, {field})",
                wgsl_float(min as f32),
                wgsl_float(max as f32)
            ),
        }
    }
}

/// Vertex buffer layout description handed to the GPU backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VertexLayout {
    pub stride_bytes: u64,
    pub slots: Vec<VertexSlot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VertexSlot {
    pub name: String,
    pub location: u32,
    pub components: u32,
    pub offset_bytes: u64,
}

/// Ordered attribute list and per-vertex stride for one compiled style
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackingPlan {
    attributes: Vec<CompiledAttribute>,
    stride: usize,
}

impl PackingPlan {
    pub fn attributes(&self) -> &[CompiledAttribute] {
        &self.attributes
    }

    /// Attribute floats per vertex, excluding position and extrusion
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total floats per vertex
    pub fn vertex_floats(&self) -> usize {
        BASE_FLOATS + self.stride
    }

    pub fn vertex_stride_bytes(&self) -> u64 {
        (self.vertex_floats() * std::mem::size_of::<f32>()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn needs_color_unpack(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| a.quantization == Quantization::PackedColor)
    }

    /// Local that holds the unpacked value of a feature property
    pub fn local_for_property(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find_map(|a| match &a.source {
            AttributeSource::Property { name: n } if n == name => Some(a.local.as_str()),
            _ => None,
        })
    }

    /// Attribute carrying a pre-evaluated style property
    pub fn evaluated(&self, property: StyleProperty) -> Option<&CompiledAttribute> {
        self.attributes.iter().find(|a| {
            matches!(&a.source, AttributeSource::Evaluated { property: p, .. } if *p == property)
        })
    }

    pub fn vertex_layout(&self) -> VertexLayout {
        let mut slots = vec![
            VertexSlot {
                name: "position".to_string(),
                location: 0,
                components: 2,
                offset_bytes: 0,
            },
            VertexSlot {
                name: "extrude".to_string(),
                location: 1,
                components: 2,
                offset_bytes: 8,
            },
        ];
        for (i, attribute) in self.attributes.iter().enumerate() {
            slots.push(VertexSlot {
                name: attribute.name.clone(),
                location: 2 + i as u32,
                components: attribute.components() as u32,
                offset_bytes: ((BASE_FLOATS + attribute.offset) * 4) as u64,
            });
        }
        VertexLayout {
            stride_bytes: self.vertex_stride_bytes(),
            slots,
        }
    }
}

/// Assigns slots and names to attribute requests
#[derive(Debug, Default)]
pub struct AttributePacker {
    requests: Vec<AttributeRequest>,
}

impl AttributePacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request; a second request for the same source is ignored
    pub fn request(&mut self, request: AttributeRequest) {
        if !self.requests.iter().any(|r| r.source == request.source) {
            self.requests.push(request);
        }
    }

    /// Fix the layout. Order follows request order, which callers derive
    /// from the sorted property list, so equal styles get equal plans.
    pub fn finish(self) -> PackingPlan {
        let mut taken: FxHashSet<String> = FxHashSet::default();
        let mut attributes = Vec::with_capacity(self.requests.len());
        let mut offset = 0;

        for request in self.requests {
            let ident = unique_ident(&sanitize(&request.ident), &mut taken);
            let quantization = Quantization::for_type(request.ty, request.bounds);
            attributes.push(CompiledAttribute {
                name: format!("a_{ident}"),
                local: ident,
                ty: request.ty,
                source: request.source,
                quantization,
                offset,
            });
            offset += quantization.components();
        }

        PackingPlan {
            attributes,
            stride: offset,
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    // WGSL reserves identifiers starting with two underscores
    while out.starts_with("__") {
        out.remove(0);
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'v');
    }
    out
}

fn unique_ident(base: &str, taken: &mut FxHashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(requests: Vec<AttributeRequest>) -> PackingPlan {
        let mut packer = AttributePacker::new();
        for r in requests {
            packer.request(r);
        }
        packer.finish()
    }

    #[test]
    fn offsets_follow_component_counts() {
        let plan = plan(vec![
            AttributeRequest::evaluated(
                StyleProperty::FillColor,
                Expr::Literal(Value::Color(Color::RED)),
            ),
            AttributeRequest::property("width", ValueType::Number, None),
        ]);
        assert_eq!(plan.stride(), 3);
        assert_eq!(plan.attributes()[1].offset, 2);
        let layout = plan.vertex_layout();
        assert_eq!(layout.stride_bytes, 28);
        assert_eq!(layout.slots[3].offset_bytes, 24);
        assert_eq!(layout.slots[3].location, 3);
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let plan = plan(vec![
            AttributeRequest::property("road-class", ValueType::Number, None),
            AttributeRequest::property("road_class", ValueType::Number, None),
            AttributeRequest::property("road-class", ValueType::Number, None),
        ]);
        let names: Vec<_> = plan.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a_prop_road_class", "a_prop_road_class_1"]);
        assert_eq!(plan.local_for_property("road_class"), Some("prop_road_class_1"));
    }

    #[test]
    fn bounded_numbers_clamp_with_a_diagnostic() {
        let plan = plan(vec![AttributeRequest::property(
            "population",
            ValueType::Number,
            Some((0.0, 100.0)),
        )]);
        let attribute = &plan.attributes()[0];

        let mut words = Vec::new();
        assert_eq!(attribute.pack(&Value::Number(25.0), &mut words), None);
        assert_eq!(attribute.decode(&words), ShaderValue::Float(25.0));

        words.clear();
        let issue = attribute.pack(&Value::Number(140.0), &mut words);
        assert!(matches!(issue, Some(PackIssue::OutOfRange { value, .. }) if value == 140.0));
        assert_eq!(attribute.decode(&words), ShaderValue::Float(100.0));
        assert_eq!(attribute.unpack_wgsl(), "mix(0.0, 100.0, vertex_in.a_prop_population)");
    }

    #[test]
    fn unbounded_numbers_saturate_to_f32() {
        let plan = plan(vec![AttributeRequest::property("area", ValueType::Number, None)]);
        let attribute = &plan.attributes()[0];

        let mut words = Vec::new();
        assert!(attribute.pack(&Value::Number(1e300), &mut words).is_some());
        assert!(attribute.pack(&Value::Number(f64::NAN), &mut words).is_some());
        assert_eq!(attribute.pack(&Value::Number(-2.5), &mut words), None);
        assert_eq!(words, vec![f32::MAX, 0.0, -2.5]);
    }

    #[test]
    fn colors_survive_packing_at_8_bit_precision() {
        let plan = plan(vec![AttributeRequest::evaluated(
            StyleProperty::FillColor,
            Expr::Literal(Value::Color(Color::RED)),
        )]);
        let attribute = &plan.attributes()[0];
        let color = Color::from_rgba8(18, 52, 86, 120);
        let mut words = Vec::new();
        attribute.pack(&Value::Color(color), &mut words);
        assert_eq!(words, vec![(18 * 256 + 52) as f32, (86 * 256 + 120) as f32]);
        let ShaderValue::Vec4(decoded) = attribute.decode(&words) else {
            panic!("expected a color");
        };
        for (a, b) in decoded.iter().zip(color.to_array()) {
            assert!((a - b).abs() <= 0.5 / 255.0);
        }
    }

    #[test]
    fn sanitize_produces_valid_identifiers() {
        assert_eq!(sanitize("a b-c"), "a_b_c");
        assert_eq!(sanitize("__x"), "_x");
        assert_eq!(sanitize("9lives"), "v9lives");
    }
}
