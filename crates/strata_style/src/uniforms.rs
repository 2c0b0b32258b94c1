//! Uniform block layout and per-frame values
//!
//! The block is `projection: mat4x4<f32>` followed by one `vec4<f32>` per
//! uniform. Scalars live in `.x`, booleans are `.x > 0.5` and colors use the
//! whole vector, which keeps every field 16-byte aligned.

use std::collections::BTreeMap;
use std::fmt::Write;

use strata_core::{FrameInput, Value};

use crate::packer::sanitize;
use crate::property::StyleProperty;
use crate::shader::expr::ShaderType;

/// Bytes taken by the projection matrix at the head of the block
pub const PROJECTION_BYTES: usize = 64;
/// Bytes per uniform slot
pub const SLOT_BYTES: usize = 16;

/// What a uniform slot is filled from at draw time
#[derive(Clone, Debug, PartialEq)]
pub enum UniformSource {
    Frame(FrameInput),
    /// A hoisted style property evaluated once per draw
    Property(StyleProperty),
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub ty: ShaderType,
    pub source: UniformSource,
}

/// Ordered, name-deduplicated uniform declarations
#[derive(Clone, Debug, PartialEq)]
pub struct UniformLayout {
    slots: Vec<UniformSlot>,
}

impl Default for UniformLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformLayout {
    /// Layout holding the frame inputs every program may read
    pub fn new() -> Self {
        let mut layout = Self { slots: Vec::new() };
        for input in [FrameInput::Zoom, FrameInput::Resolution, FrameInput::Time] {
            layout.frame_input(&input, ShaderType::Float);
        }
        layout
    }

    /// Declare (once) the uniform for a frame input and return its name
    pub fn frame_input(&mut self, input: &FrameInput, ty: ShaderType) -> String {
        let name = match input {
            FrameInput::Zoom => "u_zoom".to_string(),
            FrameInput::Resolution => "u_resolution".to_string(),
            FrameInput::Time => "u_time".to_string(),
            FrameInput::Variable(var) => format!("u_var_{}", sanitize(var)),
        };
        self.push(UniformSlot {
            name,
            ty,
            source: UniformSource::Frame(input.clone()),
        })
    }

    /// Declare a hoisted style property and return its uniform name
    pub fn property(&mut self, property: StyleProperty) -> String {
        let name = format!("u_{}", property.ident());
        self.push(UniformSlot {
            name,
            ty: ShaderType::of(property.value_type()),
            source: UniformSource::Property(property),
        })
    }

    /// Insert unless the source is already declared; sanitized names that
    /// collide get a numeric suffix
    fn push(&mut self, mut slot: UniformSlot) -> String {
        if let Some(existing) = self.slots.iter().find(|s| s.source == slot.source) {
            return existing.name.clone();
        }
        let base = slot.name.clone();
        let mut suffix = 1;
        while self.slots.iter().any(|s| s.name == slot.name) {
            slot.name = format!("{base}_{suffix}");
            suffix += 1;
        }
        let name = slot.name.clone();
        self.slots.push(slot);
        name
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }

    pub fn byte_size(&self) -> usize {
        PROJECTION_BYTES + SLOT_BYTES * self.slots.len()
    }

    /// WGSL declaration of the block and its binding
    pub fn wgsl(&self) -> String {
        let mut out = String::from("struct Uniforms {\n    projection: mat4x4<f32>,\n");
        for slot in &self.slots {
            let _ = writeln!(out, "    {}: vec4<f32>,", slot.name);
        }
        out.push_str("}\n\n@group(0) @binding(0)\nvar<uniform> uniforms: Uniforms;\n");
        out
    }
}

/// Per-draw inputs supplied by the renderer
#[derive(Clone, Debug, PartialEq)]
pub struct FrameState {
    /// Column-major world-to-clip matrix
    pub projection: [f32; 16],
    pub zoom: f64,
    /// Device pixels per style pixel
    pub resolution: f64,
    /// Seconds since an arbitrary epoch
    pub time: f64,
    /// Overrides for style variable defaults
    pub variables: BTreeMap<String, Value>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            projection: IDENTITY,
            zoom: 0.0,
            resolution: 1.0,
            time: 0.0,
            variables: BTreeMap::new(),
        }
    }
}

impl FrameState {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: [f32; 16]) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Spread a value over one uniform slot
pub fn slot_value(value: &Value) -> [f32; 4] {
    match value {
        Value::Number(n) => [*n as f32, 0.0, 0.0, 0.0],
        Value::Boolean(b) => [if *b { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        Value::Color(c) => c.to_array(),
        Value::String(s) => [strata_core::string_id(s) as f32, 0.0, 0.0, 0.0],
        Value::NumberArray(items) => {
            let mut out = [0.0; 4];
            for (slot, n) in out.iter_mut().zip(items) {
                *slot = *n as f32;
            }
            out
        }
    }
}
