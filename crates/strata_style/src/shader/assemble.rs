//! WGSL program assembly
//!
//! Templates are fixed per geometry kind; only the uniform block, the
//! vertex input struct and the per-property expressions vary by style.
//! Output is a pure function of its inputs, so equal styles produce
//! byte-identical sources.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::packer::PackingPlan;
use crate::property::{ProgramKind, StyleProperty};
use crate::shader::expr::ShaderExpr;
use crate::uniforms::UniformLayout;

/// A vertex/fragment pair for one geometry kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShaderProgram {
    pub kind: ProgramKind,
    pub vertex_source: String,
    pub fragment_source: String,
}

impl ShaderProgram {
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const FRAGMENT_ENTRY: &'static str = "fs_main";
}

const UNPACK_COLOR: &str = r#"fn unpack_color(packed: vec2<f32>) -> vec4<f32> {
    let rg = floor(packed.x / 256.0);
    let ba = floor(packed.y / 256.0);
    return vec4<f32>(rg, packed.x - rg * 256.0, ba, packed.y - ba * 256.0) / 255.0;
}
"#;

/// Inputs shared by every program of one style
pub struct ProgramInputs<'a> {
    pub header: &'a str,
    pub plan: &'a PackingPlan,
    pub uniforms: &'a UniformLayout,
    /// Vertex-stage expression per property; absent ones use defaults
    pub values: &'a BTreeMap<StyleProperty, ShaderExpr>,
}

impl ProgramInputs<'_> {
    fn value(&self, property: StyleProperty) -> String {
        match self.values.get(&property) {
            Some(expr) => expr.to_wgsl(),
            None => crate::lower::literal(property.name(), &property.default_value())
                .map(|e| e.to_wgsl())
                .unwrap_or_else(|_| "0.0".to_string()),
        }
    }
}

struct Varying {
    name: &'static str,
    ty: &'static str,
    flat: bool,
}

const fn flat(name: &'static str, ty: &'static str) -> Varying {
    Varying {
        name,
        ty,
        flat: true,
    }
}

fn varyings(kind: ProgramKind) -> Vec<Varying> {
    let mut out = vec![flat("v_filter", "f32")];
    match kind {
        ProgramKind::Fill | ProgramKind::Stroke => out.push(flat("v_color", "vec4<f32>")),
        ProgramKind::Symbol => out.extend([
            Varying {
                name: "v_extrude",
                ty: "vec2<f32>",
                flat: false,
            },
            flat("v_radius", "f32"),
            flat("v_stroke_width", "f32"),
            flat("v_fill", "vec4<f32>"),
            flat("v_stroke", "vec4<f32>"),
            flat("v_opacity", "f32"),
        ]),
    }
    out
}

fn write_varyings(out: &mut String, struct_name: &str, kind: ProgramKind, with_position: bool) {
    let _ = writeln!(out, "struct {struct_name} {{");
    if with_position {
        out.push_str("    @builtin(position) clip_position: vec4<f32>,\n");
    }
    for (location, varying) in varyings(kind).iter().enumerate() {
        let interpolate = if varying.flat { " @interpolate(flat)" } else { "" };
        let _ = writeln!(
            out,
            "    @location({location}){interpolate} {}: {},",
            varying.name, varying.ty
        );
    }
    out.push_str("}\n\n");
}

/// Assemble the program for `kind`
pub fn assemble(kind: ProgramKind, inputs: &ProgramInputs<'_>) -> ShaderProgram {
    ShaderProgram {
        kind,
        vertex_source: vertex_source(kind, inputs),
        fragment_source: fragment_source(kind, inputs.header),
    }
}

fn vertex_source(kind: ProgramKind, inputs: &ProgramInputs<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {} vertex program, {}\n", kind, inputs.header);

    out.push_str(&inputs.uniforms.wgsl());
    out.push('\n');

    out.push_str("struct VertexInput {\n");
    out.push_str("    @location(0) position: vec2<f32>,\n");
    out.push_str("    @location(1) extrude: vec2<f32>,\n");
    for (i, attribute) in inputs.plan.attributes().iter().enumerate() {
        let _ = writeln!(
            out,
            "    @location({}) {}: {},",
            i + 2,
            attribute.name,
            attribute.wgsl_input_type()
        );
    }
    out.push_str("}\n\n");

    write_varyings(&mut out, "VertexOutput", kind, true);

    if inputs.plan.needs_color_unpack() {
        out.push_str(UNPACK_COLOR);
        out.push('\n');
    }

    out.push_str("@vertex\nfn vs_main(vertex_in: VertexInput) -> VertexOutput {\n");
    // Unpacking precedes every use
    for attribute in inputs.plan.attributes() {
        let _ = writeln!(
            out,
            "    let {} = {};",
            attribute.local,
            attribute.unpack_wgsl()
        );
    }
    out.push_str("    var vs_out: VertexOutput;\n");

    let filter = ShaderExpr::select(
        ShaderExpr::Float(0.0),
        ShaderExpr::Float(1.0),
        inputs
            .values
            .get(&StyleProperty::Filter)
            .cloned()
            .unwrap_or(ShaderExpr::Bool(true)),
    );
    let _ = writeln!(out, "    vs_out.v_filter = {};", filter.to_wgsl());

    match kind {
        ProgramKind::Fill => {
            out.push_str("    let world_position = vertex_in.position;\n");
            let _ = writeln!(
                out,
                "    vs_out.v_color = {};",
                inputs.value(StyleProperty::FillColor)
            );
        }
        ProgramKind::Stroke => {
            let _ = writeln!(
                out,
                "    let line_width = {};",
                inputs.value(StyleProperty::StrokeWidth)
            );
            out.push_str(
                "    let world_position = vertex_in.position + vertex_in.extrude * (line_width * 0.5 * uniforms.u_resolution.x);\n",
            );
            let _ = writeln!(
                out,
                "    vs_out.v_color = {};",
                inputs.value(StyleProperty::StrokeColor)
            );
        }
        ProgramKind::Symbol => {
            let _ = writeln!(
                out,
                "    let circle_radius = {};",
                inputs.value(StyleProperty::CircleRadius)
            );
            let _ = writeln!(
                out,
                "    let circle_stroke_width = {};",
                inputs.value(StyleProperty::CircleStrokeWidth)
            );
            out.push_str("    let outer_radius = circle_radius + circle_stroke_width * 0.5;\n");
            out.push_str(
                "    let world_position = vertex_in.position + vertex_in.extrude * (outer_radius * uniforms.u_resolution.x);\n",
            );
            out.push_str("    vs_out.v_extrude = vertex_in.extrude * outer_radius;\n");
            out.push_str("    vs_out.v_radius = circle_radius;\n");
            out.push_str("    vs_out.v_stroke_width = circle_stroke_width;\n");
            let _ = writeln!(
                out,
                "    vs_out.v_fill = {};",
                inputs.value(StyleProperty::CircleFillColor)
            );
            let _ = writeln!(
                out,
                "    vs_out.v_stroke = {};",
                inputs.value(StyleProperty::CircleStrokeColor)
            );
            let _ = writeln!(
                out,
                "    vs_out.v_opacity = {};",
                inputs.value(StyleProperty::CircleOpacity)
            );
        }
    }

    out.push_str(
        "    vs_out.clip_position = uniforms.projection * vec4<f32>(world_position, 0.0, 1.0);\n",
    );
    out.push_str("    return vs_out;\n}\n");
    out
}

fn fragment_source(kind: ProgramKind, header: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// {} fragment program, {}\n", kind, header);
    write_varyings(&mut out, "FragmentInput", kind, false);

    out.push_str("@fragment\nfn fs_main(frag_in: FragmentInput) -> @location(0) vec4<f32> {\n");
    out.push_str("    if (frag_in.v_filter < 0.5) {\n        discard;\n    }\n");
    match kind {
        ProgramKind::Fill | ProgramKind::Stroke => {
            out.push_str("    return frag_in.v_color;\n");
        }
        ProgramKind::Symbol => {
            out.push_str(concat!(
                "    let distance_px = length(frag_in.v_extrude);\n",
                "    let half_stroke = frag_in.v_stroke_width * 0.5;\n",
                "    if (distance_px > frag_in.v_radius + half_stroke) {\n",
                "        discard;\n",
                "    }\n",
                "    var color = frag_in.v_fill;\n",
                "    if (frag_in.v_stroke_width > 0.0 && distance_px > frag_in.v_radius - half_stroke) {\n",
                "        color = frag_in.v_stroke;\n",
                "    }\n",
                "    return vec4<f32>(color.rgb, color.a * frag_in.v_opacity);\n",
            ));
        }
    }
    out.push_str("}\n");
    out
}
