use std::collections::BTreeMap;

use serde_json::json;
use strata_core::{evaluate, read_property, Color, FeatureSchema, PropertyDecl, Value, ValueType};
use strata_style::{
    compile, AttributeSource, CompiledStyle, FrameState, ProgramKind, ShaderScope, ShaderValue,
    StyleProperty, StyleSpec, Tier,
};

fn validate(source: &str) {
    let module = naga::front::wgsl::parse_str(source)
        .unwrap_or_else(|e| panic!("{}\n{}", e.emit_to_string(source), source));
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|e| panic!("{e:?}\n{source}"));
}

fn validate_all(style: &CompiledStyle) {
    for program in style.programs() {
        validate(&program.vertex_source);
        validate(&program.fragment_source);
    }
}

/// Shader-side scope for one feature: unpacked attributes plus the frame's
/// uniform block
fn scope_for(style: &CompiledStyle, feature: &BTreeMap<String, Value>, frame: &FrameState) -> ShaderScope {
    let mut scope = ShaderScope::default();
    let ctx = style.build_context(feature, frame.zoom);
    for attribute in style.plan().attributes() {
        let value = match &attribute.source {
            AttributeSource::Property { name } => read_property(feature, name, attribute.ty).unwrap(),
            AttributeSource::Evaluated { expr, .. } => evaluate(expr, &ctx).unwrap(),
        };
        let mut words = Vec::new();
        attribute.pack(&value, &mut words);
        scope
            .locals
            .insert(attribute.local.clone(), attribute.decode(&words));
    }
    let values = style.uniform_values(frame);
    for (slot, value) in style.uniforms().slots().iter().zip(values) {
        scope.uniforms.insert(slot.name.clone(), ShaderValue::Vec4(value));
    }
    scope
}

fn feature(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn constant_circle_style_needs_no_attributes() {
    let spec = StyleSpec::new()
        .with_property("circle-radius", json!(4))
        .with_property("circle-fill-color", json!("#777"));
    let style = compile(&spec).unwrap();

    assert_eq!(style.plan().stride(), 0);
    assert!(style.plan().is_empty());
    let program = style.program(ProgramKind::Symbol).unwrap();
    assert!(program.vertex_source.contains("u_circle_radius: vec4<f32>,"));
    assert!(program.vertex_source.contains("u_circle_fill_color: vec4<f32>,"));
    assert!(style.program(ProgramKind::Fill).is_none());

    let values = style.uniform_values(&FrameState::new(3.0));
    let slots = style.uniforms().slots();
    let fill = slots.iter().position(|s| s.name == "u_circle_fill_color").unwrap();
    let grey = Color::from_rgba8(0x77, 0x77, 0x77, 255).to_array();
    assert_eq!(values[fill], grey);

    validate_all(&style);
}

#[test]
fn feature_dependent_color_is_pre_evaluated() {
    let spec = StyleSpec::new()
        .with_property(
            "fill-color",
            json!(["case", [">", ["get", "population"], 1000], "#ff0000", "#0000ff"]),
        )
        .with_property("stroke-width", json!(["*", ["get", "lanes"], 2]));
    let style = compile(&spec).unwrap();

    assert_eq!(
        style.property(StyleProperty::FillColor).unwrap().tier,
        Tier::PreEvaluated
    );
    assert_eq!(
        style.property(StyleProperty::StrokeWidth).unwrap().tier,
        Tier::Inline
    );

    let names: Vec<_> = style.plan().attributes().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a_style_fill_color", "a_prop_lanes"]);
    assert_eq!(style.plan().stride(), 3);

    let fill = style.program(ProgramKind::Fill).unwrap();
    assert!(fill.vertex_source.contains("let style_fill_color = unpack_color(vertex_in.a_style_fill_color);"));
    assert!(fill.vertex_source.contains("vs_out.v_color = style_fill_color;"));
    let stroke = style.program(ProgramKind::Stroke).unwrap();
    assert!(stroke.vertex_source.contains("let line_width = (prop_lanes * 2.0);"));

    validate_all(&style);
}

#[test]
fn bounded_schema_properties_are_normalized() {
    let schema = FeatureSchema::new().with(
        "population",
        PropertyDecl::new(ValueType::Number).with_range(0.0, 100.0),
    );
    let spec = StyleSpec::new()
        .with_schema(schema)
        .with_property("circle-radius", json!(["/", ["get", "population"], 10]));
    let style = compile(&spec).unwrap();

    let program = style.program(ProgramKind::Symbol).unwrap();
    assert!(program
        .vertex_source
        .contains("let prop_population = mix(0.0, 100.0, vertex_in.a_prop_population);"));
    validate_all(&style);
}

#[test]
fn frame_dependent_filter_is_lowered_to_discard() {
    let spec = StyleSpec::new()
        .with_variable("min_zoom", json!(10))
        .with_property(
            "filter",
            json!(["all", ["==", ["get", "kind"], "road"], [">=", ["zoom"], ["var", "min_zoom"]]]),
        )
        .with_property("stroke-color", json!("#333333"));
    let style = compile(&spec).unwrap();

    assert_eq!(style.property(StyleProperty::Filter).unwrap().tier, Tier::Inline);
    let stroke = style.program(ProgramKind::Stroke).unwrap();
    assert!(stroke.vertex_source.contains("u_var_min_zoom: vec4<f32>,"));
    assert!(stroke.fragment_source.contains("discard;"));
    assert!(!stroke.fragment_source.contains("uniforms"));
    validate_all(&style);
}

#[test]
fn purely_feature_dependent_filter_culls_on_the_cpu() {
    let spec = StyleSpec::new()
        .with_property("filter", json!(["==", ["get", "kind"], "road"]))
        .with_property("fill-color", json!("#00ff00"));
    let style = compile(&spec).unwrap();
    assert_eq!(style.property(StyleProperty::Filter).unwrap().tier, Tier::Cull);

    let road = feature(&[("kind", Value::from("road"))]);
    let river = feature(&[("kind", Value::from("river"))]);
    assert!(style.passes_filter(&style.build_context(&road, 0.0)).unwrap());
    assert!(!style.passes_filter(&style.build_context(&river, 0.0)).unwrap());
    validate_all(&style);
}

fn assert_parity(property: StyleProperty, cpu: Value, gpu: ShaderValue, context: &str) {
    match (cpu, gpu) {
        (Value::Number(expected), ShaderValue::Float(actual)) => {
            let tolerance = 1e-4 * expected.abs().max(1.0);
            assert!(
                (expected - actual as f64).abs() <= tolerance,
                "{property} {context}: {expected} vs {actual}"
            );
        }
        (Value::Boolean(expected), ShaderValue::Bool(actual)) => {
            assert_eq!(expected, actual, "{property} {context}")
        }
        // Colors travel as 8-bit channels
        (Value::Color(expected), ShaderValue::Vec4(actual)) => {
            for (e, a) in expected.to_array().iter().zip(actual) {
                assert!((e - a).abs() <= 0.5 / 255.0 + 1e-6, "{property} {context}: {expected:?} vs {actual:?}");
            }
        }
        (cpu, gpu) => panic!("{property} {context}: type mismatch {cpu:?} vs {gpu:?}"),
    }
}

#[test]
fn shader_values_match_the_interpreter() {
    let schema = FeatureSchema::new()
        .with("lanes", PropertyDecl::new(ValueType::Number))
        .with("hidden", PropertyDecl::new(ValueType::Boolean))
        .with("kind", PropertyDecl::new(ValueType::String))
        .with("height", PropertyDecl::new(ValueType::Number).with_range(0.0, 50.0));
    let spec = StyleSpec::new()
        .with_schema(schema)
        .with_property(
            "stroke-width",
            json!(["+",
                ["*", ["get", "lanes"], 1.5],
                ["interpolate", ["linear"], ["zoom"], 5, 1, 15, 3],
                ["case", [">", ["get", "lanes"], 2], ["round", ["/", ["get", "lanes"], 3]], ["%", ["get", "lanes"], 2]],
                ["case", ["==", ["get", "kind"], "road"], 2, 0],
                ["case", ["!=", ["get", "kind"], "path"], 0.25, 0]
            ]),
        )
        .with_property(
            "circle-radius",
            json!(["case",
                ["!=", ["rgb", ["*", ["get", "lanes"], 51], 0, 0], "#ff0000"],
                ["*", ["get", "height"], 0.5],
                10
            ]),
        )
        .with_property(
            "fill-color",
            json!(["interpolate", ["linear"], ["get", "height"], 0, "#000000", 50, "#ff8040"]),
        )
        .with_property(
            "filter",
            json!(["case",
                [">", ["zoom"], 12], true,
                ["==", ["get", "kind"], "road"], ["!", ["get", "hidden"]],
                [">", ["get", "lanes"], 3], true,
                false
            ]),
        );
    let style = compile(&spec).unwrap();
    validate_all(&style);

    let tier = |p| style.property(p).unwrap().tier;
    assert_eq!(tier(StyleProperty::StrokeWidth), Tier::Inline);
    assert_eq!(tier(StyleProperty::CircleRadius), Tier::Inline);
    assert_eq!(tier(StyleProperty::FillColor), Tier::PreEvaluated);
    assert_eq!(tier(StyleProperty::Filter), Tier::PreEvaluated);

    for zoom in [0.0, 4.0, 7.5, 12.0, 18.0] {
        let frame = FrameState::new(zoom);
        for lanes in [0.0, 1.0, 2.0, 3.0, 4.5, 5.0, 7.0] {
            for hidden in [false, true] {
                for kind in ["road", "path", "river"] {
                    for height in [0.0, 12.5, 50.0] {
                        let props = feature(&[
                            ("lanes", Value::Number(lanes)),
                            ("hidden", Value::Boolean(hidden)),
                            ("kind", Value::from(kind)),
                            ("height", Value::Number(height)),
                        ]);
                        let scope = scope_for(&style, &props, &frame);
                        let ctx = style.build_context(&props, zoom);
                        let context = format!("at zoom {zoom}, lanes {lanes}, {kind}, height {height}");

                        for property in [
                            StyleProperty::StrokeWidth,
                            StyleProperty::CircleRadius,
                            StyleProperty::FillColor,
                            StyleProperty::Filter,
                        ] {
                            let compiled = style.property(property).unwrap();
                            let gpu = compiled.shader.as_ref().unwrap().eval(&scope);
                            let cpu = evaluate(&compiled.expr, &ctx).unwrap();
                            assert_parity(property, cpu, gpu, &context);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn untyped_properties_may_change_type_off_the_gpu() {
    let spec = StyleSpec::new()
        .with_property("circle-radius", json!(["get", "pop"]))
        .with_property("text-field", json!(["get", "pop"]));
    let style = compile(&spec).unwrap();
    assert_eq!(style.property(StyleProperty::TextField).unwrap().tier, Tier::CpuOnly);

    let props = feature(&[("pop", Value::Number(12.0))]);
    let label = style
        .evaluate(StyleProperty::TextField, &style.build_context(&props, 0.0))
        .unwrap();
    assert_eq!(label, Value::from("12"));
}

#[test]
fn packed_properties_need_one_type() {
    let spec = StyleSpec::new()
        .with_property("circle-radius", json!(["get", "k"]))
        .with_property("stroke-width", json!(["case", ["==", ["get", "k"], "a"], 1, 0]));
    let err = compile(&spec).unwrap_err();
    assert!(matches!(
        err,
        strata_core::CompileError::TypeMismatch { ref property, ref operator, ref expected, ref got }
            if property == "circle-radius" && operator == "get" && expected == "string" && got == "number"
    ));
}

#[test]
fn compilation_is_deterministic() {
    let build = || {
        StyleSpec::from_json(json!({
            "variables": { "accent": "#ff8800" },
            "filter": ["!=", ["get", "class"], "minor"],
            "fill-color": ["interpolate", ["linear"], ["get", "height"], 0, "#000000", 50, ["var", "accent"]],
            "stroke-width": ["match", ["get", "class"], "major", 3, "trunk", 4, 1],
            "circle-radius": ["get", "size"],
            "text-field": ["get", "name"]
        }))
        .unwrap()
    };
    let a = compile(&build()).unwrap();
    let b = compile(&build()).unwrap();

    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.plan(), b.plan());
    assert_eq!(a.programs(), b.programs());
    assert_eq!(a.property(StyleProperty::TextField).unwrap().tier, Tier::CpuOnly);
    validate_all(&a);
}

#[test]
fn type_errors_name_the_property() {
    let spec = StyleSpec::new().with_property("stroke-width", json!(["+", "wide", 2]));
    let err = compile(&spec).unwrap_err();
    assert_eq!(err.property(), Some("stroke-width"));
}
