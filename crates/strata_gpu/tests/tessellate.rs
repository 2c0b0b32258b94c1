use serde_json::json;
use strata_core::{FeatureSchema, PropertyDecl, ValueType};
use strata_gpu::{
    DecodedTile, Feature, Geometry, Tessellator, TessellationWarning, TileBuffers, TileBuilder,
    TileId,
};
use strata_style::{compile, CompiledStyle, ProgramKind, ShaderValue, StyleSpec, BASE_FLOATS};

fn build(style: &CompiledStyle, features: Vec<Feature>) -> TileBuffers {
    let tile = DecodedTile::new(TileId::new(12, 2048, 1361), features);
    Tessellator::default().build(&tile, style)
}

fn square(x: f64, y: f64, size: f64) -> Geometry {
    Geometry::Polygon(vec![vec![
        [x, y],
        [x + size, y],
        [x + size, y + size],
        [x, y + size],
    ]])
}

fn segment(y: f64) -> Geometry {
    Geometry::Line(vec![vec![[0.0, y], [10.0, y]]])
}

#[test]
fn building_is_pure() {
    let style = compile(
        &StyleSpec::new()
            .with_property("fill-color", json!(["get", "color"]))
            .with_property("stroke-width", json!(["*", ["get", "lanes"], 2])),
    )
    .unwrap();
    let features = || {
        vec![
            Feature::new(square(0.0, 0.0, 10.0)).with_property("color", "#336699"),
            Feature::new(segment(5.0)).with_property("lanes", 3.0),
        ]
    };

    let first = build(&style, features());
    let second = build(&style, features());
    assert_eq!(first.vertex_bytes(), second.vertex_bytes());
    assert_eq!(first.index_bytes(), second.index_bytes());
    assert_eq!(first, second);
}

#[test]
fn feature_color_decodes_from_the_vertex() {
    let style = compile(&StyleSpec::new().with_property("fill-color", json!(["get", "fillColor"])))
        .unwrap();
    let buffers = build(
        &style,
        vec![Feature::new(square(0.0, 0.0, 4.0)).with_property("fillColor", "#ff0000")],
    );

    let attribute = style.plan().evaluated(strata_style::StyleProperty::FillColor).unwrap();
    assert_eq!(buffers.layout.stride_bytes, 24);
    assert!(buffers.vertex_count() >= 4);

    let start = BASE_FLOATS + attribute.offset;
    let ShaderValue::Vec4(rgba) = attribute.decode(&buffers.vertices[start..start + 2]) else {
        panic!("fill color should decode to a vec4");
    };
    for (actual, expected) in rgba.iter().zip([1.0, 0.0, 0.0, 1.0]) {
        assert!((actual - expected).abs() <= 1.0 / 255.0, "{rgba:?}");
    }
}

#[test]
fn degenerate_features_are_skipped_with_warnings() {
    let style = compile(&StyleSpec::new().with_property("stroke-width", json!(2))).unwrap();
    let buffers = build(
        &style,
        vec![
            Feature::new(Geometry::Line(vec![vec![[3.0, 3.0]]])),
            Feature::new(Geometry::Polygon(vec![vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]])),
            Feature::new(segment(0.0)),
        ],
    );

    assert_eq!(buffers.feature_count, 1);
    assert_eq!(buffers.indices, vec![0, 1, 2, 1, 3, 2]);
    assert_eq!(buffers.warnings.len(), 2);
    assert!(matches!(
        buffers.warnings[0],
        TessellationWarning::DegenerateGeometry { feature: 0, kind: "line" }
    ));
    assert!(matches!(
        buffers.warnings[1],
        TessellationWarning::DegenerateGeometry { feature: 1, kind: "polygon" }
    ));
}

#[test]
fn draw_order_ignores_input_order() {
    let style = compile(&StyleSpec::new().with_property("stroke-width", json!(["get", "w"]))).unwrap();
    let features = vec![
        Feature::new(segment(0.0)).with_id(3).with_property("w", 1.0),
        Feature::new(segment(4.0)).with_id(1).with_property("w", 2.0),
        Feature::new(segment(8.0)).with_id(2).with_property("w", 3.0),
    ];
    let mut reversed = features.clone();
    reversed.reverse();

    let a = build(&style, features);
    let b = build(&style, reversed);
    assert_eq!(a.vertex_bytes(), b.vertex_bytes());
    assert_eq!(a.index_bytes(), b.index_bytes());
    // Lowest id first: y = 4, width 2
    assert_eq!(&a.vertices[..5], &[0.0, 4.0, 0.0, 1.0, 2.0]);
}

#[test]
fn z_index_sorts_before_ids() {
    let style = compile(
        &StyleSpec::new()
            .with_property("stroke-color", json!("#000000"))
            .with_property("z-index", json!(["get", "rank"])),
    )
    .unwrap();
    let buffers = build(
        &style,
        vec![
            Feature::new(segment(0.0)).with_id(1).with_property("rank", 2.0),
            Feature::new(segment(10.0)).with_id(2).with_property("rank", 1.0),
        ],
    );
    assert_eq!(style.plan().stride(), 0);
    assert_eq!(buffers.vertices[1], 10.0);
}

#[test]
fn feature_filter_culls_before_tessellation() {
    let style = compile(
        &StyleSpec::new()
            .with_property("filter", json!(["==", ["get", "kind"], "road"]))
            .with_property("fill-color", json!("#00ff00")),
    )
    .unwrap();
    let buffers = build(
        &style,
        vec![
            Feature::new(square(0.0, 0.0, 4.0)).with_property("kind", "river"),
            Feature::new(square(8.0, 0.0, 4.0)).with_property("kind", "road"),
        ],
    );
    assert_eq!(buffers.feature_count, 1);
    assert!(buffers.warnings.is_empty());
    assert!(buffers.vertices.chunks(4).all(|v| v[0] >= 8.0));
}

#[test]
fn mistyped_properties_fall_back_to_zero() {
    let style = compile(&StyleSpec::new().with_property("stroke-width", json!(["get", "w"]))).unwrap();
    let buffers = build(
        &style,
        vec![Feature::new(segment(0.0)).with_property("w", "wide")],
    );

    assert_eq!(buffers.feature_count, 1);
    assert_eq!(buffers.vertices[4], 0.0);
    assert!(matches!(
        &buffers.warnings[..],
        [TessellationWarning::PropertyType { feature: 0, name, expected: ValueType::Number, found: ValueType::String }]
            if name == "w"
    ));
}

#[test]
fn out_of_range_values_are_clamped_with_a_warning() {
    let schema = FeatureSchema::new().with(
        "population",
        PropertyDecl::new(ValueType::Number).with_range(0.0, 100.0),
    );
    let style = compile(
        &StyleSpec::new()
            .with_schema(schema)
            .with_property("circle-radius", json!(["/", ["get", "population"], 10])),
    )
    .unwrap();
    let buffers = build(
        &style,
        vec![Feature::new(Geometry::Point(vec![[1.0, 1.0]])).with_property("population", 140.0)],
    );

    assert_eq!(buffers.vertices[4], 1.0);
    assert!(matches!(
        &buffers.warnings[..],
        [TessellationWarning::OutOfRange { value, max, .. }] if *value == 140.0 && *max == 100.0
    ));
}

#[test]
fn geometry_is_grouped_by_program() {
    let style = compile(
        &StyleSpec::new()
            .with_property("fill-color", json!("#ffffff"))
            .with_property("stroke-width", json!(1))
            .with_property("circle-radius", json!(3))
            .with_property("text-field", json!(["get", "name"])),
    )
    .unwrap();
    let buffers = build(
        &style,
        vec![
            Feature::new(Geometry::Point(vec![[5.0, 5.0], [6.0, 6.0]]))
                .with_id(9)
                .with_property("name", "Harbor"),
            Feature::new(square(0.0, 0.0, 4.0)).with_id(1),
        ],
    );

    let kinds: Vec<_> = buffers.draw_ranges.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![ProgramKind::Fill, ProgramKind::Stroke, ProgramKind::Symbol]);
    let stroke = buffers.draw_range(ProgramKind::Stroke).unwrap();
    assert_eq!(stroke.index_count, 4 * 6);
    let symbol = buffers.draw_range(ProgramKind::Symbol).unwrap();
    assert_eq!(symbol.index_count, 2 * 6);
    assert_eq!(symbol.indices().end as usize, buffers.indices.len());
    assert_eq!(
        buffers.draw_range(ProgramKind::Fill).unwrap().indices().end,
        stroke.first_index
    );

    assert_eq!(buffers.symbols.len(), 2);
    assert_eq!(buffers.symbols[0].text.as_deref(), Some("Harbor"));
    assert_eq!(buffers.symbols[1].position, [6.0, 6.0]);
    assert_eq!(buffers.symbols[0].icon, None);
}

#[test]
fn numeric_properties_label_symbols() {
    let style = compile(
        &StyleSpec::new()
            .with_property("circle-radius", json!(["/", ["get", "pop"], 4]))
            .with_property("text-field", json!(["get", "pop"])),
    )
    .unwrap();
    let buffers = build(
        &style,
        vec![Feature::new(Geometry::Point(vec![[2.0, 2.0]])).with_property("pop", 12.0)],
    );

    assert!(buffers.warnings.is_empty());
    // The radius attribute carries the raw count; the shader divides
    assert_eq!(buffers.vertices[4], 12.0);
    assert_eq!(buffers.symbols[0].text.as_deref(), Some("12"));
}
