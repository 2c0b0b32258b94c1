use std::collections::BTreeMap;

use serde_json::{json, Value as Json};
use strata_core::{
    evaluate, Color, CompileError, EvalContext, EvalError, Expr, ExternalRegistry, FeatureProperties,
    ParseEnv, Parser, Value, ValueType,
};

struct Env {
    variables: BTreeMap<String, Value>,
    externals: ExternalRegistry,
}

impl Env {
    fn new() -> Self {
        Self {
            variables: BTreeMap::new(),
            externals: ExternalRegistry::new(),
        }
    }

    fn parse(&self, json: Json, ty: ValueType) -> Result<Expr, CompileError> {
        let env = ParseEnv {
            schema: None,
            variables: &self.variables,
            externals: &self.externals,
        };
        Parser::new(env).parse_property("test-property", &json, ty)
    }

    fn eval(&self, expr: &Expr, feature: &BTreeMap<String, Value>, zoom: f64) -> Result<Value, EvalError> {
        let ctx = EvalContext::new(feature, &self.variables, &self.externals).with_zoom(zoom);
        evaluate(expr, &ctx)
    }
}

fn feature(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn case_picks_the_fallback_branch() {
    let env = Env::new();
    let expr = env
        .parse(json!(["case", [">", ["get", "x"], 10], "a", "b"]), ValueType::String)
        .unwrap();
    let value = env.eval(&expr, &feature(&[("x", Value::Number(5.0))]), 0.0).unwrap();
    assert_eq!(value, Value::from("b"));
}

#[test]
fn unknown_operators_fail_compilation() {
    let env = Env::new();
    let err = env.parse(json!(["frobnicate", 1]), ValueType::Number).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownOperator {
            property: "test-property".to_string(),
            operator: "frobnicate".to_string(),
        }
    );
    assert_eq!(err.property(), Some("test-property"));
}

#[test]
fn match_selects_by_label() {
    let env = Env::new();
    let expr = env
        .parse(
            json!(["match", ["get", "class"], "major", 3, "trunk", 4, 1]),
            ValueType::Number,
        )
        .unwrap();
    let width = |class: &str| {
        env.eval(&expr, &feature(&[("class", Value::from(class))]), 0.0)
            .unwrap()
    };
    assert_eq!(width("trunk"), Value::Number(4.0));
    assert_eq!(width("minor"), Value::Number(1.0));
}

#[test]
fn zoom_interpolation_blends_colors() {
    let env = Env::new();
    let expr = env
        .parse(
            json!(["interpolate", ["linear"], ["zoom"], 10, "#000000", 20, "#ffffff"]),
            ValueType::Color,
        )
        .unwrap();
    assert!(expr.is_frame_dependent());
    assert!(!expr.is_feature_dependent());

    let mid = env.eval(&expr, &BTreeMap::new(), 15.0).unwrap();
    let Value::Color(color) = mid else {
        panic!("expected a color, got {mid:?}");
    };
    for channel in &color.to_array()[..3] {
        assert!((channel - 0.5).abs() < 1e-6);
    }
    assert_eq!(
        env.eval(&expr, &BTreeMap::new(), 30.0).unwrap(),
        Value::Color(Color::from_rgba8(255, 255, 255, 255))
    );
}

#[test]
fn externals_run_on_the_cpu() {
    let mut env = Env::new();
    env.externals.register("double-lanes", ValueType::Number, |props: &dyn FeatureProperties| {
        let lanes = props.get_property("lanes").and_then(Value::as_number).unwrap_or(0.0);
        Value::Number(lanes * 2.0)
    });

    let expr = env
        .parse(json!(["+", ["external", "double-lanes"], 1]), ValueType::Number)
        .unwrap();
    let value = env.eval(&expr, &feature(&[("lanes", Value::Number(3.0))]), 0.0).unwrap();
    assert_eq!(value, Value::Number(7.0));

    let err = env.parse(json!(["external", "missing"]), ValueType::Number).unwrap_err();
    assert!(matches!(err, CompileError::UnknownExternal { ref name, .. } if name == "missing"));
}

#[test]
fn mistyped_feature_values_are_evaluation_errors() {
    let env = Env::new();
    let expr = env.parse(json!(["*", ["get", "lanes"], 2]), ValueType::Number).unwrap();
    let err = env
        .eval(&expr, &feature(&[("lanes", Value::from("four"))]), 0.0)
        .unwrap_err();
    assert_eq!(
        err,
        EvalError::PropertyType {
            name: "lanes".to_string(),
            expected: ValueType::Number,
            found: ValueType::String,
        }
    );
}
