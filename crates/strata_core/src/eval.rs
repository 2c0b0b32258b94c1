//! CPU interpreter over the expression IR
//!
//! Shares operator semantics with the generated shaders: rounding is
//! `floor(x + 0.5)`, `%` is the truncated remainder, colors blend per
//! channel and `atan` with two operands is `atan2(y, x)`.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::color::Color;
use crate::error::EvalError;
use crate::expr::{Expr, FrameInput, Interpolation, Op};
use crate::schema::ExternalRegistry;
use crate::value::{Value, ValueType};

/// Read access to one feature's property map
pub trait FeatureProperties {
    fn get_property(&self, name: &str) -> Option<&Value>;
}

impl<S: BuildHasher> FeatureProperties for HashMap<String, Value, S> {
    fn get_property(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl FeatureProperties for BTreeMap<String, Value> {
    fn get_property(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Property source for feature-independent evaluation
pub struct NoProperties;

impl FeatureProperties for NoProperties {
    fn get_property(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// Everything an expression can read during evaluation
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub properties: &'a dyn FeatureProperties,
    pub variables: &'a BTreeMap<String, Value>,
    pub externals: &'a ExternalRegistry,
    pub zoom: f64,
    pub resolution: f64,
    pub time: f64,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        properties: &'a dyn FeatureProperties,
        variables: &'a BTreeMap<String, Value>,
        externals: &'a ExternalRegistry,
    ) -> Self {
        Self {
            properties,
            variables,
            externals,
            zoom: 0.0,
            resolution: 1.0,
            time: 0.0,
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
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

    /// Same inputs, different feature
    pub fn for_feature(self, properties: &'a dyn FeatureProperties) -> Self {
        Self { properties, ..self }
    }
}

/// Look up a feature property as `ty`.
///
/// A missing property reads as the type's zero value; a present value of the
/// wrong type is an error so callers can record a diagnostic.
pub fn read_property(
    properties: &dyn FeatureProperties,
    name: &str,
    ty: ValueType,
) -> Result<Value, EvalError> {
    match properties.get_property(name) {
        None => Ok(Value::default_for(ty)),
        Some(value) => value.coerce(ty).ok_or_else(|| EvalError::PropertyType {
            name: name.to_string(),
            expected: ty,
            found: value.value_type(),
        }),
    }
}

/// Evaluate an expression for one feature
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::PropertyRef { name, ty } => read_property(ctx.properties, name, *ty),
        Expr::Input { input, ty } => Ok(match input {
            FrameInput::Zoom => Value::Number(ctx.zoom),
            FrameInput::Resolution => Value::Number(ctx.resolution),
            FrameInput::Time => Value::Number(ctx.time),
            FrameInput::Variable(name) => ctx
                .variables
                .get(name)
                .and_then(|v| v.coerce(*ty))
                .unwrap_or_else(|| Value::default_for(*ty)),
        }),
        Expr::Operator { op, args, .. } => evaluate_op(*op, args, ctx),
        Expr::Interpolate {
            kind, input, stops, ..
        } => {
            let x = number(input, ctx, "interpolate")?;
            evaluate_interpolate(*kind, x, stops, ctx)
        }
        Expr::Case {
            branches, fallback, ..
        } => {
            for (condition, result) in branches {
                if boolean(condition, ctx, "case")? {
                    return evaluate(result, ctx);
                }
            }
            evaluate(fallback, ctx)
        }
        Expr::External { id, ty } => {
            let value = ctx
                .externals
                .call(*id, ctx.properties)
                .ok_or(EvalError::MissingExternal(id.0))?;
            value.coerce(*ty).ok_or_else(|| EvalError::ExternalType {
                name: ctx.externals.name(*id).unwrap_or_default().to_string(),
                expected: *ty,
                found: value.value_type(),
            })
        }
    }
}

fn evaluate_op(op: Op, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let name = op.name();
    let arg = |i: usize| number(&args[i], ctx, name);

    let value = match op {
        Op::Add => Value::Number(sum(args, ctx, name, 0.0, |acc, n| acc + n)?),
        Op::Mul => Value::Number(sum(args, ctx, name, 1.0, |acc, n| acc * n)?),
        Op::Sub => Value::Number(arg(0)? - arg(1)?),
        Op::Div => Value::Number(arg(0)? / arg(1)?),
        Op::Mod => Value::Number(arg(0)? % arg(1)?),
        Op::Pow => Value::Number(arg(0)?.powf(arg(1)?)),
        Op::Abs => Value::Number(arg(0)?.abs()),
        Op::Floor => Value::Number(arg(0)?.floor()),
        Op::Ceil => Value::Number(arg(0)?.ceil()),
        Op::Round => Value::Number((arg(0)? + 0.5).floor()),
        Op::Sqrt => Value::Number(arg(0)?.sqrt()),
        Op::Sin => Value::Number(arg(0)?.sin()),
        Op::Cos => Value::Number(arg(0)?.cos()),
        Op::Atan => Value::Number(if args.len() == 2 {
            arg(0)?.atan2(arg(1)?)
        } else {
            arg(0)?.atan()
        }),
        Op::Clamp => Value::Number(arg(0)?.max(arg(1)?).min(arg(2)?)),
        Op::Gt => Value::Boolean(arg(0)? > arg(1)?),
        Op::Ge => Value::Boolean(arg(0)? >= arg(1)?),
        Op::Lt => Value::Boolean(arg(0)? < arg(1)?),
        Op::Le => Value::Boolean(arg(0)? <= arg(1)?),
        Op::Eq | Op::Ne => {
            let lhs = evaluate(&args[0], ctx)?;
            let rhs = evaluate(&args[1], ctx)?;
            Value::Boolean((lhs == rhs) == (op == Op::Eq))
        }
        Op::Not => Value::Boolean(!boolean(&args[0], ctx, name)?),
        Op::All => {
            for a in args {
                if !boolean(a, ctx, name)? {
                    return Ok(Value::Boolean(false));
                }
            }
            Value::Boolean(true)
        }
        Op::Any => {
            for a in args {
                if boolean(a, ctx, name)? {
                    return Ok(Value::Boolean(true));
                }
            }
            Value::Boolean(false)
        }
        Op::MakeColor => {
            let alpha = if args.len() == 4 { arg(3)? } else { 1.0 };
            Value::Color(Color::from_channels(arg(0)?, arg(1)?, arg(2)?, alpha))
        }
    };
    Ok(value)
}

fn evaluate_interpolate(
    kind: Interpolation,
    x: f64,
    stops: &[(f64, Expr)],
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    let (first_stop, first_output) = &stops[0];
    if stops.len() == 1 || x <= *first_stop {
        return evaluate(first_output, ctx);
    }

    // Last segment whose lower stop lies strictly below x
    let segment = stops
        .windows(2)
        .rposition(|w| x > w[0].0)
        .unwrap_or(0);
    let (lo, lo_output) = &stops[segment];
    let (hi, hi_output) = &stops[segment + 1];
    let t = kind.factor(x, *lo, *hi);

    match (evaluate(lo_output, ctx)?, evaluate(hi_output, ctx)?) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + (b - a) * t)),
        (Value::Color(a), Value::Color(b)) => Ok(Value::Color(a.mix(b, t as f32))),
        (other, _) => Err(EvalError::Operand {
            operator: "interpolate",
            found: other.value_type(),
        }),
    }
}

fn sum(
    args: &[Expr],
    ctx: &EvalContext<'_>,
    operator: &'static str,
    init: f64,
    fold: impl Fn(f64, f64) -> f64,
) -> Result<f64, EvalError> {
    args.iter()
        .try_fold(init, |acc, a| Ok(fold(acc, number(a, ctx, operator)?)))
}

fn number(expr: &Expr, ctx: &EvalContext<'_>, operator: &'static str) -> Result<f64, EvalError> {
    match evaluate(expr, ctx)? {
        Value::Number(n) => Ok(n),
        other => Err(EvalError::Operand {
            operator,
            found: other.value_type(),
        }),
    }
}

fn boolean(expr: &Expr, ctx: &EvalContext<'_>, operator: &'static str) -> Result<bool, EvalError> {
    match evaluate(expr, ctx)? {
        Value::Boolean(b) => Ok(b),
        other => Err(EvalError::Operand {
            operator,
            found: other.value_type(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ParseEnv, Parser};
    use serde_json::json;

    fn compile(json: serde_json::Value, ty: ValueType) -> Expr {
        let variables = BTreeMap::new();
        let externals = ExternalRegistry::new();
        let env = ParseEnv {
            schema: None,
            variables: &variables,
            externals: &externals,
        };
        Parser::new(env).parse_property("test", &json, ty).unwrap()
    }

    fn run(expr: &Expr, props: &BTreeMap<String, Value>) -> Result<Value, EvalError> {
        let variables = BTreeMap::new();
        let externals = ExternalRegistry::new();
        evaluate(expr, &EvalContext::new(props, &variables, &externals).with_zoom(8.0))
    }

    #[test]
    fn case_selects_fallback() {
        let expr = compile(
            json!(["case", [">", ["get", "x"], 10], "a", "b"]),
            ValueType::String,
        );
        let props = BTreeMap::from([("x".to_string(), Value::Number(5.0))]);
        assert_eq!(run(&expr, &props).unwrap(), Value::from("b"));
    }

    #[test]
    fn round_is_half_up() {
        let expr = compile(json!(["round", ["get", "x"]]), ValueType::Number);
        let props = BTreeMap::from([("x".to_string(), Value::Number(-2.5))]);
        assert_eq!(run(&expr, &props).unwrap(), Value::Number(-2.0));
    }

    #[test]
    fn interpolate_clamps_at_both_ends() {
        let expr = compile(
            json!(["interpolate", ["linear"], ["get", "x"], 0, 0, 10, 100, 20, 150]),
            ValueType::Number,
        );
        let at = |x: f64| {
            let props = BTreeMap::from([("x".to_string(), Value::Number(x))]);
            run(&expr, &props).unwrap().as_number().unwrap()
        };
        assert_eq!(at(-5.0), 0.0);
        assert_eq!(at(5.0), 50.0);
        assert_eq!(at(10.0), 100.0);
        assert_eq!(at(15.0), 125.0);
        assert_eq!(at(99.0), 150.0);
    }

    #[test]
    fn interpolates_colors_per_channel() {
        let expr = compile(
            json!(["interpolate", ["linear"], ["zoom"], 0, "#000000", 16, "#ffffff"]),
            ValueType::Color,
        );
        let color = run(&expr, &BTreeMap::new()).unwrap().as_color().unwrap();
        assert!((color.r - 0.5).abs() < 1e-6);
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn missing_property_reads_as_zero() {
        let expr = compile(json!(["+", ["get", "x"], 1]), ValueType::Number);
        assert_eq!(run(&expr, &BTreeMap::new()).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn mistyped_property_is_an_error() {
        let expr = compile(json!(["+", ["get", "x"], 1]), ValueType::Number);
        let props = BTreeMap::from([("x".to_string(), Value::from("five"))]);
        let err = run(&expr, &props).unwrap_err();
        assert!(matches!(err, EvalError::PropertyType { expected: ValueType::Number, .. }));
    }
}
