//! Style expression parser and type checker
//!
//! Property values arrive as JSON-like trees: scalars are literals, arrays
//! whose first element is a string are operator calls. Types are inferred
//! bottom-up and checked against a fixed signature table. An expected type
//! flows down only as a hint for literals and untyped property lookups.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::Value as Json;

use crate::color::Color;
use crate::error::{CompileError, Result};
use crate::expr::{Expr, FrameInput, Interpolation, Op};
use crate::schema::{ExternalRegistry, FeatureSchema};
use crate::value::{Value, ValueType};

/// Declarations visible to expressions while parsing
#[derive(Clone, Copy)]
pub struct ParseEnv<'a> {
    pub schema: Option<&'a FeatureSchema>,
    pub variables: &'a BTreeMap<String, Value>,
    pub externals: &'a ExternalRegistry,
}

/// Argument and result types of a plain operator
struct Signature {
    arg: ValueType,
    min: usize,
    max: Option<usize>,
    ret: ValueType,
}

fn signature(op: Op) -> Signature {
    use ValueType::{Boolean, Color, Number};
    let (arg, min, max, ret) = match op {
        Op::Add | Op::Mul => (Number, 2, None, Number),
        Op::Sub | Op::Div | Op::Mod | Op::Pow => (Number, 2, Some(2), Number),
        Op::Abs | Op::Floor | Op::Ceil | Op::Round | Op::Sqrt | Op::Sin | Op::Cos => {
            (Number, 1, Some(1), Number)
        }
        Op::Atan => (Number, 1, Some(2), Number),
        Op::Clamp => (Number, 3, Some(3), Number),
        Op::Gt | Op::Ge | Op::Lt | Op::Le => (Number, 2, Some(2), Boolean),
        Op::Not => (Boolean, 1, Some(1), Boolean),
        Op::All | Op::Any => (Boolean, 2, None, Boolean),
        Op::MakeColor => (Number, 3, Some(4), Color),
        // Equality unifies its operands instead of fixing them
        Op::Eq | Op::Ne => (Number, 2, Some(2), Boolean),
    };
    Signature { arg, min, max, ret }
}

/// Type a raw scalar would take without any hint
fn literal_hint(json: &Json) -> Option<ValueType> {
    match json {
        Json::Bool(_) => Some(ValueType::Boolean),
        Json::Number(_) => Some(ValueType::Number),
        Json::String(_) => Some(ValueType::String),
        _ => None,
    }
}

pub struct Parser<'a> {
    env: ParseEnv<'a>,
    property: String,
}

impl<'a> Parser<'a> {
    pub fn new(env: ParseEnv<'a>) -> Self {
        Self {
            env,
            property: String::new(),
        }
    }

    /// Parse the value of one style property and check its result type
    pub fn parse_property(
        &mut self,
        property: &str,
        json: &Json,
        expected: ValueType,
    ) -> Result<Expr> {
        self.property = property.to_string();
        let expr = self.parse(json, Some(expected))?;
        self.expect(&expr, expected, "value")?;
        Ok(expr)
    }

    fn parse(&mut self, json: &Json, expected: Option<ValueType>) -> Result<Expr> {
        match json {
            Json::Bool(b) => Ok(Expr::Literal(Value::Boolean(*b))),
            Json::Number(n) => n
                .as_f64()
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.invalid_literal(format!("{n} is not a finite number"))),
            Json::String(s) => self.parse_string(s, expected),
            Json::Array(items) => match items.first() {
                None => Err(self.invalid_literal("empty array")),
                Some(Json::String(name)) => self.parse_call(name, &items[1..], expected),
                Some(_) => self.parse_number_array(items, expected),
            },
            Json::Null => Err(self.invalid_literal("null is not a value")),
            Json::Object(_) => Err(self.invalid_literal("objects are not values")),
        }
    }

    fn parse_string(&self, s: &str, expected: Option<ValueType>) -> Result<Expr> {
        if expected == Some(ValueType::Color) {
            return Color::parse(s)
                .map(|c| Expr::Literal(Value::Color(c)))
                .ok_or_else(|| self.invalid_literal(format!("`{s}` is not a color")));
        }
        Ok(Expr::Literal(Value::String(s.to_string())))
    }

    fn parse_number_array(&self, items: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        let numbers = items
            .iter()
            .map(Json::as_f64)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.invalid_literal("arrays must hold only numbers"))?;

        if expected == Some(ValueType::Color) {
            return Color::from_components(&numbers)
                .map(|c| Expr::Literal(Value::Color(c)))
                .ok_or_else(|| self.invalid_literal("colors need 3 or 4 channels"));
        }
        Ok(Expr::Literal(Value::NumberArray(numbers)))
    }

    fn parse_call(&mut self, name: &str, args: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        match name {
            "get" => self.parse_get(args, expected),
            "var" => self.parse_var(args),
            "zoom" | "resolution" | "time" => {
                self.check_arity(name, args, 0, Some(0))?;
                let input = match name {
                    "zoom" => FrameInput::Zoom,
                    "resolution" => FrameInput::Resolution,
                    _ => FrameInput::Time,
                };
                Ok(Expr::Input {
                    input,
                    ty: ValueType::Number,
                })
            }
            "external" => self.parse_external(args),
            "literal" => {
                self.check_arity(name, args, 1, Some(1))?;
                match &args[0] {
                    Json::Array(items) => self.parse_number_array(items, expected),
                    Json::String(s) => self.parse_string(s, expected),
                    other => self.parse(other, expected),
                }
            }
            "case" => self.parse_case(args, expected),
            "match" => self.parse_match(args, expected),
            "interpolate" => self.parse_interpolate(args, expected),
            "between" => self.parse_between(args),
            "in" => self.parse_in(args),
            "color" | "rgb" | "rgba" => self.parse_color(name, args),
            "==" | "!=" => self.parse_equality(name, args),
            other => match Op::from_name(other) {
                Some(op) => self.parse_op(op, args),
                None => Err(CompileError::UnknownOperator {
                    property: self.property.clone(),
                    operator: other.to_string(),
                }),
            },
        }
    }

    fn parse_get(&mut self, args: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        self.check_arity("get", args, 1, Some(1))?;
        let name = self.name_argument("get", &args[0])?;

        let ty = match self.env.schema {
            Some(schema) => {
                let declared = schema.get(&name).map(|decl| decl.ty).ok_or_else(|| {
                    CompileError::UnresolvedProperty {
                        property: self.property.clone(),
                        name: name.clone(),
                    }
                })?;
                // String properties may hold color text; coerce where a color is wanted
                if declared == ValueType::String && expected == Some(ValueType::Color) {
                    ValueType::Color
                } else {
                    declared
                }
            }
            // Each use takes its type from context; values are coerced on read
            None => expected.unwrap_or(ValueType::Number),
        };

        Ok(Expr::PropertyRef { name, ty })
    }

    fn parse_var(&mut self, args: &[Json]) -> Result<Expr> {
        self.check_arity("var", args, 1, Some(1))?;
        let name = self.name_argument("var", &args[0])?;
        let ty = self
            .env
            .variables
            .get(&name)
            .map(Value::value_type)
            .ok_or_else(|| CompileError::UnresolvedVariable {
                property: self.property.clone(),
                name: name.clone(),
            })?;
        Ok(Expr::Input {
            input: FrameInput::Variable(name),
            ty,
        })
    }

    fn parse_external(&mut self, args: &[Json]) -> Result<Expr> {
        self.check_arity("external", args, 1, Some(1))?;
        let name = self.name_argument("external", &args[0])?;
        let (id, ty) =
            self.env
                .externals
                .lookup(&name)
                .ok_or_else(|| CompileError::UnknownExternal {
                    property: self.property.clone(),
                    name,
                })?;
        Ok(Expr::External { id, ty })
    }

    fn parse_op(&mut self, op: Op, args: &[Json]) -> Result<Expr> {
        let sig = signature(op);
        self.check_arity(op.name(), args, sig.min, sig.max)?;
        let args = args
            .iter()
            .map(|arg| {
                let expr = self.parse(arg, Some(sig.arg))?;
                self.expect(&expr, sig.arg, op.name())?;
                Ok(expr)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Operator {
            op,
            args,
            ty: sig.ret,
        })
    }

    fn parse_equality(&mut self, name: &str, args: &[Json]) -> Result<Expr> {
        self.check_arity(name, args, 2, Some(2))?;
        let hint = literal_hint(&args[0]).or_else(|| literal_hint(&args[1]));
        let lhs = self.parse(&args[0], hint)?;
        let rhs = self.parse(&args[1], Some(lhs.ty()))?;
        if lhs.ty() == ValueType::NumberArray {
            return Err(self.mismatch(name, "number, boolean, color or string", lhs.ty()));
        }
        self.expect(&rhs, lhs.ty(), name)?;
        Ok(Self::equality(name == "==", lhs, rhs))
    }

    fn equality(equal: bool, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Operator {
            op: if equal { Op::Eq } else { Op::Ne },
            args: vec![lhs, rhs],
            ty: ValueType::Boolean,
        }
    }

    fn parse_case(&mut self, args: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Err(self.arity("case", "an odd number (at least 3) of", args.len()));
        }

        let mut ty = expected;
        let mut branches = Vec::with_capacity(args.len() / 2);
        for pair in args[..args.len() - 1].chunks(2) {
            let condition = self.parse(&pair[0], Some(ValueType::Boolean))?;
            self.expect(&condition, ValueType::Boolean, "case")?;
            let result = self.parse_unified("case", &pair[1], &mut ty)?;
            branches.push((condition, result));
        }
        let fallback = self.parse_unified("case", &args[args.len() - 1], &mut ty)?;

        Ok(Expr::Case {
            ty: fallback.ty(),
            branches,
            fallback: Box::new(fallback),
        })
    }

    /// `match` desugars to `case` over `==` comparisons against the input
    fn parse_match(&mut self, args: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        if args.len() < 4 || args.len() % 2 != 0 {
            return Err(self.arity("match", "an even number (at least 4) of", args.len()));
        }

        let labels: Vec<&Json> = args[1..args.len() - 1].iter().step_by(2).collect();
        let label_ty = literal_hint(labels[0])
            .ok_or_else(|| self.invalid_literal("match labels must be literals"))?;
        let input = self.parse(&args[0], Some(label_ty))?;
        self.expect(&input, label_ty, "match")?;

        let mut ty = expected;
        let mut branches = Vec::with_capacity(labels.len());
        for pair in args[1..args.len() - 1].chunks(2) {
            if literal_hint(&pair[0]) != Some(label_ty) {
                return Err(match literal_hint(&pair[0]) {
                    Some(other) => self.mismatch("match", label_ty, other),
                    None => self.invalid_literal("match labels must be literals"),
                });
            }
            let label = self.parse(&pair[0], Some(label_ty))?;
            let result = self.parse_unified("match", &pair[1], &mut ty)?;
            branches.push((Self::equality(true, input.clone(), label), result));
        }
        let fallback = self.parse_unified("match", &args[args.len() - 1], &mut ty)?;

        Ok(Expr::Case {
            ty: fallback.ty(),
            branches,
            fallback: Box::new(fallback),
        })
    }

    fn parse_interpolate(&mut self, args: &[Json], expected: Option<ValueType>) -> Result<Expr> {
        if args.len() < 4 || args.len() % 2 != 0 {
            return Err(self.arity(
                "interpolate",
                "a type, an input and stop/output pairs:",
                args.len(),
            ));
        }

        let kind = self.parse_interpolation_kind(&args[0])?;
        let input = self.parse(&args[1], Some(ValueType::Number))?;
        self.expect(&input, ValueType::Number, "interpolate")?;

        let mut ty = expected;
        let mut stops: Vec<(f64, Expr)> = Vec::with_capacity((args.len() - 2) / 2);
        for pair in args[2..].chunks(2) {
            let stop = pair[0].as_f64().ok_or_else(|| CompileError::InvalidStops {
                property: self.property.clone(),
            })?;
            if stops.last().is_some_and(|(prev, _)| stop <= *prev) {
                return Err(CompileError::InvalidStops {
                    property: self.property.clone(),
                });
            }
            let output = self.parse_unified("interpolate", &pair[1], &mut ty)?;
            stops.push((stop, output));
        }

        let ty = stops[0].1.ty();
        if !matches!(ty, ValueType::Number | ValueType::Color) {
            return Err(self.mismatch("interpolate", "number or color outputs", ty));
        }

        Ok(Expr::Interpolate {
            kind,
            input: Box::new(input),
            stops,
            ty,
        })
    }

    fn parse_interpolation_kind(&self, json: &Json) -> Result<Interpolation> {
        let items = json.as_array().map(Vec::as_slice).unwrap_or_default();
        match items {
            [Json::String(name)] if name == "linear" => Ok(Interpolation::Linear),
            [Json::String(name), base] if name == "exponential" => base
                .as_f64()
                .map(|base| Interpolation::Exponential { base })
                .ok_or_else(|| self.invalid_literal("exponential base must be a number")),
            _ => Err(self.invalid_literal(
                "interpolation type must be [\"linear\"] or [\"exponential\", base]",
            )),
        }
    }

    /// `between x lo hi` desugars to `all(x >= lo, x <= hi)`
    fn parse_between(&mut self, args: &[Json]) -> Result<Expr> {
        self.check_arity("between", args, 3, Some(3))?;
        let mut parsed = Vec::with_capacity(3);
        for arg in args {
            let expr = self.parse(arg, Some(ValueType::Number))?;
            self.expect(&expr, ValueType::Number, "between")?;
            parsed.push(expr);
        }
        let hi = parsed.pop().unwrap_or(Expr::Literal(Value::Number(0.0)));
        let lo = parsed.pop().unwrap_or(Expr::Literal(Value::Number(0.0)));
        let x = parsed.pop().unwrap_or(Expr::Literal(Value::Number(0.0)));

        let compare = |op, a: Expr, b: Expr| Expr::Operator {
            op,
            args: vec![a, b],
            ty: ValueType::Boolean,
        };
        Ok(Expr::Operator {
            op: Op::All,
            args: vec![compare(Op::Ge, x.clone(), lo), compare(Op::Le, x, hi)],
            ty: ValueType::Boolean,
        })
    }

    /// `in needle [literal, [..]]` desugars to `any` of `==` comparisons
    fn parse_in(&mut self, args: &[Json]) -> Result<Expr> {
        self.check_arity("in", args, 2, Some(2))?;
        let haystack = match &args[1] {
            Json::Array(items) => match items.as_slice() {
                [Json::String(tag), Json::Array(values)] if tag == "literal" => values.as_slice(),
                [Json::String(_), ..] => {
                    return Err(self.invalid_literal(
                        "`in` haystack must be a literal array; wrap it in [\"literal\", [...]]",
                    ))
                }
                values => values,
            },
            _ => return Err(self.invalid_literal("`in` haystack must be an array")),
        };

        let item_ty = match haystack.first().and_then(literal_hint) {
            Some(ty @ (ValueType::Number | ValueType::String)) => ty,
            None if haystack.is_empty() => ValueType::Number,
            _ => return Err(self.invalid_literal("`in` haystack must hold numbers or strings")),
        };
        if haystack.iter().any(|item| literal_hint(item) != Some(item_ty)) {
            return Err(self.invalid_literal("`in` haystack items must share one type"));
        }

        let needle = self.parse(&args[0], Some(item_ty))?;
        self.expect(&needle, item_ty, "in")?;

        let mut comparisons = haystack
            .iter()
            .map(|item| {
                let literal = self.parse(item, Some(item_ty))?;
                Ok(Self::equality(true, needle.clone(), literal))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(match comparisons.len() {
            0 => Expr::Literal(Value::Boolean(false)),
            1 => comparisons.remove(0),
            _ => Expr::Operator {
                op: Op::Any,
                args: comparisons,
                ty: ValueType::Boolean,
            },
        })
    }

    /// Color constructors fold to a literal when every channel is literal
    fn parse_color(&mut self, name: &str, args: &[Json]) -> Result<Expr> {
        match name {
            "rgb" => self.check_arity(name, args, 3, Some(3))?,
            "rgba" => self.check_arity(name, args, 4, Some(4))?,
            _ => self.check_arity(name, args, 3, Some(4))?,
        }

        let mut channels = Vec::with_capacity(4);
        for arg in args {
            let expr = self.parse(arg, Some(ValueType::Number))?;
            self.expect(&expr, ValueType::Number, name)?;
            channels.push(expr);
        }

        let literal: Option<Vec<f64>> = channels
            .iter()
            .map(|c| c.literal().and_then(Value::as_number))
            .collect();
        if let Some(values) = literal.and_then(|v| Color::from_components(&v)) {
            return Ok(Expr::Literal(Value::Color(values)));
        }

        if channels.len() == 3 {
            channels.push(Expr::Literal(Value::Number(1.0)));
        }
        Ok(Expr::Operator {
            op: Op::MakeColor,
            args: channels,
            ty: ValueType::Color,
        })
    }

    /// Parse a branch output and unify its type with earlier branches
    fn parse_unified(
        &mut self,
        operator: &str,
        json: &Json,
        ty: &mut Option<ValueType>,
    ) -> Result<Expr> {
        let expr = self.parse(json, *ty)?;
        match *ty {
            Some(expected) => self.expect(&expr, expected, operator)?,
            None => *ty = Some(expr.ty()),
        }
        Ok(expr)
    }

    fn name_argument(&self, operator: &str, json: &Json) -> Result<String> {
        json.as_str().map(str::to_string).ok_or_else(|| {
            self.invalid_literal(format!("`{operator}` takes a name string"))
        })
    }

    fn check_arity(&self, operator: &str, args: &[Json], min: usize, max: Option<usize>) -> Result<()> {
        let within = args.len() >= min && max.map_or(true, |max| args.len() <= max);
        if within {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        Err(self.arity(operator, &expected, args.len()))
    }

    fn expect(&self, expr: &Expr, expected: ValueType, operator: &str) -> Result<()> {
        if expr.ty() == expected {
            Ok(())
        } else {
            Err(self.mismatch(operator, expected, expr.ty()))
        }
    }

    fn arity(&self, operator: &str, expected: &str, got: usize) -> CompileError {
        CompileError::ArityMismatch {
            property: self.property.clone(),
            operator: operator.to_string(),
            expected: expected.to_string(),
            got,
        }
    }

    fn mismatch(&self, operator: &str, expected: impl Display, got: impl Display) -> CompileError {
        CompileError::TypeMismatch {
            property: self.property.clone(),
            operator: operator.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    fn invalid_literal(&self, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidLiteral {
            property: self.property.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_with(
        json: Json,
        expected: ValueType,
        schema: Option<&FeatureSchema>,
    ) -> Result<Expr> {
        let variables = BTreeMap::from([("scale".to_string(), Value::Number(2.0))]);
        let externals = ExternalRegistry::new();
        let env = ParseEnv {
            schema,
            variables: &variables,
            externals: &externals,
        };
        Parser::new(env).parse_property("test", &json, expected)
    }

    fn parse(json: Json, expected: ValueType) -> Result<Expr> {
        parse_with(json, expected, None)
    }

    #[test]
    fn literal_color_strings_are_normalized() {
        let expr = parse(json!("#777"), ValueType::Color).unwrap();
        assert_eq!(
            expr,
            Expr::Literal(Value::Color(Color::from_rgba8(0x77, 0x77, 0x77, 255)))
        );
    }

    #[test]
    fn color_constructor_folds_literals() {
        let folded = parse(json!(["rgba", 255, 0, 0, 1]), ValueType::Color).unwrap();
        assert_eq!(folded, Expr::Literal(Value::Color(Color::RED)));

        let runtime = parse(json!(["color", ["get", "r"], 0, 0]), ValueType::Color).unwrap();
        match runtime {
            Expr::Operator { op, args, .. } => {
                assert_eq!(op, Op::MakeColor);
                assert_eq!(args.len(), 4);
            }
            other => panic!("expected MakeColor, got {other:?}"),
        }
    }

    #[test]
    fn get_takes_type_from_context() {
        let expr = parse(json!(["get", "fillColor"]), ValueType::Color).unwrap();
        assert_eq!(expr.ty(), ValueType::Color);

        let cmp = parse(json!([">", ["get", "x"], 10]), ValueType::Boolean).unwrap();
        let deps = cmp.dependencies();
        assert_eq!(deps.properties, vec![("x".to_string(), ValueType::Number)]);
    }

    #[test]
    fn untyped_properties_are_typed_per_use() {
        let expr = parse(
            json!(["case", [">", ["get", "pop"], 1000], ["get", "pop"], "small"]),
            ValueType::String,
        )
        .unwrap();
        assert_eq!(
            expr.dependencies().properties,
            vec![
                ("pop".to_string(), ValueType::Number),
                ("pop".to_string(), ValueType::String),
            ]
        );
    }

    #[test]
    fn equality_infers_string_operands() {
        let expr = parse(json!(["==", ["get", "kind"], "road"]), ValueType::Boolean).unwrap();
        let deps = expr.dependencies();
        assert_eq!(deps.properties[0].1, ValueType::String);
    }

    #[test]
    fn unknown_operator_is_reported() {
        let err = parse(json!(["frobnicate", 1]), ValueType::Number).unwrap_err();
        assert!(matches!(err, CompileError::UnknownOperator { ref operator, .. } if operator == "frobnicate"));
    }

    #[test]
    fn arity_and_type_errors() {
        let err = parse(json!(["+", 1]), ValueType::Number).unwrap_err();
        assert!(matches!(err, CompileError::ArityMismatch { got: 1, .. }));

        let err = parse(json!(["+", 1, true]), ValueType::Number).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));

        let err = parse(json!(["case", true, 1, "x"]), ValueType::Number).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn case_branches_unify_without_hint() {
        let expr = parse(
            json!(["==", ["case", [">", ["get", "x"], 10], "a", "b"], "b"]),
            ValueType::Boolean,
        )
        .unwrap();
        assert_eq!(expr.ty(), ValueType::Boolean);
    }

    #[test]
    fn match_desugars_to_case() {
        let expr = parse(
            json!(["match", ["get", "kind"], "road", 2, "path", 1, 0]),
            ValueType::Number,
        )
        .unwrap();
        match expr {
            Expr::Case { branches, .. } => assert_eq!(branches.len(), 2),
            other => panic!("expected case, got {other:?}"),
        }
    }

    #[test]
    fn interpolate_requires_ascending_stops() {
        let ok = parse(
            json!(["interpolate", ["linear"], ["zoom"], 5, 1, 10, 4]),
            ValueType::Number,
        );
        assert!(ok.is_ok());

        let err = parse(
            json!(["interpolate", ["linear"], ["zoom"], 10, 1, 5, 4]),
            ValueType::Number,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidStops { .. }));
    }

    #[test]
    fn schema_is_authoritative() {
        let schema = FeatureSchema::new().with("height", crate::PropertyDecl::new(ValueType::Number));
        let err = parse_with(json!(["get", "width"]), ValueType::Number, Some(&schema)).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedProperty { ref name, .. } if name == "width"));
        assert!(parse_with(json!(["get", "height"]), ValueType::Number, Some(&schema)).is_ok());
    }

    #[test]
    fn variables_must_be_declared() {
        assert!(parse(json!(["*", ["var", "scale"], 2]), ValueType::Number).is_ok());
        let err = parse(json!(["var", "missing"]), ValueType::Number).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedVariable { .. }));
    }

    #[test]
    fn in_accepts_wrapped_and_bare_haystacks() {
        let wrapped = parse(
            json!(["in", ["get", "kind"], ["literal", ["a", "b"]]]),
            ValueType::Boolean,
        )
        .unwrap();
        assert!(matches!(wrapped, Expr::Operator { op: Op::Any, .. }));

        let bare = parse(json!(["in", ["get", "n"], [1, 2, 3]]), ValueType::Boolean).unwrap();
        assert!(matches!(bare, Expr::Operator { op: Op::Any, ref args, .. } if args.len() == 3));
    }
}
