//! Expression IR to shader IR
//!
//! Each style property lands in one tier. Feature-independent values are
//! hoisted into uniforms; simple feature-dependent ones are computed inline
//! in the vertex stage from raw property attributes; the rest are evaluated
//! per feature on the CPU and shipped as finished values.

use std::collections::BTreeMap;

use strata_core::{
    evaluate, CompileError, EvalContext, Expr, ExternalRegistry, Interpolation, NoProperties, Op,
    Value, ValueType,
};

use crate::packer::PackingPlan;
use crate::property::StyleProperty;
use crate::shader::expr::{BinaryOp, Builtin, ShaderExpr, ShaderType};
use crate::uniforms::UniformLayout;

/// Where a property's value is computed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Once per draw on the CPU, read from the uniform block
    Uniform,
    /// In the vertex shader from packed feature properties
    Inline,
    /// Per feature on the CPU, packed into its own attribute
    PreEvaluated,
    /// Feature filter applied while tessellating; the shader sees `true`
    Cull,
    /// Only tessellation reads it
    CpuOnly,
}

/// Pick the tier for one property expression
pub fn choose_tier(property: StyleProperty, expr: &Expr) -> Tier {
    if property.is_cpu_only() {
        return Tier::CpuOnly;
    }
    if !expr.is_feature_dependent() {
        return Tier::Uniform;
    }
    if property == StyleProperty::Filter && !expr.is_frame_dependent() {
        return Tier::Cull;
    }

    let deps = expr.dependencies();
    let reads_arrays = deps
        .properties
        .iter()
        .any(|(_, ty)| *ty == ValueType::NumberArray);
    if expr.ty() == ValueType::Color
        || deps.external
        || deps.feature_interpolation
        || deps.max_case_branches > 2
        || reads_arrays
    {
        Tier::PreEvaluated
    } else {
        Tier::Inline
    }
}

/// Shader literal for a constant value
pub fn literal(property: &str, value: &Value) -> Result<ShaderExpr, CompileError> {
    Ok(match value {
        Value::Number(n) => ShaderExpr::Float(*n as f32),
        Value::Boolean(b) => ShaderExpr::Bool(*b),
        Value::Color(c) => ShaderExpr::Vec4(c.to_array()),
        Value::String(s) => ShaderExpr::Float(strata_core::string_id(s) as f32),
        Value::NumberArray(_) => {
            return Err(CompileError::InvalidLiteral {
                property: property.to_string(),
                reason: "number arrays have no shader representation".to_string(),
            })
        }
    })
}

/// Lowers inline-tier expressions against a fixed packing plan
pub struct Lowerer<'a> {
    property: &'a str,
    plan: &'a PackingPlan,
    uniforms: &'a mut UniformLayout,
    variables: &'a BTreeMap<String, Value>,
    externals: &'a ExternalRegistry,
}

impl<'a> Lowerer<'a> {
    pub fn new(
        property: &'a str,
        plan: &'a PackingPlan,
        uniforms: &'a mut UniformLayout,
        variables: &'a BTreeMap<String, Value>,
        externals: &'a ExternalRegistry,
    ) -> Self {
        Self {
            property,
            plan,
            uniforms,
            variables,
            externals,
        }
    }

    pub fn lower(&mut self, expr: &Expr) -> Result<ShaderExpr, CompileError> {
        if expr.literal().is_none() && !expr.is_feature_dependent() && !expr.is_frame_dependent() {
            if let Some(value) = self.fold(expr) {
                return literal(self.property, &value);
            }
        }

        match expr {
            Expr::Literal(value) => literal(self.property, value),
            Expr::PropertyRef { name, ty } => {
                let local = self.plan.local_for_property(name).ok_or_else(|| {
                    CompileError::UnresolvedProperty {
                        property: self.property.to_string(),
                        name: name.clone(),
                    }
                })?;
                Ok(ShaderExpr::Local {
                    name: local.to_string(),
                    ty: ShaderType::of(*ty),
                })
            }
            Expr::Input { input, ty } => {
                let ty = ShaderType::of(*ty);
                let name = self.uniforms.frame_input(input, ty);
                Ok(ShaderExpr::Uniform { name, ty })
            }
            Expr::Operator { op, args, .. } => self.lower_op(*op, args),
            Expr::Interpolate {
                kind, input, stops, ..
            } => self.lower_interpolate(*kind, input, stops),
            Expr::Case {
                branches, fallback, ..
            } => {
                let mut acc = self.lower(fallback)?;
                for (condition, result) in branches.iter().rev() {
                    acc = ShaderExpr::select(acc, self.lower(result)?, self.lower(condition)?);
                }
                Ok(acc)
            }
            Expr::External { .. } => Err(CompileError::InvalidSpec(format!(
                "`{}`: external functions cannot run in a shader",
                self.property
            ))),
        }
    }

    /// Evaluate a constant subtree on the CPU
    fn fold(&self, expr: &Expr) -> Option<Value> {
        let ctx = EvalContext::new(&NoProperties, self.variables, self.externals);
        evaluate(expr, &ctx).ok()
    }

    fn lower_all(&mut self, args: &[Expr]) -> Result<Vec<ShaderExpr>, CompileError> {
        args.iter().map(|a| self.lower(a)).collect()
    }

    fn lower_op(&mut self, op: Op, args: &[Expr]) -> Result<ShaderExpr, CompileError> {
        let mut lowered = self.lower_all(args)?.into_iter();
        let mut next = || lowered.next().unwrap_or(ShaderExpr::Float(0.0));

        let binary = |op: BinaryOp, lhs: ShaderExpr, rhs: ShaderExpr| ShaderExpr::binary(op, lhs, rhs);
        let fold_left = |op: BinaryOp, items: Vec<ShaderExpr>| {
            items
                .into_iter()
                .reduce(|acc, item| ShaderExpr::binary(op, acc, item))
        };

        Ok(match op {
            Op::Add | Op::Mul | Op::All | Op::Any => {
                let (bin, empty) = match op {
                    Op::Add => (BinaryOp::Add, ShaderExpr::Float(0.0)),
                    Op::Mul => (BinaryOp::Mul, ShaderExpr::Float(1.0)),
                    Op::All => (BinaryOp::And, ShaderExpr::Bool(true)),
                    _ => (BinaryOp::Or, ShaderExpr::Bool(false)),
                };
                let items: Vec<ShaderExpr> = (0..args.len()).map(|_| next()).collect();
                fold_left(bin, items).unwrap_or(empty)
            }
            Op::Sub => binary(BinaryOp::Sub, next(), next()),
            Op::Div => binary(BinaryOp::Div, next(), next()),
            Op::Mod => binary(BinaryOp::Mod, next(), next()),
            Op::Gt => binary(BinaryOp::Gt, next(), next()),
            Op::Ge => binary(BinaryOp::Ge, next(), next()),
            Op::Lt => binary(BinaryOp::Lt, next(), next()),
            Op::Le => binary(BinaryOp::Le, next(), next()),
            Op::Eq => binary(BinaryOp::Eq, next(), next()),
            Op::Ne => binary(BinaryOp::Ne, next(), next()),
            Op::Not => ShaderExpr::Not(Box::new(next())),
            Op::Pow => ShaderExpr::call(Builtin::Pow, vec![next(), next()]),
            Op::Abs => ShaderExpr::call(Builtin::Abs, vec![next()]),
            Op::Floor => ShaderExpr::call(Builtin::Floor, vec![next()]),
            Op::Ceil => ShaderExpr::call(Builtin::Ceil, vec![next()]),
            Op::Sqrt => ShaderExpr::call(Builtin::Sqrt, vec![next()]),
            Op::Sin => ShaderExpr::call(Builtin::Sin, vec![next()]),
            Op::Cos => ShaderExpr::call(Builtin::Cos, vec![next()]),
            Op::Round => ShaderExpr::call(
                Builtin::Floor,
                vec![binary(BinaryOp::Add, next(), ShaderExpr::Float(0.5))],
            ),
            Op::Atan if args.len() == 2 => ShaderExpr::call(Builtin::Atan2, vec![next(), next()]),
            Op::Atan => ShaderExpr::call(Builtin::Atan, vec![next()]),
            Op::Clamp => ShaderExpr::call(Builtin::Clamp, vec![next(), next(), next()]),
            Op::MakeColor => {
                let channel = |c: ShaderExpr| binary(BinaryOp::Div, c, ShaderExpr::Float(255.0));
                let (r, g, b) = (channel(next()), channel(next()), channel(next()));
                let a = if args.len() == 4 {
                    next()
                } else {
                    ShaderExpr::Float(1.0)
                };
                ShaderExpr::MakeVec4(vec![r, g, b, a])
            }
        })
    }

    /// Select chain over segments; the last segment whose lower stop lies
    /// below `x` wins, and below the first stop the first output holds
    fn lower_interpolate(
        &mut self,
        kind: Interpolation,
        input: &Expr,
        stops: &[(f64, Expr)],
    ) -> Result<ShaderExpr, CompileError> {
        let x = self.lower(input)?;
        let outputs: Vec<ShaderExpr> = stops
            .iter()
            .map(|(_, output)| self.lower(output))
            .collect::<Result<_, _>>()?;

        let mut acc = outputs[0].clone();
        for (i, pair) in stops.windows(2).enumerate() {
            let (lo, hi) = (pair[0].0, pair[1].0);
            let t = factor(kind, x.clone(), lo, hi);
            let mixed = ShaderExpr::call(
                Builtin::Mix,
                vec![outputs[i].clone(), outputs[i + 1].clone(), t],
            );
            let above = ShaderExpr::binary(BinaryOp::Gt, x.clone(), ShaderExpr::Float(lo as f32));
            acc = ShaderExpr::select(acc, mixed, above);
        }
        Ok(acc)
    }
}

fn factor(kind: Interpolation, x: ShaderExpr, lo: f64, hi: f64) -> ShaderExpr {
    let offset = ShaderExpr::binary(BinaryOp::Sub, x, ShaderExpr::Float(lo as f32));
    let raw = match kind {
        Interpolation::Exponential { base } if base != 1.0 => {
            let grown = ShaderExpr::call(Builtin::Pow, vec![ShaderExpr::Float(base as f32), offset]);
            ShaderExpr::binary(
                BinaryOp::Div,
                ShaderExpr::binary(BinaryOp::Sub, grown, ShaderExpr::Float(1.0)),
                ShaderExpr::Float((base.powf(hi - lo) - 1.0) as f32),
            )
        }
        _ => ShaderExpr::binary(BinaryOp::Div, offset, ShaderExpr::Float((hi - lo) as f32)),
    };
    ShaderExpr::call(
        Builtin::Clamp,
        vec![raw, ShaderExpr::Float(0.0), ShaderExpr::Float(1.0)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::{AttributePacker, AttributeRequest};
    use serde_json::json;
    use strata_core::{ParseEnv, Parser};

    fn parse(json: serde_json::Value, ty: ValueType) -> Expr {
        let variables = BTreeMap::new();
        let externals = ExternalRegistry::new();
        let env = ParseEnv {
            schema: None,
            variables: &variables,
            externals: &externals,
        };
        Parser::new(env).parse_property("test", &json, ty).unwrap()
    }

    #[test]
    fn tiers_follow_dependencies() {
        let uniform = parse(json!(["interpolate", ["linear"], ["zoom"], 0, 1, 10, 5]), ValueType::Number);
        assert_eq!(choose_tier(StyleProperty::StrokeWidth, &uniform), Tier::Uniform);

        let inline = parse(json!(["*", ["get", "lanes"], 2]), ValueType::Number);
        assert_eq!(choose_tier(StyleProperty::StrokeWidth, &inline), Tier::Inline);

        let color = parse(
            json!(["case", [">", ["get", "x"], 1], "#ff0000", "#0000ff"]),
            ValueType::Color,
        );
        assert_eq!(choose_tier(StyleProperty::FillColor, &color), Tier::PreEvaluated);

        let filter = parse(json!(["==", ["get", "kind"], "road"]), ValueType::Boolean);
        assert_eq!(choose_tier(StyleProperty::Filter, &filter), Tier::Cull);

        let zoom_filter = parse(
            json!(["all", ["==", ["get", "kind"], "road"], [">", ["zoom"], 10]]),
            ValueType::Boolean,
        );
        assert_eq!(choose_tier(StyleProperty::Filter, &zoom_filter), Tier::Inline);

        let text = parse(json!(["get", "name"]), ValueType::String);
        assert_eq!(choose_tier(StyleProperty::TextField, &text), Tier::CpuOnly);
    }

    #[test]
    fn constant_subtrees_fold_to_literals() {
        let expr = parse(json!(["+", ["get", "x"], ["*", 2, 3]]), ValueType::Number);
        let mut packer = AttributePacker::new();
        packer.request(AttributeRequest::property("x", ValueType::Number, None));
        let plan = packer.finish();
        let mut uniforms = UniformLayout::new();
        let variables = BTreeMap::new();
        let externals = ExternalRegistry::new();

        let lowered = Lowerer::new("test", &plan, &mut uniforms, &variables, &externals)
            .lower(&expr)
            .unwrap();
        assert_eq!(lowered.to_wgsl(), "(prop_x + 6.0)");
    }

    #[test]
    fn variables_become_uniforms() {
        let mut variables = BTreeMap::new();
        variables.insert("limit".to_string(), Value::Number(3.0));
        let externals = ExternalRegistry::new();
        let env = ParseEnv {
            schema: None,
            variables: &variables,
            externals: &externals,
        };
        let expr = Parser::new(env)
            .parse_property("filter", &json!([">", ["get", "x"], ["var", "limit"]]), ValueType::Boolean)
            .unwrap();

        let mut packer = AttributePacker::new();
        packer.request(AttributeRequest::property("x", ValueType::Number, None));
        let plan = packer.finish();
        let mut uniforms = UniformLayout::new();
        let lowered = Lowerer::new("filter", &plan, &mut uniforms, &variables, &externals)
            .lower(&expr)
            .unwrap();

        assert_eq!(lowered.to_wgsl(), "(prop_x > uniforms.u_var_limit.x)");
        assert!(uniforms.slots().iter().any(|s| s.name == "u_var_limit"));
    }
}
