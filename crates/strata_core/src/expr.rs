//! Typed expression IR
//!
//! Style expressions are parsed once into this closed tree. Both backends
//! walk the same nodes: the CPU interpreter in [`crate::eval`] and the shader
//! lowering in `strata_style`.

use std::hash::{Hash, Hasher};

use crate::value::{Value, ValueType};

/// Fixed-arity and variadic operators of the expression language
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Sin,
    Cos,
    Atan,
    Clamp,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Not,
    All,
    Any,
    /// Runtime color construction from r, g, b (0-255) and a (0-1)
    MakeColor,
}

impl Op {
    /// Look up an operator by its style-language name
    pub fn from_name(name: &str) -> Option<Op> {
        Some(match name {
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "/" => Op::Div,
            "%" => Op::Mod,
            "^" => Op::Pow,
            "abs" => Op::Abs,
            "floor" => Op::Floor,
            "ceil" => Op::Ceil,
            "round" => Op::Round,
            "sqrt" => Op::Sqrt,
            "sin" => Op::Sin,
            "cos" => Op::Cos,
            "atan" => Op::Atan,
            "clamp" => Op::Clamp,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            "<=" => Op::Le,
            "==" => Op::Eq,
            "!=" => Op::Ne,
            "!" => Op::Not,
            "all" => Op::All,
            "any" => Op::Any,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "^",
            Op::Abs => "abs",
            Op::Floor => "floor",
            Op::Ceil => "ceil",
            Op::Round => "round",
            Op::Sqrt => "sqrt",
            Op::Sin => "sin",
            Op::Cos => "cos",
            Op::Atan => "atan",
            Op::Clamp => "clamp",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Not => "!",
            Op::All => "all",
            Op::Any => "any",
            Op::MakeColor => "color",
        }
    }
}

/// Per-frame inputs shared by every feature in a draw call
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameInput {
    Zoom,
    Resolution,
    Time,
    Variable(String),
}

/// Interpolation curve between two stops
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interpolation {
    Linear,
    Exponential { base: f64 },
}

impl Interpolation {
    /// Blend factor of `x` between stops `lo` and `hi`, clamped to [0, 1]
    pub fn factor(self, x: f64, lo: f64, hi: f64) -> f64 {
        let t = match self {
            Interpolation::Exponential { base } if base != 1.0 => {
                (base.powf(x - lo) - 1.0) / (base.powf(hi - lo) - 1.0)
            }
            _ => (x - lo) / (hi - lo),
        };
        t.clamp(0.0, 1.0)
    }
}

/// Opaque handle to a host callback registered on the style
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExternalId(pub usize);

/// A node of the typed expression tree
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    PropertyRef {
        name: String,
        ty: ValueType,
    },
    Input {
        input: FrameInput,
        ty: ValueType,
    },
    Operator {
        op: Op,
        args: Vec<Expr>,
        ty: ValueType,
    },
    Interpolate {
        kind: Interpolation,
        input: Box<Expr>,
        stops: Vec<(f64, Expr)>,
        ty: ValueType,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        fallback: Box<Expr>,
        ty: ValueType,
    },
    /// Host callback, evaluated on the CPU only
    External {
        id: ExternalId,
        ty: ValueType,
    },
}

impl Expr {
    pub fn ty(&self) -> ValueType {
        match self {
            Expr::Literal(v) => v.value_type(),
            Expr::PropertyRef { ty, .. }
            | Expr::Input { ty, .. }
            | Expr::Operator { ty, .. }
            | Expr::Interpolate { ty, .. }
            | Expr::Case { ty, .. }
            | Expr::External { ty, .. } => *ty,
        }
    }

    pub fn literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Visit this node and every descendant, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_)
            | Expr::PropertyRef { .. }
            | Expr::Input { .. }
            | Expr::External { .. } => {}
            Expr::Operator { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Interpolate { input, stops, .. } => {
                input.walk(visit);
                for (_, output) in stops {
                    output.walk(visit);
                }
            }
            Expr::Case {
                branches, fallback, ..
            } => {
                for (condition, result) in branches {
                    condition.walk(visit);
                    result.walk(visit);
                }
                fallback.walk(visit);
            }
        }
    }

    /// Summarise what this expression reads
    pub fn dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::default();
        self.walk(&mut |node| match node {
            Expr::PropertyRef { name, ty } => {
                if !deps.properties.iter().any(|(n, t)| n == name && t == ty) {
                    deps.properties.push((name.clone(), *ty));
                }
            }
            Expr::Input { .. } => deps.frame = true,
            Expr::External { .. } => deps.external = true,
            Expr::Case { branches, .. } => {
                deps.max_case_branches = deps.max_case_branches.max(branches.len());
            }
            Expr::Interpolate { input, .. } => {
                if input.is_feature_dependent() {
                    deps.feature_interpolation = true;
                }
            }
            _ => {}
        });
        deps
    }

    /// True when the value can differ between features of one draw call
    pub fn is_feature_dependent(&self) -> bool {
        let mut dependent = false;
        self.walk(&mut |node| {
            if matches!(node, Expr::PropertyRef { .. } | Expr::External { .. }) {
                dependent = true;
            }
        });
        dependent
    }

    /// True when the value can differ between frames
    pub fn is_frame_dependent(&self) -> bool {
        let mut dependent = false;
        self.walk(&mut |node| {
            if matches!(node, Expr::Input { .. }) {
                dependent = true;
            }
        });
        dependent
    }

    /// Feed a canonical structural form of the tree into `state`
    pub fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expr::Literal(v) => v.hash_into(state),
            Expr::PropertyRef { name, ty } => {
                name.hash(state);
                ty.hash(state);
            }
            Expr::Input { input, ty } => {
                input.hash(state);
                ty.hash(state);
            }
            Expr::Operator { op, args, ty } => {
                op.hash(state);
                ty.hash(state);
                args.len().hash(state);
                for arg in args {
                    arg.hash_into(state);
                }
            }
            Expr::Interpolate {
                kind,
                input,
                stops,
                ty,
            } => {
                match kind {
                    Interpolation::Linear => 0u8.hash(state),
                    Interpolation::Exponential { base } => {
                        1u8.hash(state);
                        base.to_bits().hash(state);
                    }
                }
                ty.hash(state);
                input.hash_into(state);
                stops.len().hash(state);
                for (stop, output) in stops {
                    stop.to_bits().hash(state);
                    output.hash_into(state);
                }
            }
            Expr::Case {
                branches,
                fallback,
                ty,
            } => {
                ty.hash(state);
                branches.len().hash(state);
                for (condition, result) in branches {
                    condition.hash_into(state);
                    result.hash_into(state);
                }
                fallback.hash_into(state);
            }
            Expr::External { id, ty } => {
                id.hash(state);
                ty.hash(state);
            }
        }
    }
}

/// What an expression reads, gathered in first-appearance order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dependencies {
    pub properties: Vec<(String, ValueType)>,
    pub frame: bool,
    pub external: bool,
    /// Largest number of condition/result pairs in any `case`
    pub max_case_branches: usize,
    /// Some `interpolate` has a feature-dependent input
    pub feature_interpolation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(name: &str) -> Expr {
        Expr::PropertyRef {
            name: name.to_string(),
            ty: ValueType::Number,
        }
    }

    #[test]
    fn dependencies_are_deduplicated_in_order() {
        let expr = Expr::Operator {
            op: Op::Add,
            args: vec![get("b"), get("a"), get("b")],
            ty: ValueType::Number,
        };
        let deps = expr.dependencies();
        let names: Vec<_> = deps.properties.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!deps.frame);
        assert!(expr.is_feature_dependent());
    }

    #[test]
    fn exponential_factor_reduces_to_linear_for_base_one() {
        let lin = Interpolation::Linear.factor(5.0, 0.0, 10.0);
        let exp = Interpolation::Exponential { base: 1.0 }.factor(5.0, 0.0, 10.0);
        assert_eq!(lin, 0.5);
        assert_eq!(exp, 0.5);
        let steep = Interpolation::Exponential { base: 2.0 }.factor(5.0, 0.0, 10.0);
        assert!(steep < 0.5);
        assert_eq!(Interpolation::Linear.factor(20.0, 0.0, 10.0), 1.0);
    }

    #[test]
    fn op_names_roundtrip() {
        for name in ["+", "clamp", ">=", "==", "!", "any"] {
            assert_eq!(Op::from_name(name).unwrap().name(), name);
        }
        assert!(Op::from_name("frobnicate").is_none());
    }
}
