//! Typed shader expressions
//!
//! Lowering produces this small tree instead of text. It prints as WGSL and
//! can also be evaluated with f32 semantics, which is what the CPU/GPU parity
//! tests compare against the interpreter.

use std::fmt::Write;

use rustc_hash::FxHashMap;
use strata_core::ValueType;

/// Value types a lowered expression can have
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Float,
    Bool,
    Vec4,
}

impl ShaderType {
    /// GPU representation of a style type; strings travel as numeric ids
    pub fn of(ty: ValueType) -> ShaderType {
        match ty {
            ValueType::Boolean => ShaderType::Bool,
            ValueType::Color => ShaderType::Vec4,
            ValueType::Number | ValueType::String | ValueType::NumberArray => ShaderType::Float,
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            ShaderType::Float => "f32",
            ShaderType::Bool => "bool",
            ShaderType::Vec4 => "vec4<f32>",
        }
    }
}

/// Result of evaluating a [`ShaderExpr`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShaderValue {
    Float(f32),
    Bool(bool),
    Vec4([f32; 4]),
}

impl ShaderValue {
    pub fn as_float(self) -> f32 {
        match self {
            ShaderValue::Float(v) => v,
            ShaderValue::Bool(b) => b as u8 as f32,
            ShaderValue::Vec4(v) => v[0],
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            ShaderValue::Bool(b) => b,
            ShaderValue::Float(v) => v > 0.5,
            ShaderValue::Vec4(v) => v[0] > 0.5,
        }
    }

    pub fn as_vec4(self) -> [f32; 4] {
        match self {
            ShaderValue::Vec4(v) => v,
            ShaderValue::Float(v) => [v, 0.0, 0.0, 0.0],
            ShaderValue::Bool(b) => [b as u8 as f32, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn is_comparison(self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

/// WGSL builtins used by lowering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Floor,
    Ceil,
    Sqrt,
    Sin,
    Cos,
    Atan,
    Atan2,
    Pow,
    Clamp,
    Mix,
}

impl Builtin {
    fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Sqrt => "sqrt",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Atan => "atan",
            Builtin::Atan2 => "atan2",
            Builtin::Pow => "pow",
            Builtin::Clamp => "clamp",
            Builtin::Mix => "mix",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ShaderExpr {
    Float(f32),
    Bool(bool),
    Vec4([f32; 4]),
    /// Unpacked vertex attribute bound by a `let` in `vs_main`
    Local { name: String, ty: ShaderType },
    /// Field of the uniform block; scalars live in `.x`
    Uniform { name: String, ty: ShaderType },
    Not(Box<ShaderExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<ShaderExpr>,
        rhs: Box<ShaderExpr>,
    },
    Call {
        func: Builtin,
        args: Vec<ShaderExpr>,
    },
    /// WGSL `select(if_false, if_true, condition)`
    Select {
        if_false: Box<ShaderExpr>,
        if_true: Box<ShaderExpr>,
        condition: Box<ShaderExpr>,
    },
    MakeVec4(Vec<ShaderExpr>),
}

/// Bindings a [`ShaderExpr`] reads when evaluated on the CPU
#[derive(Clone, Debug, Default)]
pub struct ShaderScope {
    pub locals: FxHashMap<String, ShaderValue>,
    pub uniforms: FxHashMap<String, ShaderValue>,
}

impl ShaderExpr {
    pub fn binary(op: BinaryOp, lhs: ShaderExpr, rhs: ShaderExpr) -> Self {
        ShaderExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: Builtin, args: Vec<ShaderExpr>) -> Self {
        ShaderExpr::Call { func, args }
    }

    pub fn select(if_false: ShaderExpr, if_true: ShaderExpr, condition: ShaderExpr) -> Self {
        ShaderExpr::Select {
            if_false: Box::new(if_false),
            if_true: Box::new(if_true),
            condition: Box::new(condition),
        }
    }

    pub fn ty(&self) -> ShaderType {
        match self {
            ShaderExpr::Float(_) => ShaderType::Float,
            ShaderExpr::Bool(_) | ShaderExpr::Not(_) => ShaderType::Bool,
            ShaderExpr::Vec4(_) | ShaderExpr::MakeVec4(_) => ShaderType::Vec4,
            ShaderExpr::Local { ty, .. } | ShaderExpr::Uniform { ty, .. } => *ty,
            ShaderExpr::Binary { op, lhs, .. } => {
                if op.is_comparison() {
                    ShaderType::Bool
                } else {
                    lhs.ty()
                }
            }
            ShaderExpr::Call { func, args } => match func {
                Builtin::Mix => args.first().map_or(ShaderType::Float, ShaderExpr::ty),
                _ => ShaderType::Float,
            },
            ShaderExpr::Select { if_true, .. } => if_true.ty(),
        }
    }

    /// Render as a WGSL expression
    pub fn to_wgsl(&self) -> String {
        let mut out = String::new();
        self.write_wgsl(&mut out);
        out
    }

    fn write_wgsl(&self, out: &mut String) {
        match self {
            ShaderExpr::Float(v) => out.push_str(&wgsl_float(*v)),
            ShaderExpr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ShaderExpr::Vec4(v) => {
                let _ = write!(
                    out,
                    "vec4<f32>({}, {}, {}, {})",
                    wgsl_float(v[0]),
                    wgsl_float(v[1]),
                    wgsl_float(v[2]),
                    wgsl_float(v[3])
                );
            }
            ShaderExpr::Local { name, .. } => out.push_str(name),
            ShaderExpr::Uniform { name, ty } => {
                let _ = match ty {
                    ShaderType::Float => write!(out, "uniforms.{name}.x"),
                    ShaderType::Bool => write!(out, "(uniforms.{name}.x > 0.5)"),
                    ShaderType::Vec4 => write!(out, "uniforms.{name}"),
                };
            }
            ShaderExpr::Not(inner) => {
                out.push_str("!(");
                inner.write_wgsl(out);
                out.push(')');
            }
            ShaderExpr::Binary { op, lhs, rhs } => {
                let wrap = match (op, lhs.ty()) {
                    (BinaryOp::Eq, ShaderType::Vec4) => Some("all"),
                    (BinaryOp::Ne, ShaderType::Vec4) => Some("any"),
                    _ => None,
                };
                if let Some(reduce) = wrap {
                    out.push_str(reduce);
                }
                out.push('(');
                lhs.write_wgsl(out);
                let _ = write!(out, " {} ", op.symbol());
                rhs.write_wgsl(out);
                out.push(')');
            }
            ShaderExpr::Call { func, args } => {
                out.push_str(func.name());
                write_args(out, args);
            }
            ShaderExpr::Select {
                if_false,
                if_true,
                condition,
            } => {
                out.push_str("select(");
                if_false.write_wgsl(out);
                out.push_str(", ");
                if_true.write_wgsl(out);
                out.push_str(", ");
                condition.write_wgsl(out);
                out.push(')');
            }
            ShaderExpr::MakeVec4(parts) => {
                out.push_str("vec4<f32>");
                write_args(out, parts);
            }
        }
    }

    /// Evaluate with WGSL f32 semantics
    pub fn eval(&self, scope: &ShaderScope) -> ShaderValue {
        match self {
            ShaderExpr::Float(v) => ShaderValue::Float(*v),
            ShaderExpr::Bool(b) => ShaderValue::Bool(*b),
            ShaderExpr::Vec4(v) => ShaderValue::Vec4(*v),
            ShaderExpr::Local { name, ty } => scope
                .locals
                .get(name)
                .copied()
                .unwrap_or_else(|| zero(*ty)),
            ShaderExpr::Uniform { name, ty } => {
                let raw = scope.uniforms.get(name).copied().unwrap_or_else(|| zero(*ty));
                match ty {
                    ShaderType::Float => ShaderValue::Float(raw.as_float()),
                    ShaderType::Bool => ShaderValue::Bool(raw.as_bool()),
                    ShaderType::Vec4 => ShaderValue::Vec4(raw.as_vec4()),
                }
            }
            ShaderExpr::Not(inner) => ShaderValue::Bool(!inner.eval(scope).as_bool()),
            ShaderExpr::Binary { op, lhs, rhs } => eval_binary(*op, lhs.eval(scope), rhs.eval(scope)),
            ShaderExpr::Call { func, args } => {
                let values: Vec<ShaderValue> = args.iter().map(|a| a.eval(scope)).collect();
                eval_builtin(*func, &values)
            }
            ShaderExpr::Select {
                if_false,
                if_true,
                condition,
            } => {
                if condition.eval(scope).as_bool() {
                    if_true.eval(scope)
                } else {
                    if_false.eval(scope)
                }
            }
            ShaderExpr::MakeVec4(parts) => {
                let mut v = [0.0; 4];
                for (slot, part) in v.iter_mut().zip(parts) {
                    *slot = part.eval(scope).as_float();
                }
                ShaderValue::Vec4(v)
            }
        }
    }
}

fn write_args(out: &mut String, args: &[ShaderExpr]) {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        arg.write_wgsl(out);
    }
    out.push(')');
}

fn zero(ty: ShaderType) -> ShaderValue {
    match ty {
        ShaderType::Float => ShaderValue::Float(0.0),
        ShaderType::Bool => ShaderValue::Bool(false),
        ShaderType::Vec4 => ShaderValue::Vec4([0.0; 4]),
    }
}

fn eval_binary(op: BinaryOp, lhs: ShaderValue, rhs: ShaderValue) -> ShaderValue {
    if let (ShaderValue::Vec4(a), ShaderValue::Vec4(b)) = (lhs, rhs) {
        return match op {
            BinaryOp::Eq => ShaderValue::Bool(a == b),
            BinaryOp::Ne => ShaderValue::Bool(a != b),
            _ => {
                let mut v = [0.0; 4];
                for i in 0..4 {
                    v[i] = arith(op, a[i], b[i]);
                }
                ShaderValue::Vec4(v)
            }
        };
    }
    if let (ShaderValue::Bool(a), ShaderValue::Bool(b)) = (lhs, rhs) {
        return ShaderValue::Bool(match op {
            BinaryOp::And => a && b,
            BinaryOp::Or => a || b,
            BinaryOp::Eq => a == b,
            _ => a != b,
        });
    }

    let (a, b) = (lhs.as_float(), rhs.as_float());
    match op {
        BinaryOp::Gt => ShaderValue::Bool(a > b),
        BinaryOp::Ge => ShaderValue::Bool(a >= b),
        BinaryOp::Lt => ShaderValue::Bool(a < b),
        BinaryOp::Le => ShaderValue::Bool(a <= b),
        BinaryOp::Eq => ShaderValue::Bool(a == b),
        BinaryOp::Ne => ShaderValue::Bool(a != b),
        BinaryOp::And | BinaryOp::Or => ShaderValue::Bool(false),
        _ => ShaderValue::Float(arith(op, a, b)),
    }
}

fn arith(op: BinaryOp, a: f32, b: f32) -> f32 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        // WGSL float remainder truncates like Rust's `%`
        BinaryOp::Mod => a % b,
        _ => 0.0,
    }
}

fn eval_builtin(func: Builtin, args: &[ShaderValue]) -> ShaderValue {
    let f = |i: usize| args.get(i).map_or(0.0, |v| v.as_float());
    match func {
        Builtin::Abs => ShaderValue::Float(f(0).abs()),
        Builtin::Floor => ShaderValue::Float(f(0).floor()),
        Builtin::Ceil => ShaderValue::Float(f(0).ceil()),
        Builtin::Sqrt => ShaderValue::Float(f(0).sqrt()),
        Builtin::Sin => ShaderValue::Float(f(0).sin()),
        Builtin::Cos => ShaderValue::Float(f(0).cos()),
        Builtin::Atan => ShaderValue::Float(f(0).atan()),
        Builtin::Atan2 => ShaderValue::Float(f(0).atan2(f(1))),
        Builtin::Pow => ShaderValue::Float(f(0).powf(f(1))),
        Builtin::Clamp => ShaderValue::Float(f(0).max(f(1)).min(f(2))),
        Builtin::Mix => {
            let t = f(2);
            match (args.first(), args.get(1)) {
                (Some(ShaderValue::Vec4(a)), Some(ShaderValue::Vec4(b))) => {
                    let mut v = [0.0; 4];
                    for i in 0..4 {
                        v[i] = a[i] * (1.0 - t) + b[i] * t;
                    }
                    ShaderValue::Vec4(v)
                }
                _ => ShaderValue::Float(f(0) * (1.0 - t) + f(1) * t),
            }
        }
    }
}

/// Format an f32 as a WGSL float literal; non-finite values saturate
pub fn wgsl_float(v: f32) -> String {
    // NaN and negative zero print as plain zero
    let v = if v.is_nan() || v == 0.0 {
        0.0
    } else {
        v.clamp(f32::MIN, f32::MAX)
    };
    let text = format!("{v:?}");
    if v < 0.0 {
        format!("({text})")
    } else {
        text
    }
}
