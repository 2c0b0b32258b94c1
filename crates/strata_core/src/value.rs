//! Runtime values and their types

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Static type of an expression node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Boolean,
    Color,
    String,
    #[serde(rename = "number[]")]
    NumberArray,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Color => "color",
            ValueType::String => "string",
            ValueType::NumberArray => "number[]",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value produced by evaluation, or a scalar attached to a feature.
///
/// Feature property maps deserialize from plain JSON scalars; colors only
/// ever come out of evaluation or literal parsing.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
    NumberArray(Vec<f64>),
    #[serde(skip_deserializing)]
    Color(Color),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::NumberArray(_) => ValueType::NumberArray,
            Value::Color(_) => ValueType::Color,
        }
    }

    /// Zero value used when a lookup is missing or fails
    pub fn default_for(ty: ValueType) -> Value {
        match ty {
            ValueType::Number => Value::Number(0.0),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::Color => Value::Color(Color::TRANSPARENT),
            ValueType::String => Value::String(String::new()),
            ValueType::NumberArray => Value::NumberArray(Vec::new()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// Coerce a raw feature scalar into `ty`.
    ///
    /// Strings and 3/4-element number arrays are accepted for colors, and
    /// numbers and booleans for strings; every other pairing must match
    /// exactly.
    pub fn coerce(&self, ty: ValueType) -> Option<Value> {
        match (self, ty) {
            (Value::Number(n), ValueType::String) => Some(Value::String(n.to_string())),
            (Value::Boolean(b), ValueType::String) => Some(Value::String(b.to_string())),
            (Value::String(s), ValueType::Color) => Color::parse(s).map(Value::Color),
            (Value::NumberArray(items), ValueType::Color) => {
                Color::from_components(items).map(Value::Color)
            }
            (v, ty) if v.value_type() == ty => Some(v.clone()),
            _ => None,
        }
    }

    /// Feed a canonical form of the value into `state`
    pub fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => canonical_bits(*n).hash(state),
            Value::String(s) => s.hash(state),
            Value::NumberArray(items) => {
                items.len().hash(state);
                for n in items {
                    canonical_bits(*n).hash(state);
                }
            }
            Value::Color(c) => c.to_rgba8().hash(state),
        }
    }
}

/// `-0.0` and `0.0` hash the same
fn canonical_bits(n: f64) -> u64 {
    if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::NumberArray(items) => write!(f, "{items:?}"),
            Value::Color(c) => {
                let [r, g, b, a] = c.to_rgba8();
                write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

/// Stable numeric id a string takes on the GPU.
///
/// FNV-1a over the UTF-8 bytes, truncated to 24 bits so the id is exactly
/// representable in an f32 attribute or uniform.
pub fn string_id(s: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET;
    for byte in s.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash & 0x00ff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_color_strings() {
        let v = Value::from("#ff0000").coerce(ValueType::Color);
        assert_eq!(v, Some(Value::Color(Color::RED)));
        assert_eq!(Value::from("nope").coerce(ValueType::Color), None);
        assert_eq!(Value::from("3").coerce(ValueType::Number), None);
    }

    #[test]
    fn scalars_coerce_to_labels() {
        assert_eq!(Value::from(12.0).coerce(ValueType::String), Some(Value::from("12")));
        assert_eq!(Value::from(2.5).coerce(ValueType::String), Some(Value::from("2.5")));
        assert_eq!(
            Value::Boolean(true).coerce(ValueType::String),
            Some(Value::from("true"))
        );
    }

    #[test]
    fn deserializes_feature_scalars() {
        let v: Value = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, Value::Number(12.5));
        let v: Value = serde_json::from_str("\"road\"").unwrap();
        assert_eq!(v, Value::from("road"));
        let v: Value = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(v, Value::NumberArray(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn string_ids_are_exact_in_f32() {
        for s in ["", "road", "a much longer string value"] {
            let id = string_id(s);
            assert!(id < (1 << 24));
            assert_eq!(id as f32 as u32, id);
        }
        assert_ne!(string_id("a"), string_id("b"));
    }
}
