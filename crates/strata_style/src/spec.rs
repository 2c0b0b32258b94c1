//! Style specifications as handed in by the host

use std::collections::BTreeMap;

use serde_json::Value as Json;
use strata_core::{
    Color, CompileError, ExternalRegistry, FeatureProperties, FeatureSchema, Value, ValueType,
};

/// Reserved top-level keys of a JSON style object
const VARIABLES_KEY: &str = "variables";
const SCHEMA_KEY: &str = "schema";

/// Uncompiled style: property expressions plus the declarations they may use
#[derive(Clone, Debug, Default)]
pub struct StyleSpec {
    properties: BTreeMap<String, Json>,
    variables: BTreeMap<String, Json>,
    schema: Option<FeatureSchema>,
    externals: ExternalRegistry,
}

impl StyleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object.
    ///
    /// Every key other than `variables` and `schema` is a style property.
    pub fn from_json(value: Json) -> Result<Self, CompileError> {
        let Json::Object(map) = value else {
            return Err(CompileError::InvalidSpec(
                "a style must be a JSON object".to_string(),
            ));
        };

        let mut spec = StyleSpec::new();
        for (key, value) in map {
            match key.as_str() {
                VARIABLES_KEY => {
                    let Json::Object(vars) = value else {
                        return Err(CompileError::InvalidSpec(
                            "`variables` must be an object".to_string(),
                        ));
                    };
                    spec.variables.extend(vars);
                }
                SCHEMA_KEY => {
                    let schema = serde_json::from_value(value)
                        .map_err(|e| CompileError::InvalidSpec(format!("`schema`: {e}")))?;
                    spec.schema = Some(schema);
                }
                _ => {
                    spec.properties.insert(key, value);
                }
            }
        }
        Ok(spec)
    }

    pub fn from_json_str(input: &str) -> Result<Self, CompileError> {
        let value: Json =
            serde_json::from_str(input).map_err(|e| CompileError::InvalidSpec(e.to_string()))?;
        Self::from_json(value)
    }

    /// Set a style property expression
    pub fn with_property(mut self, name: impl Into<String>, value: Json) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Declare a style variable with its default
    pub fn with_variable(mut self, name: impl Into<String>, default: Json) -> Self {
        self.variables.insert(name.into(), default);
        self
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Register a host callback usable as `["external", name]`
    pub fn with_external(
        mut self,
        name: impl Into<String>,
        ty: ValueType,
        func: impl Fn(&dyn FeatureProperties) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.externals.register(name, ty, func);
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, Json> {
        &self.properties
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    pub fn externals(&self) -> &ExternalRegistry {
        &self.externals
    }

    /// Variable defaults as typed values.
    ///
    /// Strings that look like colors (`#…`, `rgb(…`, `rgba(…`) and 3/4-element
    /// number arrays become colors.
    pub fn variable_values(&self) -> Result<BTreeMap<String, Value>, CompileError> {
        self.variables
            .iter()
            .map(|(name, json)| Ok((name.clone(), variable_value(name, json)?)))
            .collect()
    }
}

fn variable_value(name: &str, json: &Json) -> Result<Value, CompileError> {
    let invalid = || CompileError::InvalidSpec(format!("variable `{name}` has an unusable default"));
    match json {
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => n.as_f64().map(Value::Number).ok_or_else(invalid),
        Json::String(s) if looks_like_color(s) => {
            Color::parse(s).map(Value::Color).ok_or_else(invalid)
        }
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => {
            let channels: Option<Vec<f64>> = items.iter().map(Json::as_f64).collect();
            channels
                .and_then(|c| Color::from_components(&c))
                .map(Value::Color)
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn looks_like_color(s: &str) -> bool {
    let s = s.trim_start().to_ascii_lowercase();
    s.starts_with('#') || s.starts_with("rgb(") || s.starts_with("rgba(")
}
