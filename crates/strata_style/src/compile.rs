//! Style compilation
//!
//! Compilation runs in two phases. [`parse_style`] type-checks every
//! property and computes the style hash, which is all a cache lookup needs.
//! [`ParsedStyle::lower`] then picks tiers, fixes the packing plan and
//! assembles the programs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};
use serde::Serialize;
use strata_core::{
    evaluate, CompileError, EvalContext, EvalError, Expr, ExternalRegistry, FeatureProperties,
    FeatureSchema, FrameInput, NoProperties, ParseEnv, Parser, Value, ValueType,
};

use crate::lower::{choose_tier, Lowerer, Tier};
use crate::packer::{AttributePacker, AttributeRequest, PackingPlan};
use crate::property::{ProgramKind, StyleProperty};
use crate::shader::{assemble, ProgramInputs, ShaderExpr, ShaderProgram, ShaderType};
use crate::spec::StyleSpec;
use crate::uniforms::{slot_value, FrameState, UniformLayout, UniformSource};

/// Structural hash of a style; equal styles hash equal across runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StyleHash(pub u64);

impl fmt::Display for StyleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A type-checked style that has not been lowered yet
#[derive(Debug)]
pub struct ParsedStyle {
    hash: StyleHash,
    properties: Vec<(StyleProperty, Expr)>,
    variables: BTreeMap<String, Value>,
    schema: Option<FeatureSchema>,
    externals: ExternalRegistry,
}

/// Parse and type-check every property of `spec`
pub fn parse_style(spec: &StyleSpec) -> Result<ParsedStyle, CompileError> {
    let variables = spec.variable_values()?;

    let mut properties = Vec::with_capacity(spec.properties().len());
    {
        let env = ParseEnv {
            schema: spec.schema(),
            variables: &variables,
            externals: spec.externals(),
        };
        let mut parser = Parser::new(env);
        for (name, json) in spec.properties() {
            let property = StyleProperty::from_name(name)
                .ok_or_else(|| CompileError::UnknownStyleProperty(name.clone()))?;
            let expr = parser.parse_property(name, json, property.value_type())?;
            properties.push((property, expr));
        }
    }
    properties.sort_by_key(|(property, _)| *property);

    let hash = style_hash(&properties, &variables, spec.schema(), spec.externals());
    Ok(ParsedStyle {
        hash,
        properties,
        variables,
        schema: spec.schema().cloned(),
        externals: spec.externals().clone(),
    })
}

/// Parse and lower in one step
pub fn compile(spec: &StyleSpec) -> Result<CompiledStyle, CompileError> {
    parse_style(spec)?.lower()
}

fn style_hash(
    properties: &[(StyleProperty, Expr)],
    variables: &BTreeMap<String, Value>,
    schema: Option<&FeatureSchema>,
    externals: &ExternalRegistry,
) -> StyleHash {
    let mut hasher = FxHasher::default();

    properties.len().hash(&mut hasher);
    for (property, expr) in properties {
        property.name().hash(&mut hasher);
        expr.hash_into(&mut hasher);
    }

    variables.len().hash(&mut hasher);
    for (name, value) in variables {
        name.hash(&mut hasher);
        value.hash_into(&mut hasher);
    }

    match schema {
        None => 0u8.hash(&mut hasher),
        Some(schema) => {
            1u8.hash(&mut hasher);
            for (name, decl) in schema.iter() {
                name.hash(&mut hasher);
                decl.ty.hash(&mut hasher);
                decl.min.map(f64::to_bits).hash(&mut hasher);
                decl.max.map(f64::to_bits).hash(&mut hasher);
            }
        }
    }

    for (name, ty, serial) in externals.identities() {
        name.hash(&mut hasher);
        ty.hash(&mut hasher);
        serial.hash(&mut hasher);
    }

    StyleHash(hasher.finish())
}

impl ParsedStyle {
    pub fn hash(&self) -> StyleHash {
        self.hash
    }

    /// Choose tiers, plan attributes and assemble programs
    pub fn lower(self) -> Result<CompiledStyle, CompileError> {
        let tiers: Vec<Tier> = self
            .properties
            .iter()
            .map(|(property, expr)| choose_tier(*property, expr))
            .collect();

        let mut packer = AttributePacker::new();
        // A feature property packed raw has one vertex slot, so every
        // shader-side use must agree on its type
        let mut packed: FxHashMap<String, ValueType> = FxHashMap::default();
        for ((property, expr), tier) in self.properties.iter().zip(&tiers) {
            match tier {
                Tier::PreEvaluated => {
                    packer.request(AttributeRequest::evaluated(*property, expr.clone()))
                }
                Tier::Inline => {
                    for (name, ty) in expr.dependencies().properties {
                        match packed.get(&name) {
                            Some(&known) if known != ty => {
                                return Err(CompileError::TypeMismatch {
                                    property: property.name().to_string(),
                                    operator: "get".to_string(),
                                    expected: known.to_string(),
                                    got: ty.to_string(),
                                });
                            }
                            Some(_) => continue,
                            None => {
                                packed.insert(name.clone(), ty);
                            }
                        }
                        let bounds = match ty {
                            ValueType::Number => self
                                .schema
                                .as_ref()
                                .and_then(|s| s.get(&name))
                                .and_then(|decl| decl.bounds()),
                            _ => None,
                        };
                        packer.request(AttributeRequest::property(&name, ty, bounds));
                    }
                }
                _ => {}
            }
        }
        let plan = packer.finish();

        let mut uniforms = UniformLayout::new();
        let mut values = BTreeMap::new();
        for ((property, expr), tier) in self.properties.iter().zip(&tiers) {
            let value = match tier {
                Tier::Uniform => ShaderExpr::Uniform {
                    name: uniforms.property(*property),
                    ty: ShaderType::of(property.value_type()),
                },
                Tier::Inline => Lowerer::new(
                    property.name(),
                    &plan,
                    &mut uniforms,
                    &self.variables,
                    &self.externals,
                )
                .lower(expr)?,
                Tier::PreEvaluated => {
                    let attribute = plan.evaluated(*property).ok_or_else(|| {
                        CompileError::InvalidSpec(format!("`{property}` has no attribute slot"))
                    })?;
                    ShaderExpr::Local {
                        name: attribute.local.clone(),
                        ty: attribute.shader_type(),
                    }
                }
                Tier::Cull => ShaderExpr::Bool(true),
                Tier::CpuOnly => continue,
            };
            values.insert(*property, value);
        }

        let kinds: BTreeSet<ProgramKind> = self
            .properties
            .iter()
            .filter_map(|(property, _)| property.program())
            .collect();
        let header = format!("style {}", self.hash);
        let inputs = ProgramInputs {
            header: &header,
            plan: &plan,
            uniforms: &uniforms,
            values: &values,
        };
        let programs: Vec<ShaderProgram> =
            kinds.into_iter().map(|kind| assemble(kind, &inputs)).collect();

        tracing::debug!(
            style = %self.hash,
            attributes = plan.attributes().len(),
            stride = plan.stride(),
            uniforms = uniforms.slots().len(),
            programs = programs.len(),
            "compiled style"
        );

        let properties = self
            .properties
            .into_iter()
            .zip(tiers)
            .map(|((property, expr), tier)| CompiledProperty {
                property,
                shader: values.remove(&property),
                expr,
                tier,
            })
            .collect();

        Ok(CompiledStyle {
            hash: self.hash,
            properties,
            plan,
            uniforms,
            programs,
            variables: self.variables,
            externals: self.externals,
        })
    }
}

/// One property after tier selection
#[derive(Clone, Debug)]
pub struct CompiledProperty {
    pub property: StyleProperty,
    pub expr: Expr,
    pub tier: Tier,
    /// Vertex-stage value, absent for CPU-only properties
    pub shader: Option<ShaderExpr>,
}

/// Everything needed to tessellate and draw tiles with one style
#[derive(Debug)]
pub struct CompiledStyle {
    hash: StyleHash,
    properties: Vec<CompiledProperty>,
    plan: PackingPlan,
    uniforms: UniformLayout,
    programs: Vec<ShaderProgram>,
    variables: BTreeMap<String, Value>,
    externals: ExternalRegistry,
}

impl CompiledStyle {
    pub fn hash(&self) -> StyleHash {
        self.hash
    }

    pub fn plan(&self) -> &PackingPlan {
        &self.plan
    }

    pub fn uniforms(&self) -> &UniformLayout {
        &self.uniforms
    }

    pub fn programs(&self) -> &[ShaderProgram] {
        &self.programs
    }

    pub fn program(&self, kind: ProgramKind) -> Option<&ShaderProgram> {
        self.programs.iter().find(|p| p.kind == kind)
    }

    pub fn has_program(&self, kind: ProgramKind) -> bool {
        self.program(kind).is_some()
    }

    pub fn properties(&self) -> &[CompiledProperty] {
        &self.properties
    }

    pub fn property(&self, property: StyleProperty) -> Option<&CompiledProperty> {
        self.properties.iter().find(|p| p.property == property)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn externals(&self) -> &ExternalRegistry {
        &self.externals
    }

    /// Context for build-time evaluation: the tile zoom and default
    /// variables stand in for frame inputs
    pub fn build_context<'a>(
        &'a self,
        properties: &'a dyn FeatureProperties,
        zoom: f64,
    ) -> EvalContext<'a> {
        EvalContext::new(properties, &self.variables, &self.externals).with_zoom(zoom)
    }

    /// Evaluate a property for one feature, or its default when unset
    pub fn evaluate(&self, property: StyleProperty, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match self.property(property) {
            Some(compiled) => evaluate(&compiled.expr, ctx),
            None => Ok(property.default_value()),
        }
    }

    /// Whether a feature survives the CPU-side filter
    pub fn passes_filter(&self, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        match self.property(StyleProperty::Filter) {
            Some(filter) if filter.tier == Tier::Cull => {
                Ok(evaluate(&filter.expr, ctx)?.as_bool().unwrap_or(false))
            }
            _ => Ok(true),
        }
    }

    /// Uniform slot values for one draw, in declaration order
    pub fn uniform_values(&self, frame: &FrameState) -> Vec<[f32; 4]> {
        let mut variables = self.variables.clone();
        for (name, value) in &frame.variables {
            let value = match self.variables.get(name) {
                Some(default) => match value.coerce(default.value_type()) {
                    Some(v) => v,
                    None => {
                        tracing::warn!(
                            variable = %name,
                            expected = %default.value_type(),
                            found = %value.value_type(),
                            "ignoring mistyped variable override"
                        );
                        continue;
                    }
                },
                None => value.clone(),
            };
            variables.insert(name.clone(), value);
        }

        let ctx = EvalContext::new(&NoProperties, &variables, &self.externals)
            .with_zoom(frame.zoom)
            .with_resolution(frame.resolution)
            .with_time(frame.time);

        self.uniforms
            .slots()
            .iter()
            .map(|slot| match &slot.source {
                UniformSource::Frame(FrameInput::Zoom) => [frame.zoom as f32, 0.0, 0.0, 0.0],
                UniformSource::Frame(FrameInput::Resolution) => {
                    [frame.resolution as f32, 0.0, 0.0, 0.0]
                }
                UniformSource::Frame(FrameInput::Time) => [frame.time as f32, 0.0, 0.0, 0.0],
                UniformSource::Frame(FrameInput::Variable(name)) => {
                    variables.get(name).map(slot_value).unwrap_or_default()
                }
                UniformSource::Property(property) => match self.evaluate(*property, &ctx) {
                    Ok(value) => slot_value(&value),
                    Err(err) => {
                        tracing::warn!(property = %property, error = %err, "uniform evaluation failed");
                        slot_value(&property.default_value())
                    }
                },
            })
            .collect()
    }

    /// Uniform block bytes: projection then one vec4 per slot
    pub fn uniform_bytes(&self, frame: &FrameState) -> Vec<u8> {
        let mut floats: Vec<f32> = Vec::with_capacity(self.uniforms.byte_size() / 4);
        floats.extend_from_slice(&frame.projection);
        for slot in self.uniform_values(frame) {
            floats.extend_from_slice(&slot);
        }
        bytemuck::cast_slice(&floats).to_vec()
    }
}
