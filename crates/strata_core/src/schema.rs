//! Feature schemas and host callbacks
//!
//! A schema pins the type (and optionally the numeric range) of feature
//! properties. Without one, property types are inferred from the context
//! they are used in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::eval::FeatureProperties;
use crate::expr::ExternalId;
use crate::value::{Value, ValueType};

/// Declared type of one feature property
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl PropertyDecl {
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            min: None,
            max: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Declared bounds, only when both ends are present and ordered
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if max > min => Some((min, max)),
            _ => None,
        }
    }
}

/// Authoritative property declarations for a data source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    properties: BTreeMap<String, PropertyDecl>,
}

impl FeatureSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, decl: PropertyDecl) -> Self {
        self.properties.insert(name.into(), decl);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyDecl)> {
        self.properties.iter()
    }
}

/// Host function evaluated per feature on the CPU
pub type ExternalFn = Arc<dyn Fn(&dyn FeatureProperties) -> Value + Send + Sync>;

/// Source of registration serials, unique for the life of the process
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct ExternalEntry {
    name: String,
    ty: ValueType,
    func: ExternalFn,
    /// Identifies `func`; clones of a registry share it
    serial: u64,
}

/// Registry of host callbacks a style may reference with `["external", name]`
#[derive(Clone, Default)]
pub struct ExternalRegistry {
    entries: Vec<ExternalEntry>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a callback and return its id
    pub fn register(
        &mut self,
        name: impl Into<String>,
        ty: ValueType,
        func: impl Fn(&dyn FeatureProperties) -> Value + Send + Sync + 'static,
    ) -> ExternalId {
        let name = name.into();
        let entry = ExternalEntry {
            name: name.clone(),
            ty,
            func: Arc::new(func),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        };
        match self.entries.iter().position(|e| e.name == name) {
            Some(index) => {
                self.entries[index] = entry;
                ExternalId(index)
            }
            None => {
                self.entries.push(entry);
                ExternalId(self.entries.len() - 1)
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<(ExternalId, ValueType)> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|index| (ExternalId(index), self.entries[index].ty))
    }

    pub fn name(&self, id: ExternalId) -> Option<&str> {
        self.entries.get(id.0).map(|e| e.name.as_str())
    }

    pub fn call(&self, id: ExternalId, properties: &dyn FeatureProperties) -> Option<Value> {
        self.entries.get(id.0).map(|e| (e.func)(properties))
    }

    /// Name, type and registration serial of each callback.
    ///
    /// Functions are not comparable, so the serial stands in for one: a
    /// clone of this registry reports the same serials, a fresh `register`
    /// of the same name does not.
    pub fn identities(&self) -> impl Iterator<Item = (&str, ValueType, u64)> {
        self.entries.iter().map(|e| (e.name.as_str(), e.ty, e.serial))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.ty)))
            .finish()
    }
}
