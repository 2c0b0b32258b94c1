//! Compiled style deduplication

use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;
use strata_core::CompileError;

use crate::compile::{parse_style, CompiledStyle, StyleHash};
use crate::spec::StyleSpec;

/// Shares one [`CompiledStyle`] between structurally equal specs.
///
/// Only the parse phase runs on a hit; lowering and assembly are skipped.
#[derive(Debug, Default)]
pub struct StyleCache {
    styles: Mutex<FxHashMap<StyleHash, Arc<CompiledStyle>>>,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, spec: &StyleSpec) -> Result<Arc<CompiledStyle>, CompileError> {
        let parsed = parse_style(spec)?;
        let hash = parsed.hash();
        if let Some(style) = self.get(hash) {
            tracing::trace!(style = %hash, "style cache hit");
            return Ok(style);
        }

        // Lower outside the lock; a racing compile of the same style keeps
        // whichever result landed first
        let compiled = Arc::new(parsed.lower()?);
        let mut styles = self.styles.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(styles.entry(hash).or_insert(compiled).clone())
    }

    pub fn get(&self, hash: StyleHash) -> Option<Arc<CompiledStyle>> {
        self.styles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hash)
            .cloned()
    }

    pub fn remove(&self, hash: StyleHash) -> Option<Arc<CompiledStyle>> {
        self.styles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&hash)
    }

    pub fn len(&self) -> usize {
        self.styles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_specs_share_one_compiled_style() {
        let cache = StyleCache::new();
        let a = StyleSpec::new().with_property("fill-color", json!(["get", "color"]));
        let b = StyleSpec::from_json(json!({ "fill-color": ["get", "color"] })).unwrap();

        let first = cache.get_or_compile(&a).unwrap();
        let second = cache.get_or_compile(&b).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.remove(first.hash()).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn distinct_callbacks_under_one_name_do_not_share_a_style() {
        use std::collections::BTreeMap;
        use crate::property::StyleProperty;
        use strata_core::{FeatureProperties, Value, ValueType};

        let with_width = |width: f64| {
            StyleSpec::new()
                .with_property("stroke-width", json!(["external", "w"]))
                .with_external("w", ValueType::Number, move |_: &dyn FeatureProperties| {
                    Value::Number(width)
                })
        };
        let cache = StyleCache::new();
        let thin_spec = with_width(1.0);
        let thin = cache.get_or_compile(&thin_spec).unwrap();
        let wide = cache.get_or_compile(&with_width(7.0)).unwrap();
        assert_ne!(thin.hash(), wide.hash());
        assert!(!Arc::ptr_eq(&thin, &wide));

        let feature: BTreeMap<String, Value> = BTreeMap::new();
        let width = wide
            .evaluate(StyleProperty::StrokeWidth, &wide.build_context(&feature, 0.0))
            .unwrap();
        assert_eq!(width, Value::Number(7.0));

        // A clone carries the same callbacks
        let again = cache.get_or_compile(&thin_spec.clone()).unwrap();
        assert!(Arc::ptr_eq(&thin, &again));
        assert_eq!(cache.len(), 2);
    }
}
