//! Tessellation and cache settings
//!
//! Both structs deserialize from a config file section and can be
//! overridden at startup from the environment:
//!
//! - `STRATA_FILL_TOLERANCE=0.05`
//! - `STRATA_TILE_CACHE_MB=512`

use serde::{Deserialize, Serialize};

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_f32(name: &str) -> Option<f32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellationConfig {
    /// Maximum distance between a curve and its flattened polygon
    pub fill_tolerance: f32,
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            fill_tolerance: 0.1,
        }
    }
}

impl TessellationConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(tolerance) = env_f32("STRATA_FILL_TOLERANCE") {
            if tolerance.is_finite() && tolerance > 0.0 {
                tracing::info!("tessellation override: fill_tolerance={}", tolerance);
                self.fill_tolerance = tolerance;
            } else {
                tracing::warn!("ignoring STRATA_FILL_TOLERANCE={}", tolerance);
            }
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Resident bytes above which `trim` starts releasing unreferenced tiles
    pub memory_budget_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: 256 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(mib) = env_u64("STRATA_TILE_CACHE_MB") {
            self.memory_budget_bytes = mib.saturating_mul(1024 * 1024);
            tracing::info!(
                "tile cache override: memory_budget={} MiB",
                self.memory_budget_bytes / (1024 * 1024)
            );
        }
        self
    }
}
