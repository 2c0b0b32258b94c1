//! strata.toml handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strata_gpu::{CacheConfig, TessellationConfig};

pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Top-level configuration (strata.toml)
#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct StrataConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub tessellation: TessellationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl StrataConfig {
    /// Load `path`, or `strata.toml` in the working directory when it exists.
    ///
    /// An explicitly named file must exist; the implicit one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Path::new(DEFAULT_CONFIG_FILE).to_path_buf(), false),
        };

        if !config_path.exists() {
            if required {
                anyhow::bail!("No config file found at {}", config_path.display());
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `STRATA_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        Self {
            tessellation: self.tessellation.with_env_overrides(),
            cache: self.cache.with_env_overrides(),
            ..self
        }
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config = StrataConfig::from_toml(
            r#"
            [cache]
            memory_budget_bytes = 1048576
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.memory_budget_bytes, 1 << 20);
        assert_eq!(config.tessellation, TessellationConfig::default());
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let config = StrataConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(StrataConfig::from_toml(&text).unwrap(), config);
    }
}
