//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```yaml
//! cache_capacity: 256
//! cache_ttl_secs: 600
//! max_id_set: 1000
//! accent_folding: true
//! location_format: postal
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::LocationFormat;
use crate::error::Result;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "MYCO_QUERY_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Queries kept in the cache before the least recently used is evicted.
    pub cache_capacity: usize,
    /// Cached queries older than this are recompiled. `None` keeps them
    /// until evicted or invalidated.
    pub cache_ttl_secs: Option<u64>,
    /// Longest list any parameter may carry; longer lists are rejected.
    pub max_id_set: usize,
    /// Sort names with accents folded away.
    pub accent_folding: bool,
    /// Location format for contexts that don't set one.
    pub location_format: LocationFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            cache_ttl_secs: None,
            max_id_set: 1000,
            accent_folding: true,
            location_format: LocationFormat::Postal,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded engine config");
        Ok(config)
    }

    /// Loads the file named by `MYCO_QUERY_CONFIG`, or the defaults when the
    /// variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_yaml_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = EngineConfig::from_yaml_str("cache_ttl_secs: 60\nlocation_format: scientific\n").unwrap();
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.location_format, LocationFormat::Scientific);
        assert_eq!(config.cache_capacity, 256);
        assert!(config.accent_folding);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_yaml_str("cache_size: 3\n").is_err());
    }

    #[test]
    #[serial]
    fn from_env_reads_named_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_id_set: 5").unwrap();

        std::env::set_var(CONFIG_ENV, file.path());
        let config = EngineConfig::from_env().unwrap();
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(config.max_id_set, 5);
    }

    #[test]
    #[serial]
    fn from_env_defaults_when_unset() {
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(EngineConfig::from_env().unwrap(), EngineConfig::default());
    }

    #[test]
    #[serial]
    fn from_env_reports_missing_file() {
        std::env::set_var(CONFIG_ENV, "/nonexistent/myco-query.yaml");
        let result = EngineConfig::from_env();
        std::env::remove_var(CONFIG_ENV);
        assert!(result.is_err());
    }
}
