//! Configuration management
//!
//! Reads and writes the runtime configuration (`~/.sidekick/config.json`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::{paths, PackError, PackResult};

fn default_license_timeout() -> u64 {
    30
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Overrides the default `~/.sidekick/packs` root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packs_dir: Option<PathBuf>,
    /// Base URL of the order verification service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_endpoint: Option<String>,
    #[serde(default = "default_license_timeout")]
    pub license_timeout_secs: u64,
    /// Let a newly loaded pack take over feature ids owned by another pack
    #[serde(default)]
    pub allow_feature_override: bool,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            packs_dir: None,
            license_endpoint: None,
            license_timeout_secs: default_license_timeout(),
            allow_feature_override: false,
            log_filter: default_log_filter(),
        }
    }
}

impl RuntimeConfig {
    /// Load from the default location
    pub fn load_default() -> PackResult<Self> {
        Self::load(&paths::config_path()?)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> PackResult<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| PackError::io(path, e))?;
        let config: RuntimeConfig = serde_json::from_str(&content)
            .map_err(|e| PackError::Config(format!("Failed to parse {:?}: {}", path, e)))?;

        info!("Loaded runtime config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PackResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PackError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| PackError::io(path, e))?;
        Ok(())
    }

    /// Resolve the packs root, falling back to `~/.sidekick/packs`
    pub fn packs_root(&self) -> PackResult<PathBuf> {
        match &self.packs_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::packs_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.license_timeout_secs, 30);
        assert!(!config.allow_feature_override);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"packsDir": "/opt/packs", "allowFeatureOverride": true}"#).unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.packs_root().unwrap(), PathBuf::from("/opt/packs"));
        assert!(config.allow_feature_override);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = RuntimeConfig::load(&path).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = RuntimeConfig {
            license_endpoint: Some("https://licenses.example.com".to_string()),
            ..RuntimeConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(RuntimeConfig::load(&path).unwrap(), config);
    }
}
