//! Manifest Types
//!
//! Rust structs matching the pack `manifest.json` document.

use serde::{Deserialize, Serialize};

use crate::common::{PackError, PackResult};

/// File name of the manifest entry inside pack archives and directories
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Pack manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackManifest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    /// Empty means every platform
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    /// Ids of other packs this pack expects to be loaded
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PackManifest {
    /// Validate manifest structure
    pub fn validate(&self) -> PackResult<()> {
        if self.id.trim().is_empty() {
            return Err(PackError::ManifestInvalid(
                "manifest id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the id can name a directory directly under the packs root
    pub fn has_storable_id(&self) -> bool {
        is_valid_dir_name(&self.id)
    }

    pub fn supports_platform(&self, platform: &str) -> bool {
        self.supported_platforms.is_empty()
            || self
                .supported_platforms
                .iter()
                .any(|p| p.eq_ignore_ascii_case(platform))
    }

    /// Display label, falling back to the id for unnamed packs
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Platform name as used in `supportedPlatforms`
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

fn is_valid_dir_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
