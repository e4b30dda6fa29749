//! Path Utilities
//!
//! Common path resolution for Sidekick directories and files.

use std::path::PathBuf;

use super::{PackError, PackResult};

/// Get the Sidekick base directory (`~/.sidekick/`)
pub fn sidekick_dir() -> PackResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PackError::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(".sidekick"))
}

/// Get a path within the Sidekick directory
pub fn sidekick_path(relative_path: &str) -> PackResult<PathBuf> {
    Ok(sidekick_dir()?.join(relative_path))
}

/// Get the default packs root
pub fn packs_dir() -> PackResult<PathBuf> {
    sidekick_path("packs")
}

/// Get the runtime config file path
pub fn config_path() -> PackResult<PathBuf> {
    sidekick_path("config.json")
}
