//! Manifest Codec
//!
//! Parses and validates pack manifests from archives and pack directories.

pub mod loader;
pub mod types;

pub use loader::{extract_archive, load_manifest_dir, parse_manifest, read_archive_manifest};
pub use types::{current_platform, PackManifest, MANIFEST_FILE_NAME};
