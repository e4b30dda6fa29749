//! Manifest Loader
//!
//! Locates and parses pack manifests inside archives and pack directories.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::types::{PackManifest, MANIFEST_FILE_NAME};
use crate::common::{PackError, PackResult};

/// Manifests larger than this are rejected outright
const MAX_MANIFEST_BYTES: u64 = 1_000_000;

/// Parse and validate a manifest document
pub fn parse_manifest(bytes: &[u8]) -> PackResult<PackManifest> {
    let manifest: PackManifest = serde_json::from_slice(bytes)
        .map_err(|e| PackError::ManifestInvalid(format!("Failed to parse JSON: {}", e)))?;
    manifest.validate()?;
    Ok(manifest)
}

/// Locate the manifest entry in raw archive bytes and parse it
///
/// `source` only labels errors (usually the archive path).
pub fn read_archive_manifest(bytes: &[u8], source: &str) -> PackResult<PackManifest> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let index = find_manifest_entry(&mut archive)?
        .ok_or_else(|| PackError::ManifestMissing(source.to_string()))?;

    let mut entry = archive.by_index(index)?;
    if entry.size() > MAX_MANIFEST_BYTES {
        return Err(PackError::ManifestInvalid(
            "Manifest file too large (max 1MB)".to_string(),
        ));
    }

    let mut content = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut content).map_err(|e| {
        PackError::ManifestInvalid(format!("Failed to read {}: {}", entry.name(), e))
    })?;

    debug!("Found manifest entry {} in {}", entry.name(), source);
    parse_manifest(&content)
}

/// Index of the shallowest `manifest.json` entry, if any
fn find_manifest_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> PackResult<Option<usize>> {
    let mut best: Option<(usize, usize)> = None;

    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let components: Vec<&str> = entry
            .name()
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .collect();
        if components.last() != Some(&MANIFEST_FILE_NAME) {
            continue;
        }

        let depth = components.len();
        if best.map_or(true, |(best_depth, _)| depth < best_depth) {
            best = Some((depth, index));
        }
    }

    Ok(best.map(|(_, index)| index))
}

/// Extract the pack inside an archive into `dest`.
///
/// The directory holding the manifest entry becomes the top of `dest`, so
/// `focus/manifest.json` lands at `<dest>/manifest.json`. Entries outside
/// that directory, and entries whose names would escape `dest`, are skipped.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> PackResult<()> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let prefix = match find_manifest_entry(&mut archive)? {
        Some(index) => archive
            .by_index(index)?
            .enclosed_name()
            .and_then(|name| name.parent().map(Path::to_path_buf))
            .unwrap_or_default(),
        None => PathBuf::new(),
    };

    let mut extracted = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping archive entry {:?} outside the pack", entry.name());
            continue;
        };
        let Ok(relative) = name.strip_prefix(&prefix) else {
            debug!("Skipping archive entry {:?} beside the pack root", entry.name());
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| PackError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
        }
        let mut file = fs::File::create(&target).map_err(|e| PackError::io(&target, e))?;
        io::copy(&mut entry, &mut file).map_err(|e| PackError::io(&target, e))?;
        extracted += 1;
    }

    info!("Extracted {} files into {:?}", extracted, dest);
    Ok(())
}

/// Read `<dir>/manifest.json` if the directory has one
pub fn load_manifest_dir(dir: &Path) -> PackResult<Option<PackManifest>> {
    let path = dir.join(MANIFEST_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }

    let metadata = fs::metadata(&path).map_err(|e| PackError::io(&path, e))?;
    if metadata.len() > MAX_MANIFEST_BYTES {
        return Err(PackError::ManifestInvalid(
            "Manifest file too large (max 1MB)".to_string(),
        ));
    }

    let content = fs::read(&path).map_err(|e| PackError::io(&path, e))?;
    parse_manifest(&content).map(Some)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Build an in-memory zip from `(name, contents)` pairs
    pub(crate) fn build_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse_manifest(
            br#"{
                "id": "focus",
                "name": "Focus Mode",
                "description": "Blocks distractions",
                "version": "1.2.0",
                "author": "Sidekick",
                "supportedPlatforms": ["windows", "macos"],
                "dependencies": ["core-pack"]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.id, "focus");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.supported_platforms, vec!["windows", "macos"]);
        assert_eq!(manifest.dependencies, vec!["core-pack"]);
    }

    #[test]
    fn test_optional_fields_default() {
        let manifest = parse_manifest(br#"{"id": "minimal"}"#).unwrap();
        assert_eq!(manifest.label(), "minimal");
        assert!(manifest.supported_platforms.is_empty());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_missing_or_malformed_id_is_invalid() {
        for doc in [
            r#"{"name": "No id"}"#,
            r#"{"id": 42}"#,
            r#"{"id": ""}"#,
            "not json",
        ] {
            assert!(
                matches!(parse_manifest(doc.as_bytes()), Err(PackError::ManifestInvalid(_))),
                "expected invalid manifest for {doc}"
            );
        }
    }

    #[test]
    fn test_archive_without_manifest() {
        let bytes = build_archive(&[("readme.txt", "hello")]);
        let err = read_archive_manifest(&bytes, "focus.zip").unwrap_err();
        assert!(matches!(err, PackError::ManifestMissing(ref s) if s == "focus.zip"));
    }

    #[test]
    fn test_archive_manifest_any_depth_shallowest_wins() {
        let bytes = build_archive(&[
            ("focus/assets/manifest.json", r#"{"id": "nested"}"#),
            ("focus/manifest.json", r#"{"id": "focus"}"#),
            ("focus/lib/notes.txt", "x"),
        ]);
        let manifest = read_archive_manifest(&bytes, "focus.zip").unwrap();
        assert_eq!(manifest.id, "focus");
    }

    #[test]
    fn test_not_an_archive() {
        let err = read_archive_manifest(b"plain text", "bogus.zip").unwrap_err();
        assert!(matches!(err, PackError::Archive(_)));
    }

    #[test]
    fn test_load_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest_dir(dir.path()).unwrap().is_none());

        fs::write(dir.path().join(MANIFEST_FILE_NAME), r#"{"id": "focus"}"#).unwrap();
        let manifest = load_manifest_dir(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.id, "focus");
    }

    #[test]
    fn test_extract_roots_pack_at_manifest_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build_archive(&[
            ("focus/manifest.json", r#"{"id": "focus"}"#),
            ("focus/assets/icon.svg", "<svg/>"),
            ("notes.txt", "outside"),
        ]);

        extract_archive(&bytes, dir.path()).unwrap();

        assert_eq!(load_manifest_dir(dir.path()).unwrap().unwrap().id, "focus");
        assert!(dir.path().join("assets").join("icon.svg").is_file());
        assert!(!dir.path().join("focus").exists());
        assert!(!dir.path().join("notes.txt").exists());
    }
}
