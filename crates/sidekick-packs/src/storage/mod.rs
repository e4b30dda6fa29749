//! Pack storage
//!
//! File-system collaborator used by discovery and import.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File-system operations the pack manager needs. Synchronous, no retries.
pub trait PackStorage: Send + Sync {
    /// Directory holding one subdirectory per installed pack
    fn packs_root(&self) -> &Path;

    fn dir_exists(&self, path: &Path) -> bool;

    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Immediate subdirectories of `path`
    fn list_subdirs(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Remove a directory and everything below it
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Move a directory into place; `to` must not exist
    fn rename_dir(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// [`PackStorage`] backed by the local disk
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PackStorage for LocalStorage {
    fn packs_root(&self) -> &Path {
        &self.root
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_subdirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn rename_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}
