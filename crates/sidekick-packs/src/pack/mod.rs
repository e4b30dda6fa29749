//! Packs
//!
//! A pack is a distributable bundle of features described by a manifest.
//! Concrete pack types are resolved through a factory table populated at
//! startup.

pub mod builtin;
pub mod manager;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::feature::Feature;
use crate::manifest::PackManifest;

pub use manager::PackManager;

/// Pack implementation contract
pub trait Pack: Send {
    fn initialize(&mut self) -> anyhow::Result<()>;

    fn shutdown(&mut self) -> anyhow::Result<()>;

    fn manifest(&self) -> PackManifest;

    fn features(&self) -> Vec<Arc<dyn Feature>>;
}

/// Constructor for one pack type
pub type PackFactory = Arc<dyn Fn() -> Box<dyn Pack> + Send + Sync>;

/// Pack id → constructor
#[derive(Clone, Default)]
pub struct PackFactories {
    factories: HashMap<String, PackFactory>,
}

impl PackFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the packs compiled into the app
    pub fn with_builtin() -> Self {
        let mut factories = Self::new();
        builtin::register_builtin(&mut factories);
        factories
    }

    /// Register (or replace) the constructor for `pack_id`
    pub fn register<F>(&mut self, pack_id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Pack> + Send + Sync + 'static,
    {
        self.factories
            .insert(pack_id.to_string(), Arc::new(factory));
    }

    pub fn get(&self, pack_id: &str) -> Option<PackFactory> {
        self.factories.get(pack_id).cloned()
    }

    pub fn contains(&self, pack_id: &str) -> bool {
        self.factories.contains_key(pack_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Lifecycle state of a pack id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PackState {
    Discovered,
    Loaded,
    Unloaded,
}

/// Coarse milestones reported while loading a pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadStage {
    Checking,
    Initializing,
    Instantiating,
    LoadingFeatures,
    Done,
}

impl LoadStage {
    pub fn percent(&self) -> u8 {
        match self {
            LoadStage::Checking => 0,
            LoadStage::Initializing => 10,
            LoadStage::Instantiating => 30,
            LoadStage::LoadingFeatures => 70,
            LoadStage::Done => 100,
        }
    }
}

/// Best-effort cancellation flag for asynchronous loads
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pack directory found under the packs root
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPack {
    pub id: String,
    pub path: PathBuf,
    pub manifest: Option<PackManifest>,
}

/// Result of extracting a pack archive
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedPack {
    pub id: String,
    pub path: PathBuf,
    pub manifest: PackManifest,
}
