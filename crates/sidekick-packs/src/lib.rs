//! Sidekick extension pack runtime.
//!
//! Discovers, imports, loads and unloads feature packs, tracks which pack owns
//! which feature, and activates features in dependency order, optionally
//! gated behind order verification.

pub mod common;
pub mod config;
pub mod feature;
pub mod license;
pub mod logging;
pub mod manifest;
pub mod monitor;
pub mod pack;
pub mod storage;

pub use common::{ErrorCode, PackError, PackResult};
pub use config::RuntimeConfig;
pub use feature::{ActivationService, Feature, FeatureConflict, FeatureRegistry};
pub use license::{HttpOrderVerifier, License, OrderValidation, OrderVerifier};
pub use logging::init_logging;
pub use manifest::PackManifest;
pub use monitor::{EventBus, EventRecord, RuntimeEvent};
pub use pack::manager::PackSummary;
pub use pack::{
    CancelToken, DiscoveredPack, ImportedPack, LoadStage, Pack, PackFactories, PackFactory,
    PackManager, PackState,
};
pub use storage::{LocalStorage, PackStorage};
