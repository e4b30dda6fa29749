//! Pack Manager
//!
//! Runtime context that owns the feature registry and activation service,
//! discovers and imports packs on disk, loads/unloads pack instances, and
//! gates activation behind order verification.
//!
//! One manager is constructed at startup and handed to whatever needs it.
//! Registry and activation state only change through `&mut self`, so async
//! work (pack construction, license calls) hands control back to the caller's
//! task before anything is mutated.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{
    CancelToken, DiscoveredPack, ImportedPack, LoadStage, Pack, PackFactories, PackFactory,
    PackState,
};
use crate::common::{PackError, PackResult};
use crate::config::RuntimeConfig;
use crate::feature::{ActivationService, FeatureConflict, FeatureRegistry};
use crate::license::{HttpOrderVerifier, OrderVerifier};
use crate::manifest::{self, current_platform, PackManifest};
use crate::monitor::{EventBus, RuntimeEvent};
use crate::storage::{LocalStorage, PackStorage};

struct LoadedPack {
    instance: Box<dyn Pack>,
    manifest: PackManifest,
    loaded_at: DateTime<Utc>,
}

/// Snapshot of one loaded pack
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub features: Vec<String>,
    pub active_features: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

pub struct PackManager {
    storage: Arc<dyn PackStorage>,
    factories: PackFactories,
    verifier: Option<Arc<dyn OrderVerifier>>,
    registry: FeatureRegistry,
    activation: ActivationService,
    loaded: HashMap<String, LoadedPack>,
    states: HashMap<String, PackState>,
    events: EventBus,
}

impl PackManager {
    pub fn new(storage: Arc<dyn PackStorage>, factories: PackFactories, events: EventBus) -> Self {
        Self {
            storage,
            factories,
            verifier: None,
            registry: FeatureRegistry::new(events.clone()),
            activation: ActivationService::new(events.clone()),
            loaded: HashMap::new(),
            states: HashMap::new(),
            events,
        }
    }

    /// Build a manager from the runtime config: local packs root, HTTP
    /// verifier when an endpoint is configured, and the override policy.
    pub fn from_config(config: &RuntimeConfig, factories: PackFactories) -> PackResult<Self> {
        let storage = Arc::new(LocalStorage::new(config.packs_root()?));
        let mut manager = Self::new(storage, factories, EventBus::new());

        if let Some(endpoint) = &config.license_endpoint {
            let verifier = HttpOrderVerifier::new(endpoint, config.license_timeout_secs)?;
            manager = manager.with_verifier(Arc::new(verifier));
        }

        if config.allow_feature_override {
            manager.on_feature_conflict(|conflict| conflict.allow_override = true);
        }

        Ok(manager)
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn OrderVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn activation(&self) -> &ActivationService {
        &self.activation
    }

    pub fn factories(&self) -> &PackFactories {
        &self.factories
    }

    pub fn packs_root(&self) -> &Path {
        self.storage.packs_root()
    }

    /// Add a handler that decides feature id collisions
    pub fn on_feature_conflict<F>(&mut self, handler: F)
    where
        F: Fn(&mut FeatureConflict) + Send + Sync + 'static,
    {
        self.registry.on_conflict(handler);
    }

    // ------------------------------------------------------------------
    // Discovery and import
    // ------------------------------------------------------------------

    /// List pack directories under the packs root, creating the root if
    /// needed. Discovery never loads anything.
    pub fn discover_packs(&mut self) -> PackResult<Vec<DiscoveredPack>> {
        let root = self.storage.packs_root().to_path_buf();
        if !self.storage.dir_exists(&root) {
            info!("Creating packs root {:?}", root);
            if let Err(e) = self.storage.create_dir(&root) {
                return Err(self.report("", PackError::io(&root, e)));
            }
        }

        let dirs = match self.storage.list_subdirs(&root) {
            Ok(dirs) => dirs,
            Err(e) => return Err(self.report("", PackError::io(&root, e))),
        };

        let mut discovered = Vec::new();
        for path in dirs {
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }

            let manifest = match manifest::load_manifest_dir(&path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("Ignoring manifest of pack directory {:?}: {}", path, e);
                    None
                }
            };
            if let Some(m) = &manifest {
                if m.id != id {
                    warn!("Pack directory {} declares manifest id {}", id, m.id);
                }
            }

            info!("Discovered pack candidate: {}", id);
            if !self.is_loaded(&id) {
                self.states.insert(id.clone(), PackState::Discovered);
            }
            discovered.push(DiscoveredPack { id, path, manifest });
        }

        Ok(discovered)
    }

    /// Extract a pack archive into `<packs root>/<manifest id>`, replacing any
    /// previous copy. The pack is not loaded.
    pub fn import_pack(&mut self, archive_path: &Path) -> PackResult<ImportedPack> {
        self.import_archive(archive_path).map_err(|e| {
            let label = archive_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.report(&label, e)
        })
    }

    fn import_archive(&mut self, archive_path: &Path) -> PackResult<ImportedPack> {
        if !self.storage.file_exists(archive_path) {
            return Err(PackError::ArchiveNotFound(archive_path.to_path_buf()));
        }

        let bytes = self
            .storage
            .read_file(archive_path)
            .map_err(|e| PackError::io(archive_path, e))?;
        let manifest =
            manifest::read_archive_manifest(&bytes, &archive_path.display().to_string())?;
        if !manifest.has_storable_id() {
            return Err(PackError::ManifestInvalid(format!(
                "pack id {:?} cannot be used as a directory name",
                manifest.id
            )));
        }

        // Extract beside the pack first so a bad archive leaves the installed
        // copy untouched. Discovery skips dot-prefixed directories.
        let root = self.storage.packs_root().to_path_buf();
        let staging = root.join(format!(".{}.import", manifest.id));
        if self.storage.dir_exists(&staging) {
            self.storage
                .remove_dir(&staging)
                .map_err(|e| PackError::io(&staging, e))?;
        }
        self.storage
            .create_dir(&staging)
            .map_err(|e| PackError::io(&staging, e))?;
        if let Err(e) = manifest::extract_archive(&bytes, &staging) {
            if let Err(cleanup) = self.storage.remove_dir(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }

        let dest = root.join(&manifest.id);
        if self.storage.dir_exists(&dest) {
            if self.is_loaded(&manifest.id) {
                warn!("Replacing files of loaded pack {}", manifest.id);
            }
            self.storage
                .remove_dir(&dest)
                .map_err(|e| PackError::io(&dest, e))?;
        }
        self.storage
            .rename_dir(&staging, &dest)
            .map_err(|e| PackError::io(&dest, e))?;

        info!(
            "Imported pack {} ({}) into {:?}",
            manifest.label(),
            manifest.id,
            dest
        );
        if !self.is_loaded(&manifest.id) {
            self.states.insert(manifest.id.clone(), PackState::Discovered);
        }

        Ok(ImportedPack {
            id: manifest.id.clone(),
            path: dest,
            manifest,
        })
    }

    // ------------------------------------------------------------------
    // Load / unload
    // ------------------------------------------------------------------

    /// Load `pack_id` and register its features. Loading a loaded pack is a
    /// no-op.
    ///
    /// Features refused by the registry (conflicts, empty ids) are skipped;
    /// registrations made before a later failure are not undone.
    pub fn load_pack(&mut self, pack_id: &str) -> PackResult<()> {
        if self.is_loaded(pack_id) {
            debug!("Pack {} already loaded", pack_id);
            return Ok(());
        }

        let prepared = self
            .factory_for(pack_id)
            .and_then(|factory| instantiate(pack_id, factory));
        match prepared {
            Ok((instance, manifest)) => {
                self.install(pack_id, instance, manifest);
                Ok(())
            }
            Err(e) => Err(self.report(pack_id, e)),
        }
    }

    /// Same contract as [`load_pack`](Self::load_pack), with pack construction
    /// and `initialize` running on the blocking pool.
    ///
    /// `cancel` is only honoured before feature registration starts.
    pub async fn load_pack_async<P>(
        &mut self,
        pack_id: &str,
        mut progress: P,
        cancel: Option<&CancelToken>,
    ) -> PackResult<()>
    where
        P: FnMut(LoadStage) + Send,
    {
        progress(LoadStage::Checking);
        if self.is_loaded(pack_id) {
            debug!("Pack {} already loaded", pack_id);
            progress(LoadStage::Done);
            return Ok(());
        }

        progress(LoadStage::Initializing);
        let factory = match self.factory_for(pack_id) {
            Ok(factory) => factory,
            Err(e) => return Err(self.report(pack_id, e)),
        };
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(self.report(pack_id, cancelled(pack_id)));
        }

        progress(LoadStage::Instantiating);
        let owned_id = pack_id.to_string();
        let prepared = tokio::task::spawn_blocking(move || instantiate(&owned_id, factory))
            .await
            .map_err(|e| PackError::Internal(format!("pack loader task failed: {}", e)))
            .and_then(|result| result);
        let (mut instance, manifest) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.report(pack_id, e)),
        };

        if cancel.is_some_and(CancelToken::is_cancelled) {
            shutdown_quietly(pack_id, instance.as_mut());
            return Err(self.report(pack_id, cancelled(pack_id)));
        }

        progress(LoadStage::LoadingFeatures);
        self.install(pack_id, instance, manifest);
        progress(LoadStage::Done);
        Ok(())
    }

    /// Deactivate, unregister and shut down a loaded pack. No-op if the pack
    /// is not loaded.
    ///
    /// The pack is unloaded even when its shutdown hook fails; that failure
    /// is reported and returned afterwards. Features kept alive by active
    /// dependents in other packs stay active.
    pub fn unload_pack(&mut self, pack_id: &str) -> PackResult<()> {
        let Some(mut pack) = self.loaded.remove(pack_id) else {
            debug!("Pack {} is not loaded", pack_id);
            return Ok(());
        };

        let deactivated = self
            .activation
            .deactivate_pack_features(&self.registry, pack_id);
        for feature in self.registry.features_for_pack(pack_id) {
            if self.activation.is_active(feature.id()) {
                warn!(
                    "Feature {} of pack {} stays active for its dependents",
                    feature.id(),
                    pack_id
                );
            }
        }
        let removed = self.registry.unregister_pack_features(pack_id);
        let shutdown = pack.instance.shutdown();

        self.states.insert(pack_id.to_string(), PackState::Unloaded);
        info!(
            "Unloaded pack {} ({} features deactivated, {} unregistered)",
            pack_id, deactivated, removed
        );
        self.events.emit(RuntimeEvent::PackUnloaded {
            pack_id: pack_id.to_string(),
        });

        shutdown.map_err(|e| self.report(pack_id, PackError::hook(pack_id, "shutdown", e)))
    }

    fn factory_for(&self, pack_id: &str) -> PackResult<PackFactory> {
        self.factories
            .get(pack_id)
            .ok_or_else(|| PackError::PackNotSupported(pack_id.to_string()))
    }

    /// Register features and record the pack as loaded
    fn install(&mut self, pack_id: &str, instance: Box<dyn Pack>, manifest: PackManifest) {
        for dependency in &manifest.dependencies {
            if !self.is_loaded(dependency) {
                warn!("Pack {} expects pack {} to be loaded", pack_id, dependency);
            }
        }

        let mut registered = 0;
        for feature in instance.features() {
            let feature_id = feature.id().to_string();
            let dependencies = feature.dependencies();
            // An overridden feature that is still active is shut down under its
            // old owner first; active dependents keep the old owner in place.
            let activation = &mut self.activation;
            let result = self.registry.register_with(feature, pack_id, |conflict| {
                match activation.deactivate(&conflict.feature_id) {
                    Ok(()) | Err(PackError::HookFailed { .. }) => Ok(()),
                    Err(e) => Err(e),
                }
            });
            match result {
                Ok(()) => {
                    registered += 1;
                    self.activation
                        .set_feature_dependencies(&feature_id, dependencies);
                }
                Err(e) => warn!("Skipping feature {:?} of pack {}: {}", feature_id, pack_id, e),
            }
        }

        info!(
            "Loaded pack {} v{} with {} features",
            manifest.label(),
            manifest.version,
            registered
        );
        self.loaded.insert(
            pack_id.to_string(),
            LoadedPack {
                instance,
                manifest,
                loaded_at: Utc::now(),
            },
        );
        self.states.insert(pack_id.to_string(), PackState::Loaded);
        self.events.emit(RuntimeEvent::PackLoaded {
            pack_id: pack_id.to_string(),
            feature_count: registered,
        });
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    pub fn activate_feature(&mut self, feature_id: &str) -> PackResult<()> {
        self.activation.activate(&self.registry, feature_id)
    }

    pub fn deactivate_feature(&mut self, feature_id: &str) -> PackResult<()> {
        self.activation.deactivate(feature_id)
    }

    pub fn set_feature_dependencies(&mut self, feature_id: &str, dependencies: Vec<String>) {
        self.activation
            .set_feature_dependencies(feature_id, dependencies);
    }

    /// Activate all features of a pack, rolling the pack back on failure
    pub fn activate_pack_features(&mut self, pack_id: &str) -> PackResult<()> {
        self.activation
            .activate_pack_features(&self.registry, pack_id)
            .map_err(|e| self.report(pack_id, e))
    }

    pub fn deactivate_pack_features(&mut self, pack_id: &str) -> usize {
        self.activation
            .deactivate_pack_features(&self.registry, pack_id)
    }

    // ------------------------------------------------------------------
    // Licensing
    // ------------------------------------------------------------------

    /// Verify an order and, when valid, load and activate the licensed pack.
    /// Returns the pack id.
    ///
    /// Rejected orders never load or unload anything.
    pub async fn verify_and_activate_pack(&mut self, order_number: &str) -> PackResult<String> {
        let verifier = self.verifier()?;

        info!("Verifying order {}", order_number);
        let validation = verifier.validate_order(order_number).await.map_err(|e| {
            warn!("Order verification for {} failed: {}", order_number, e);
            e
        })?;

        if !validation.is_valid {
            let message = validation
                .error_message
                .unwrap_or_else(|| "Order is not valid".to_string());
            warn!("Order {} rejected: {}", order_number, message);
            if validation.trial_available {
                info!("A trial is available for order {}", order_number);
            }
            self.events.emit(RuntimeEvent::LicenseRejected {
                order_number: order_number.to_string(),
                message: message.clone(),
                trial_available: validation.trial_available,
            });
            return Err(PackError::LicenseInvalid {
                message,
                trial_available: validation.trial_available,
            });
        }

        let pack_id = validation
            .license
            .map(|license| license.pack_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PackError::LicenseInvalid {
                message: "license does not name a pack".to_string(),
                trial_available: false,
            })?;

        if !self.is_loaded(&pack_id) {
            self.load_pack_async(&pack_id, |_| {}, None).await?;
        }
        self.activate_pack_features(&pack_id)?;

        info!("Order {} activated pack {}", order_number, pack_id);
        Ok(pack_id)
    }

    pub async fn is_pack_licensed(&self, pack_id: &str) -> PackResult<bool> {
        self.verifier()?.is_pack_licensed(pack_id).await
    }

    fn verifier(&self) -> PackResult<Arc<dyn OrderVerifier>> {
        self.verifier.clone().ok_or_else(|| {
            PackError::LicenseServiceUnavailable(
                "no order verification service configured".to_string(),
            )
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_loaded(&self, pack_id: &str) -> bool {
        self.loaded.contains_key(pack_id)
    }

    pub fn loaded_packs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pack_state(&self, pack_id: &str) -> Option<PackState> {
        self.states.get(pack_id).copied()
    }

    pub fn manifest_of(&self, pack_id: &str) -> Option<&PackManifest> {
        self.loaded.get(pack_id).map(|pack| &pack.manifest)
    }

    pub fn summaries(&self) -> Vec<PackSummary> {
        self.loaded_packs()
            .into_iter()
            .filter_map(|id| {
                let pack = self.loaded.get(&id)?;
                let features: Vec<String> = self
                    .registry
                    .features_for_pack(&id)
                    .iter()
                    .map(|f| f.id().to_string())
                    .collect();
                let active_features = features
                    .iter()
                    .filter(|f| self.activation.is_active(f))
                    .cloned()
                    .collect();
                Some(PackSummary {
                    name: pack.manifest.label().to_string(),
                    version: pack.manifest.version.clone(),
                    features,
                    active_features,
                    loaded_at: pack.loaded_at,
                    id,
                })
            })
            .collect()
    }

    /// Log and broadcast a failure, handing the error back to the caller
    fn report(&self, pack_id: &str, err: PackError) -> PackError {
        error!("Pack {}: {}", pack_id, err);
        self.events.emit(RuntimeEvent::PackError {
            pack_id: pack_id.to_string(),
            message: err.to_string(),
        });
        err
    }
}

/// Construct and initialize a pack, then read and check its manifest
fn instantiate(pack_id: &str, factory: PackFactory) -> PackResult<(Box<dyn Pack>, PackManifest)> {
    let mut instance = factory();
    instance
        .initialize()
        .map_err(|e| PackError::hook(pack_id, "initialize", e))?;

    let manifest = instance.manifest();
    if let Err(e) = check_manifest(pack_id, &manifest) {
        shutdown_quietly(pack_id, instance.as_mut());
        return Err(e);
    }
    Ok((instance, manifest))
}

fn check_manifest(pack_id: &str, manifest: &PackManifest) -> PackResult<()> {
    manifest.validate()?;
    if manifest.id != pack_id {
        warn!("Pack {} reports manifest id {}", pack_id, manifest.id);
    }

    let platform = current_platform();
    if !manifest.supports_platform(platform) {
        return Err(PackError::PlatformUnsupported {
            pack_id: pack_id.to_string(),
            platform: platform.to_string(),
        });
    }
    Ok(())
}

fn shutdown_quietly(pack_id: &str, instance: &mut dyn Pack) {
    if let Err(e) = instance.shutdown() {
        warn!("Shutdown of discarded pack {} failed: {:#}", pack_id, e);
    }
}

fn cancelled(pack_id: &str) -> PackError {
    PackError::Cancelled(format!("loading pack {}", pack_id))
}
