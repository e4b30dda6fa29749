//! Feature Registry
//!
//! Maps feature ids to implementations and to the pack that owns them, and
//! arbitrates id collisions between packs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::Feature;
use crate::common::{PackError, PackResult};
use crate::monitor::{EventBus, RuntimeEvent};

/// Collision between an existing registration and a new one.
///
/// Conflict handlers may flip `allow_override` to let the new pack take the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureConflict {
    pub feature_id: String,
    pub existing_pack_id: String,
    pub new_pack_id: String,
    pub allow_override: bool,
}

type ConflictHandler = Box<dyn Fn(&mut FeatureConflict) + Send + Sync>;

struct RegisteredFeature {
    feature: Arc<dyn Feature>,
    pack_id: String,
    seq: u64,
}

/// Feature id → (implementation, owning pack)
pub struct FeatureRegistry {
    entries: HashMap<String, RegisteredFeature>,
    next_seq: u64,
    conflict_handlers: Vec<ConflictHandler>,
    events: EventBus,
}

impl FeatureRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
            conflict_handlers: Vec::new(),
            events,
        }
    }

    /// Add a conflict handler. Handlers run in insertion order before the
    /// conflicting registration returns.
    pub fn on_conflict<F>(&mut self, handler: F)
    where
        F: Fn(&mut FeatureConflict) + Send + Sync + 'static,
    {
        self.conflict_handlers.push(Box::new(handler));
    }

    /// Register `feature` as owned by `pack_id`.
    ///
    /// A taken id is only handed over when a conflict handler allows it;
    /// otherwise the existing owner is kept and `FeatureConflict` is returned.
    pub fn register(&mut self, feature: Arc<dyn Feature>, pack_id: &str) -> PackResult<()> {
        self.register_with(feature, pack_id, |_| Ok(()))
    }

    /// [`register`](Self::register) with a `release` step that runs after an
    /// override is allowed and before the previous owner loses the id. An
    /// error from `release` refuses the override and keeps the existing owner.
    pub fn register_with<R>(
        &mut self,
        feature: Arc<dyn Feature>,
        pack_id: &str,
        release: R,
    ) -> PackResult<()>
    where
        R: FnOnce(&FeatureConflict) -> PackResult<()>,
    {
        let feature_id = feature.id().to_string();
        if feature_id.is_empty() {
            warn!("Rejected feature with empty id from pack {}", pack_id);
            return Err(PackError::InvalidFeatureId);
        }

        if let Some(existing) = self.entries.get(&feature_id) {
            let mut conflict = FeatureConflict {
                feature_id: feature_id.clone(),
                existing_pack_id: existing.pack_id.clone(),
                new_pack_id: pack_id.to_string(),
                allow_override: false,
            };
            for handler in &self.conflict_handlers {
                handler(&mut conflict);
            }

            self.events.emit(RuntimeEvent::FeatureConflict {
                feature_id: conflict.feature_id.clone(),
                existing_pack_id: conflict.existing_pack_id.clone(),
                new_pack_id: conflict.new_pack_id.clone(),
                allow_override: conflict.allow_override,
            });

            if !conflict.allow_override {
                warn!(
                    "Feature {} already owned by {}, rejected registration from {}",
                    feature_id, conflict.existing_pack_id, pack_id
                );
                return Err(PackError::FeatureConflict {
                    feature_id,
                    existing_pack_id: conflict.existing_pack_id,
                    new_pack_id: conflict.new_pack_id,
                });
            }

            if let Err(e) = release(&conflict) {
                warn!(
                    "Feature {} stays with {}, override by {} refused: {}",
                    feature_id, conflict.existing_pack_id, pack_id, e
                );
                return Err(e);
            }

            info!(
                "Feature {} overridden: {} -> {}",
                feature_id, conflict.existing_pack_id, pack_id
            );
            self.unregister(&feature_id);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            feature_id.clone(),
            RegisteredFeature {
                feature,
                pack_id: pack_id.to_string(),
                seq,
            },
        );

        debug!("Registered feature {} for pack {}", feature_id, pack_id);
        self.events.emit(RuntimeEvent::FeatureRegistered {
            feature_id,
            pack_id: pack_id.to_string(),
        });
        Ok(())
    }

    /// Remove a registration; `false` if the id was not registered
    pub fn unregister(&mut self, feature_id: &str) -> bool {
        let Some(entry) = self.entries.remove(feature_id) else {
            return false;
        };

        debug!("Unregistered feature {} (pack {})", feature_id, entry.pack_id);
        self.events.emit(RuntimeEvent::FeatureUnregistered {
            feature_id: feature_id.to_string(),
            pack_id: entry.pack_id,
        });
        true
    }

    /// Remove every feature owned by `pack_id`, returning how many were removed
    pub fn unregister_pack_features(&mut self, pack_id: &str) -> usize {
        let ids: Vec<String> = self
            .features_for_pack(pack_id)
            .iter()
            .map(|f| f.id().to_string())
            .collect();

        ids.iter().filter(|id| self.unregister(id)).count()
    }

    pub fn get(&self, feature_id: &str) -> Option<Arc<dyn Feature>> {
        self.entries
            .get(feature_id)
            .map(|entry| Arc::clone(&entry.feature))
    }

    /// All features in registration order
    pub fn list(&self) -> Vec<Arc<dyn Feature>> {
        self.sorted(|_| true)
    }

    /// Features owned by `pack_id` in registration order
    pub fn features_for_pack(&self, pack_id: &str) -> Vec<Arc<dyn Feature>> {
        self.sorted(|entry| entry.pack_id == pack_id)
    }

    pub fn is_registered(&self, feature_id: &str) -> bool {
        self.entries.contains_key(feature_id)
    }

    pub fn owner_of(&self, feature_id: &str) -> Option<&str> {
        self.entries
            .get(feature_id)
            .map(|entry| entry.pack_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sorted(&self, keep: impl Fn(&RegisteredFeature) -> bool) -> Vec<Arc<dyn Feature>> {
        let mut matching: Vec<&RegisteredFeature> =
            self.entries.values().filter(|entry| keep(entry)).collect();
        matching.sort_by_key(|entry| entry.seq);
        matching
            .into_iter()
            .map(|entry| Arc::clone(&entry.feature))
            .collect()
    }
}
