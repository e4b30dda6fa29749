//! Feature Activation Service
//!
//! Tracks which features are live and activates/deactivates them in
//! dependency order. Single-feature activation does not roll back the
//! dependencies it already started; pack-level activation does.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Feature, FeatureRegistry};
use crate::common::{PackError, PackResult};
use crate::monitor::{EventBus, RuntimeEvent};

pub struct ActivationService {
    /// feature id → features it requires, in activation order
    dependencies: HashMap<String, Vec<String>>,
    /// Handles are kept so a feature can still be shut down after its
    /// registration is gone.
    active: HashMap<String, Arc<dyn Feature>>,
    /// Activation order of the ids in `active`
    order: Vec<String>,
    events: EventBus,
}

impl ActivationService {
    pub fn new(events: EventBus) -> Self {
        Self {
            dependencies: HashMap::new(),
            active: HashMap::new(),
            order: Vec::new(),
            events,
        }
    }

    pub fn set_feature_dependencies(&mut self, feature_id: &str, dependencies: Vec<String>) {
        debug!("Dependencies of {}: {:?}", feature_id, dependencies);
        self.dependencies.insert(feature_id.to_string(), dependencies);
    }

    pub fn dependencies_of(&self, feature_id: &str) -> &[String] {
        self.dependencies
            .get(feature_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Activate `feature_id`, activating its dependencies first
    pub fn activate(&mut self, registry: &FeatureRegistry, feature_id: &str) -> PackResult<()> {
        let mut chain = Vec::new();
        let result = self.activate_with_chain(registry, feature_id, &mut chain);
        if let Err(e) = &result {
            warn!("Activation of {} failed: {}", feature_id, e);
            self.events.emit(RuntimeEvent::ActivationError {
                feature_id: feature_id.to_string(),
                message: e.to_string(),
            });
        }
        result
    }

    fn activate_with_chain(
        &mut self,
        registry: &FeatureRegistry,
        feature_id: &str,
        chain: &mut Vec<String>,
    ) -> PackResult<()> {
        if self.is_active(feature_id) {
            return Ok(());
        }

        if let Some(start) = chain.iter().position(|id| id == feature_id) {
            let mut cycle = chain[start..].to_vec();
            cycle.push(feature_id.to_string());
            return Err(PackError::DependencyCycle(cycle));
        }

        let feature = registry
            .get(feature_id)
            .ok_or_else(|| PackError::FeatureNotFound(feature_id.to_string()))?;

        chain.push(feature_id.to_string());
        let dependencies = self.dependencies_of(feature_id).to_vec();
        for dependency in dependencies {
            self.activate_with_chain(registry, &dependency, chain)
                .map_err(|source| PackError::ActivationFailed {
                    feature_id: feature_id.to_string(),
                    dependency_id: dependency.clone(),
                    source: Box::new(source),
                })?;
        }
        chain.pop();

        feature
            .initialize()
            .map_err(|e| PackError::hook(feature_id, "initialize", e))?;

        self.active.insert(feature_id.to_string(), feature);
        self.order.push(feature_id.to_string());

        info!("Feature activated: {}", feature_id);
        self.events.emit(RuntimeEvent::FeatureActivated {
            feature_id: feature_id.to_string(),
        });
        Ok(())
    }

    /// Deactivate `feature_id` unless another active feature depends on it.
    ///
    /// A feature whose shutdown hook fails is still considered inactive; the
    /// hook error is returned after the state change.
    pub fn deactivate(&mut self, feature_id: &str) -> PackResult<()> {
        let Some(feature) = self.active.get(feature_id).cloned() else {
            return Ok(());
        };

        let dependents = self.active_dependents(feature_id);
        if !dependents.is_empty() {
            let err = PackError::FeatureInUse {
                feature_id: feature_id.to_string(),
                dependents,
            };
            debug!("{}", err);
            self.events.emit(RuntimeEvent::ActivationError {
                feature_id: feature_id.to_string(),
                message: err.to_string(),
            });
            return Err(err);
        }

        let hook_result = feature.shutdown();

        self.active.remove(feature_id);
        self.order.retain(|id| id != feature_id);
        info!("Feature deactivated: {}", feature_id);
        self.events.emit(RuntimeEvent::FeatureDeactivated {
            feature_id: feature_id.to_string(),
        });

        hook_result.map_err(|e| {
            let err = PackError::hook(feature_id, "shutdown", e);
            warn!("{}", err);
            self.events.emit(RuntimeEvent::ActivationError {
                feature_id: feature_id.to_string(),
                message: err.to_string(),
            });
            err
        })
    }

    /// Activate every feature the registry attributes to `pack_id`.
    ///
    /// All or nothing: on the first failure every feature of the pack is
    /// deactivated again before the error is returned.
    pub fn activate_pack_features(
        &mut self,
        registry: &FeatureRegistry,
        pack_id: &str,
    ) -> PackResult<()> {
        let features = registry.features_for_pack(pack_id);
        info!(
            "Activating {} features for pack {}",
            features.len(),
            pack_id
        );

        for feature in &features {
            if let Err(source) = self.activate(registry, feature.id()) {
                warn!(
                    "Rolling back pack {} after {} failed to activate",
                    pack_id,
                    feature.id()
                );
                self.deactivate_pack_features(registry, pack_id);
                return Err(PackError::PackActivationFailed {
                    pack_id: pack_id.to_string(),
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    /// Deactivate every active feature owned by `pack_id`, dependents first.
    ///
    /// Features held up by dependents from other packs are skipped. Returns
    /// the number of features deactivated.
    pub fn deactivate_pack_features(&mut self, registry: &FeatureRegistry, pack_id: &str) -> usize {
        let owned: HashSet<String> = registry
            .features_for_pack(pack_id)
            .iter()
            .map(|f| f.id().to_string())
            .collect();

        let targets: Vec<String> = self
            .order
            .iter()
            .rev()
            .filter(|id| owned.contains(*id))
            .cloned()
            .collect();

        let mut deactivated = 0;
        for feature_id in targets {
            match self.deactivate(&feature_id) {
                Ok(()) => deactivated += 1,
                Err(PackError::HookFailed { .. }) => deactivated += 1,
                Err(e) => warn!("Leaving {} active: {}", feature_id, e),
            }
        }
        deactivated
    }

    pub fn is_active(&self, feature_id: &str) -> bool {
        self.active.contains_key(feature_id)
    }

    /// Active feature ids in activation order
    pub fn active_features(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn active_count(&self) -> usize {
        self.order.len()
    }

    fn active_dependents(&self, feature_id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| id.as_str() != feature_id)
            .filter(|id| self.dependencies_of(id).iter().any(|dep| dep == feature_id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::testing::{entries, new_log, HookLog, TestFeature};
    use crate::monitor::drain_events;

    struct Fixture {
        registry: FeatureRegistry,
        service: ActivationService,
        log: HookLog,
    }

    impl Fixture {
        fn new() -> Self {
            let bus = EventBus::new();
            Self {
                registry: FeatureRegistry::new(bus.clone()),
                service: ActivationService::new(bus),
                log: new_log(),
            }
        }

        fn add(&mut self, feature: TestFeature, pack_id: &str) {
            let deps = feature.deps.clone();
            let id = feature.id.clone();
            self.registry.register(feature.arc(), pack_id).unwrap();
            if !deps.is_empty() {
                self.service.set_feature_dependencies(&id, deps);
            }
        }

        fn activate(&mut self, id: &str) -> PackResult<()> {
            self.service.activate(&self.registry, id)
        }
    }

    #[test]
    fn test_activate_dependencies_first() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log), "demo");
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");

        fx.activate("reports").unwrap();

        assert_eq!(entries(&log), vec!["init:core", "init:reports"]);
        assert_eq!(fx.service.active_features(), vec!["core", "reports"]);
    }

    #[test]
    fn test_activate_is_idempotent() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log), "demo");

        fx.activate("core").unwrap();
        fx.activate("core").unwrap();
        assert_eq!(entries(&log), vec!["init:core"]);
        assert_eq!(fx.service.active_count(), 1);
    }

    #[test]
    fn test_activate_unknown_feature() {
        let mut fx = Fixture::new();
        let err = fx.activate("ghost").unwrap_err();
        assert!(matches!(err, PackError::FeatureNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_failed_dependency_reports_which_and_keeps_earlier_ones() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("storage", &log), "demo");
        fx.add(TestFeature::new("core", &log).failing_init(), "demo");
        fx.add(
            TestFeature::new("reports", &log).depends_on(&["storage", "core"]),
            "demo",
        );

        let err = fx.activate("reports").unwrap_err();
        match err {
            PackError::ActivationFailed {
                feature_id,
                dependency_id,
                source,
            } => {
                assert_eq!(feature_id, "reports");
                assert_eq!(dependency_id, "core");
                assert!(matches!(*source, PackError::HookFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // No rollback at single-feature granularity
        assert!(fx.service.is_active("storage"));
        assert!(!fx.service.is_active("core"));
        assert!(!fx.service.is_active("reports"));
    }

    #[test]
    fn test_missing_dependency() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");

        let err = fx.activate("reports").unwrap_err();
        assert!(matches!(
            err,
            PackError::ActivationFailed { ref dependency_id, .. } if dependency_id == "core"
        ));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_dependency_cycle_detected() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("a", &log).depends_on(&["b"]), "demo");
        fx.add(TestFeature::new("b", &log).depends_on(&["c"]), "demo");
        fx.add(TestFeature::new("c", &log).depends_on(&["a"]), "demo");

        let mut err = fx.activate("a").unwrap_err();
        while let PackError::ActivationFailed { source, .. } = err {
            err = *source;
        }
        match err {
            PackError::DependencyCycle(cycle) => assert_eq!(cycle, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.service.active_count(), 0);
    }

    #[test]
    fn test_shared_dependency_is_not_a_cycle() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log), "demo");
        fx.add(TestFeature::new("storage", &log).depends_on(&["core"]), "demo");
        fx.add(
            TestFeature::new("reports", &log).depends_on(&["core", "storage"]),
            "demo",
        );

        fx.activate("reports").unwrap();
        assert_eq!(
            entries(&log),
            vec!["init:core", "init:storage", "init:reports"]
        );
    }

    #[test]
    fn test_deactivate_blocked_by_dependents() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log), "demo");
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");
        fx.activate("reports").unwrap();

        let err = fx.service.deactivate("core").unwrap_err();
        assert!(matches!(
            err,
            PackError::FeatureInUse { ref dependents, .. }
                if dependents == &vec!["reports".to_string()]
        ));
        assert!(fx.service.is_active("core"));

        fx.service.deactivate("reports").unwrap();
        fx.service.deactivate("core").unwrap();
        assert_eq!(fx.service.active_count(), 0);
        assert_eq!(
            entries(&log),
            vec!["init:core", "init:reports", "shutdown:reports", "shutdown:core"]
        );
    }

    #[test]
    fn test_deactivate_inactive_is_noop() {
        let mut fx = Fixture::new();
        fx.service.deactivate("core").unwrap();
    }

    #[test]
    fn test_failed_shutdown_still_deactivates() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log).failing_shutdown(), "demo");
        fx.activate("core").unwrap();

        let err = fx.service.deactivate("core").unwrap_err();
        assert!(matches!(err, PackError::HookFailed { hook: "shutdown", .. }));
        assert!(!fx.service.is_active("core"));
    }

    #[test]
    fn test_pack_activation_all_or_nothing() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("notes", &log), "demo");
        fx.add(TestFeature::new("core", &log).failing_init(), "demo");
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");

        let err = fx
            .service
            .activate_pack_features(&fx.registry, "demo")
            .unwrap_err();
        assert!(matches!(
            err,
            PackError::PackActivationFailed { ref pack_id, .. } if pack_id == "demo"
        ));

        assert_eq!(fx.service.active_count(), 0);
        assert_eq!(entries(&log), vec!["init:notes", "shutdown:notes"]);
    }

    #[test]
    fn test_pack_activation_success() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");
        fx.add(TestFeature::new("core", &log), "demo");
        fx.add(TestFeature::new("sync", &log), "cloud");

        fx.service
            .activate_pack_features(&fx.registry, "demo")
            .unwrap();
        assert_eq!(fx.service.active_features(), vec!["core", "reports"]);
        assert!(!fx.service.is_active("sync"));
    }

    #[test]
    fn test_pack_deactivation_skips_cross_pack_dependents() {
        let mut fx = Fixture::new();
        let log = fx.log.clone();
        fx.add(TestFeature::new("core", &log), "demo");
        fx.add(TestFeature::new("reports", &log).depends_on(&["core"]), "demo");
        fx.add(TestFeature::new("sync", &log).depends_on(&["core"]), "cloud");
        fx.service
            .activate_pack_features(&fx.registry, "demo")
            .unwrap();
        fx.activate("sync").unwrap();

        let deactivated = fx.service.deactivate_pack_features(&fx.registry, "demo");
        assert_eq!(deactivated, 1);
        assert!(!fx.service.is_active("reports"));
        assert!(fx.service.is_active("core"));
        assert!(fx.service.is_active("sync"));
    }

    #[test]
    fn test_events_emitted() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let log = new_log();
        let mut registry = FeatureRegistry::new(bus.clone());
        let mut service = ActivationService::new(bus);
        registry
            .register(TestFeature::new("core", &log).arc(), "demo")
            .unwrap();

        service.activate(&registry, "core").unwrap();
        service.activate(&registry, "ghost").unwrap_err();
        service.deactivate("core").unwrap();

        let events: Vec<RuntimeEvent> = drain_events(&mut rx)
            .into_iter()
            .filter(|e| !matches!(e, RuntimeEvent::FeatureRegistered { .. }))
            .collect();
        assert_eq!(
            events,
            vec![
                RuntimeEvent::FeatureActivated {
                    feature_id: "core".to_string()
                },
                RuntimeEvent::ActivationError {
                    feature_id: "ghost".to_string(),
                    message: "feature not found: ghost".to_string(),
                },
                RuntimeEvent::FeatureDeactivated {
                    feature_id: "core".to_string()
                },
            ]
        );
    }
}
