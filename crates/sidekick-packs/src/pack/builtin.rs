//! Packs compiled into the app

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{Pack, PackFactories};
use crate::feature::Feature;
use crate::manifest::PackManifest;

pub const DEMO_PACK_ID: &str = "demo";

pub fn register_builtin(factories: &mut PackFactories) {
    factories.register(DEMO_PACK_ID, || Box::new(DemoPack::new()));
}

struct BuiltinFeature {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    dependencies: &'static [&'static str],
    running: AtomicBool,
}

impl BuiltinFeature {
    const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        dependencies: &'static [&'static str],
    ) -> Self {
        Self {
            id,
            name,
            description,
            dependencies,
            running: AtomicBool::new(false),
        }
    }
}

impl Feature for BuiltinFeature {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| d.to_string()).collect()
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        debug!("{} started", self.id);
        Ok(())
    }

    fn shutdown(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        debug!("{} stopped", self.id);
        Ok(())
    }
}

/// Sample pack: task `core` plus `reports` built on top of it
pub struct DemoPack {
    features: Vec<Arc<dyn Feature>>,
}

impl DemoPack {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }
}

impl Default for DemoPack {
    fn default() -> Self {
        Self::new()
    }
}

impl Pack for DemoPack {
    fn initialize(&mut self) -> anyhow::Result<()> {
        self.features = vec![
            Arc::new(BuiltinFeature::new(
                "core",
                "Task Core",
                "Task capture and scheduling",
                &[],
            )),
            Arc::new(BuiltinFeature::new(
                "reports",
                "Weekly Reports",
                "Summaries of completed tasks",
                &["core"],
            )),
        ];
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.features.clear();
        Ok(())
    }

    fn manifest(&self) -> PackManifest {
        PackManifest {
            id: DEMO_PACK_ID.to_string(),
            name: "Demo Pack".to_string(),
            description: "Sample features shipped with Sidekick".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            author: "Sidekick".to_string(),
            supported_platforms: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    fn features(&self) -> Vec<Arc<dyn Feature>> {
        self.features.clone()
    }
}
