//! Features
//!
//! A feature is a uniquely identified capability contributed by a pack. Which
//! pack owns a feature is tracked by the [`FeatureRegistry`], and whether it is
//! live is tracked by the [`ActivationService`].

pub mod activation;
pub mod registry;

pub use activation::ActivationService;
pub use registry::{FeatureConflict, FeatureRegistry};

/// Feature implementation contract.
///
/// Ids are global across the whole runtime, not just within one pack.
pub trait Feature: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Features that must be active before this one, in activation order.
    /// They may belong to other packs.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn initialize(&self) -> anyhow::Result<()>;

    fn shutdown(&self) -> anyhow::Result<()>;
}
