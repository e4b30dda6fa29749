//! Common Error Types
//!
//! Unified runtime error with stable machine-readable codes.

use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes surfaced to the UI and CLI layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Manifest / archive errors
    ManifestMissing,
    ManifestInvalid,
    ArchiveNotFound,
    ArchiveCorrupt,

    // Pack lifecycle errors
    PackNotSupported,
    PlatformUnsupported,
    PackActivationFailed,

    // Feature errors
    FeatureNotFound,
    FeatureConflict,
    FeatureInUse,
    InvalidFeatureId,
    ActivationFailed,
    DependencyCycle,
    HookFailed,

    // License errors
    LicenseInvalid,
    LicenseServiceUnavailable,

    // Generic
    Io,
    Config,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ManifestMissing => "manifest_missing",
            ErrorCode::ManifestInvalid => "manifest_invalid",
            ErrorCode::ArchiveNotFound => "archive_not_found",
            ErrorCode::ArchiveCorrupt => "archive_corrupt",
            ErrorCode::PackNotSupported => "pack_not_supported",
            ErrorCode::PlatformUnsupported => "platform_unsupported",
            ErrorCode::PackActivationFailed => "pack_activation_failed",
            ErrorCode::FeatureNotFound => "feature_not_found",
            ErrorCode::FeatureConflict => "feature_conflict",
            ErrorCode::FeatureInUse => "feature_in_use",
            ErrorCode::InvalidFeatureId => "invalid_feature_id",
            ErrorCode::ActivationFailed => "activation_failed",
            ErrorCode::DependencyCycle => "dependency_cycle",
            ErrorCode::HookFailed => "hook_failed",
            ErrorCode::LicenseInvalid => "license_invalid",
            ErrorCode::LicenseServiceUnavailable => "license_service_unavailable",
            ErrorCode::Io => "io",
            ErrorCode::Config => "config",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Pack runtime error
#[derive(Debug, Error)]
pub enum PackError {
    #[error("no manifest.json entry found in {0}")]
    ManifestMissing(String),

    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("pack archive not found: {0:?}")]
    ArchiveNotFound(PathBuf),

    #[error("failed to read pack archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("pack not supported: {0}")]
    PackNotSupported(String),

    #[error("pack {pack_id} does not support platform {platform}")]
    PlatformUnsupported { pack_id: String, platform: String },

    #[error("failed to activate pack {pack_id}: {source}")]
    PackActivationFailed {
        pack_id: String,
        #[source]
        source: Box<PackError>,
    },

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("feature {feature_id} is already owned by pack {existing_pack_id} (requested by {new_pack_id})")]
    FeatureConflict {
        feature_id: String,
        existing_pack_id: String,
        new_pack_id: String,
    },

    #[error("feature {feature_id} is required by active features: {}", dependents.join(", "))]
    FeatureInUse {
        feature_id: String,
        dependents: Vec<String>,
    },

    #[error("feature id must not be empty")]
    InvalidFeatureId,

    #[error("cannot activate {feature_id}: dependency {dependency_id} failed: {source}")]
    ActivationFailed {
        feature_id: String,
        dependency_id: String,
        #[source]
        source: Box<PackError>,
    },

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("{hook} hook of {owner} failed: {message}")]
    HookFailed {
        owner: String,
        hook: &'static str,
        message: String,
    },

    #[error("order verification failed: {message}")]
    LicenseInvalid {
        message: String,
        trial_available: bool,
    },

    #[error("license service unavailable: {0}")]
    LicenseServiceUnavailable(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PackError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PackError::ManifestMissing(_) => ErrorCode::ManifestMissing,
            PackError::ManifestInvalid(_) => ErrorCode::ManifestInvalid,
            PackError::ArchiveNotFound(_) => ErrorCode::ArchiveNotFound,
            PackError::Archive(_) => ErrorCode::ArchiveCorrupt,
            PackError::PackNotSupported(_) => ErrorCode::PackNotSupported,
            PackError::PlatformUnsupported { .. } => ErrorCode::PlatformUnsupported,
            PackError::PackActivationFailed { .. } => ErrorCode::PackActivationFailed,
            PackError::FeatureNotFound(_) => ErrorCode::FeatureNotFound,
            PackError::FeatureConflict { .. } => ErrorCode::FeatureConflict,
            PackError::FeatureInUse { .. } => ErrorCode::FeatureInUse,
            PackError::InvalidFeatureId => ErrorCode::InvalidFeatureId,
            PackError::ActivationFailed { .. } => ErrorCode::ActivationFailed,
            PackError::DependencyCycle(_) => ErrorCode::DependencyCycle,
            PackError::HookFailed { .. } => ErrorCode::HookFailed,
            PackError::LicenseInvalid { .. } => ErrorCode::LicenseInvalid,
            PackError::LicenseServiceUnavailable(_) => ErrorCode::LicenseServiceUnavailable,
            PackError::Io { .. } => ErrorCode::Io,
            PackError::Config(_) => ErrorCode::Config,
            PackError::Cancelled(_) => ErrorCode::Cancelled,
            PackError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Wrap an I/O error with the path it happened at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failed lifecycle hook
    pub fn hook(owner: &str, hook: &'static str, err: anyhow::Error) -> Self {
        PackError::HookFailed {
            owner: owner.to_string(),
            hook,
            message: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            PackError::ManifestMissing("a.zip".into()).code().as_str(),
            "manifest_missing"
        );
        assert_eq!(
            PackError::DependencyCycle(vec!["a".into(), "a".into()])
                .code()
                .as_str(),
            "dependency_cycle"
        );
    }

    #[test]
    fn test_in_use_message_lists_dependents() {
        let err = PackError::FeatureInUse {
            feature_id: "core".into(),
            dependents: vec!["reports".into(), "export".into()],
        };
        assert_eq!(
            err.to_string(),
            "feature core is required by active features: reports, export"
        );
    }

    #[test]
    fn test_hook_error_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("writing cache");
        let wrapped = PackError::hook("core", "initialize", err);
        assert_eq!(
            wrapped.to_string(),
            "initialize hook of core failed: writing cache: disk full"
        );
    }
}
