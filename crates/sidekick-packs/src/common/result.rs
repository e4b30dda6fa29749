//! Common Result Type

use super::error::PackError;

/// Runtime result type
pub type PackResult<T> = Result<T, PackError>;
