//! Order and license verification
//!
//! The runtime consumes verification results; it never stores them.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::PackResult;

pub use http::HttpOrderVerifier;

/// License granted by a valid order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub pack_id: String,
}

/// Result of validating an order number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub trial_available: bool,
}

impl OrderValidation {
    pub fn valid(pack_id: &str) -> Self {
        Self {
            is_valid: true,
            license: Some(License {
                pack_id: pack_id.to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn invalid(message: &str, trial_available: bool) -> Self {
        Self {
            is_valid: false,
            license: None,
            error_message: Some(message.to_string()),
            trial_available,
        }
    }
}

/// Order/license verification service.
///
/// Transport failures are `LicenseServiceUnavailable`; a rejected order is an
/// `Ok` result with `is_valid == false`.
#[async_trait]
pub trait OrderVerifier: Send + Sync {
    async fn validate_order(&self, order_number: &str) -> PackResult<OrderValidation>;

    async fn is_pack_licensed(&self, pack_id: &str) -> PackResult<bool>;
}
