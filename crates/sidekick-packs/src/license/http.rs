//! HTTP order verification client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{OrderValidation, OrderVerifier};
use crate::common::{create_http_client, PackError, PackResult};

#[derive(Debug, Deserialize)]
struct LicenseStatus {
    licensed: bool,
}

/// [`OrderVerifier`] talking to the license server over HTTPS
pub struct HttpOrderVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderVerifier {
    pub fn new(base_url: &str, timeout_secs: u64) -> PackResult<Self> {
        Ok(Self {
            client: create_http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> PackResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(PackError::LicenseServiceUnavailable(format!(
                "license server returned {}",
                status
            )));
        }
        response.json::<T>().await.map_err(|e| {
            PackError::LicenseServiceUnavailable(format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl OrderVerifier for HttpOrderVerifier {
    async fn validate_order(&self, order_number: &str) -> PackResult<OrderValidation> {
        let url = self.url("orders/validate");
        debug!("Validating order {} at {}", order_number, url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "orderNumber": order_number }))
            .send()
            .await
            .map_err(|e| PackError::LicenseServiceUnavailable(e.to_string()))?;

        let validation: OrderValidation = Self::read_json(response).await?;
        info!(
            "Order {} validated: valid={}, trial={}",
            order_number, validation.is_valid, validation.trial_available
        );
        Ok(validation)
    }

    async fn is_pack_licensed(&self, pack_id: &str) -> PackResult<bool> {
        let url = self.url(&format!("packs/{}/license", pack_id));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PackError::LicenseServiceUnavailable(e.to_string()))?;

        let status: LicenseStatus = Self::read_json(response).await?;
        Ok(status.licensed)
    }
}
