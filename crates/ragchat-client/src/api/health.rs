//! Health API.

use crate::client::RagClient;
use crate::error::{Error, Result, error_detail};
use crate::types::HealthResponse;

/// Health API client.
///
/// Note: the health endpoint does not require authentication.
pub struct HealthApi {
    client: RagClient,
}

impl HealthApi {
    pub(crate) fn new(client: RagClient) -> Self {
        Self { client }
    }

    /// Check server health.
    ///
    /// An unhealthy server answers 503 with the same body, which is still
    /// returned here so the failing dependency can be shown.
    pub async fn check(&self) -> Result<HealthResponse> {
        let inner = self.client.inner();
        let url = self.client.url("health")?;

        let response = inner.http.get(url).timeout(inner.timeout).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() || status.as_u16() == 503 {
            if let Ok(health) = serde_json::from_slice::<HealthResponse>(&body) {
                return Ok(health);
            }
        }

        Err(Error::Api {
            status: status.as_u16(),
            detail: error_detail(status.as_u16(), &body),
        })
    }

    /// Simple connectivity check - returns true if the server reports healthy.
    pub async fn is_healthy(&self) -> bool {
        self.check().await.map(|h| h.is_healthy()).unwrap_or(false)
    }
}
