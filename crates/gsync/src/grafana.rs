use std::time::Duration;

use async_trait::async_trait;
use gsync_core::{CreateDashboardRequest, DashboardApi, DashboardEnvelope, FetchOutcome, WatchError};
use reqwest::Client as HttpClient;
use tracing::{debug, instrument};

/// Request timeout for every Grafana call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Grafana HTTP API client.
///
/// Authenticates with a bearer token and selects the tenant through the
/// `X-Grafana-Org-Id` header.
pub struct GrafanaClient {
    http_client: HttpClient,
    url: String,
    tenant_id: String,
    api_token: String,
}

impl GrafanaClient {
    /// Create a new Grafana client.
    pub fn new(url: String, tenant_id: String, api_token: String) -> Result<Self, WatchError> {
        let http_client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WatchError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: url.trim_end_matches('/').to_string(),
            tenant_id,
            api_token,
        })
    }

    fn dashboard_uid_url(&self, uid: &str) -> String {
        format!("{}/api/dashboards/uid/{}", self.url, uid)
    }

    /// Attach the authentication and content headers.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .header("X-Grafana-Org-Id", &self.tenant_id)
    }
}

#[async_trait]
impl DashboardApi for GrafanaClient {
    fn base_url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self, request), level = "debug", fields(uid = ?request.dashboard.get("uid")))]
    async fn create_dashboard(&self, request: &CreateDashboardRequest) -> Result<(), WatchError> {
        let url = format!("{}/api/dashboards/db", self.url);

        let response = self
            .authorize(self.http_client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| WatchError::Internal(format!("Dashboard create request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(WatchError::Internal(format!(
                "Dashboard create failed with status {}: {}",
                status, text
            )));
        }

        debug!("Created dashboard");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_dashboard(&self, uid: &str) -> Result<FetchOutcome, WatchError> {
        let url = self.dashboard_uid_url(uid);

        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| WatchError::Internal(format!("Dashboard GET request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Dashboard not found: {}", uid);
            return Ok(FetchOutcome::NotFound);
        }

        let text = response
            .text()
            .await
            .map_err(|e| WatchError::Internal(format!("Failed to read dashboard response: {}", e)))?;

        if status != reqwest::StatusCode::OK {
            return Ok(FetchOutcome::Failed {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: DashboardEnvelope = serde_json::from_str(&text).map_err(|e| {
            WatchError::Internal(format!("Failed to parse dashboard response: {}", e))
        })?;

        debug!("Fetched dashboard {} ({} bytes)", uid, text.len());
        Ok(FetchOutcome::Found(envelope))
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_dashboard(&self, uid: &str) -> Result<(), WatchError> {
        let url = self.dashboard_uid_url(uid);

        let response = self
            .authorize(self.http_client.delete(&url))
            .send()
            .await
            .map_err(|e| WatchError::Internal(format!("Dashboard DELETE request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(WatchError::Internal(format!(
                "Dashboard delete failed with status {}: {}",
                status, text
            )));
        }

        debug!("Deleted dashboard {}", uid);
        Ok(())
    }
}
