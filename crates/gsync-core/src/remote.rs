use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::{self, Document};
use crate::error::WatchError;

/// Body of a dashboard creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDashboardRequest {
    pub dashboard: Document,
    pub overwrite: bool,
    /// Folder placement hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What the remote API returns for a dashboard lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardEnvelope {
    #[serde(default)]
    pub meta: Document,
    #[serde(default)]
    pub dashboard: Document,
}

impl DashboardEnvelope {
    /// Remote version counter, read from `meta.version`.
    pub fn version(&self) -> Result<i64, WatchError> {
        let value = self.meta.get("version").ok_or_else(|| {
            WatchError::InvalidVersion("dashboard meta has no version".to_string())
        })?;
        artifact::version_from_value(value)
    }
}

/// Result of fetching a dashboard by uid.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(DashboardEnvelope),
    NotFound,
    /// Any other non-success status
    Failed { status: u16, body: String },
}

/// Remote dashboard API boundary.
///
/// Implementations handle request construction and authentication.
/// Transport failures are reported as `WatchError::Internal`; HTTP statuses
/// on lookups are reported through `FetchOutcome` so callers can classify them.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Base URL used to build human-facing links.
    fn base_url(&self) -> &str;

    /// Create a dashboard. Any non-success status is an error.
    async fn create_dashboard(&self, request: &CreateDashboardRequest) -> Result<(), WatchError>;

    /// Fetch a dashboard and its metadata by uid.
    async fn fetch_dashboard(&self, uid: &str) -> Result<FetchOutcome, WatchError>;

    /// Delete a dashboard by uid. Any non-success status is an error.
    async fn delete_dashboard(&self, uid: &str) -> Result<(), WatchError>;

    /// Link to a dashboard in the remote UI.
    fn dashboard_url(&self, uid: &str) -> String {
        format!("{}/d/{}", self.base_url().trim_end_matches('/'), uid)
    }
}
