use std::path::Path;
use std::sync::Arc;

use gsync_core::artifact::{self, Document};
use gsync_core::{CreateDashboardRequest, DashboardApi, FetchOutcome, WatchError};
use tracing::{debug, instrument, warn};

use super::read_artifact;

/// Attempts at drawing a mirror uid that is not already taken remotely.
const MAX_UID_ATTEMPTS: usize = 3;

/// Creates disposable remote mirrors of local dashboards.
pub struct Provisioner {
    api: Arc<dyn DashboardApi>,
}

impl Provisioner {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        Self { api }
    }

    /// Create a mirror of the artifact at `artifact_path` and return its uid.
    ///
    /// Creation is not retried; any failure is fatal to the caller.
    #[instrument(skip(self), level = "debug")]
    pub async fn provision(
        &self,
        artifact_path: &Path,
        folder_uid: Option<&str>,
    ) -> Result<String, WatchError> {
        let source = read_artifact(artifact_path).await?;
        let uid = self.unused_uid().await?;

        let request = Self::build_request(&source, &uid, folder_uid);
        self.api.create_dashboard(&request).await.map_err(|e| {
            WatchError::Internal(format!(
                "Failed to create mirror {} for {}: {}",
                uid,
                artifact_path.display(),
                e
            ))
        })?;

        debug!("Created mirror {} for {}", uid, artifact_path.display());
        Ok(uid)
    }

    /// Whether a mirror with `uid` exists remotely.
    #[instrument(skip(self), level = "debug")]
    pub async fn exists(&self, uid: &str) -> Result<bool, WatchError> {
        match self.api.fetch_dashboard(uid).await? {
            FetchOutcome::Found(_) => Ok(true),
            FetchOutcome::NotFound => Ok(false),
            FetchOutcome::Failed { status, body } => Err(WatchError::Internal(format!(
                "Failed to look up mirror {} (status {}): {}",
                uid, status, body
            ))),
        }
    }

    fn build_request(
        source: &Document,
        uid: &str,
        folder_uid: Option<&str>,
    ) -> CreateDashboardRequest {
        let (folder_uid, message) = match folder_uid {
            Some(folder) => (
                Some(folder.to_string()),
                Some(format!(
                    "Gsync preview dashboard for {}",
                    artifact::document_title(source)
                )),
            ),
            None => (None, None),
        };

        CreateDashboardRequest {
            dashboard: artifact::mirror_document(source, uid),
            overwrite: false,
            folder_uid,
            message,
        }
    }

    /// Draw a random uid, redrawing if the remote already has it.
    async fn unused_uid(&self) -> Result<String, WatchError> {
        for _ in 0..MAX_UID_ATTEMPTS {
            let candidate = artifact::generate_mirror_uid();
            if !self.exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!("Mirror uid {} already taken, drawing another", candidate);
        }

        Err(WatchError::Internal(format!(
            "Could not find a free mirror uid after {} attempts",
            MAX_UID_ATTEMPTS
        )))
    }
}
