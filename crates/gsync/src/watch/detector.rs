use std::sync::Arc;

use gsync_core::{DashboardApi, FetchOutcome, WatchError, WatchSession};
use tracing::{debug, instrument};

/// Polls a session's mirror and records version changes.
pub struct ChangeDetector {
    api: Arc<dyn DashboardApi>,
}

impl ChangeDetector {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        Self { api }
    }

    /// Fetch the mirror and update the session's observed version.
    ///
    /// Non-success statuses are `Retryable`. Transport failures, unreadable
    /// bodies and non-integral versions are fatal.
    #[instrument(skip(self, session), level = "debug", fields(path = %session.file_path().display()))]
    pub async fn detect(&self, session: &WatchSession) -> Result<(), WatchError> {
        let mut state = session.lock().await;
        let uid = state
            .mirror_uid()
            .ok_or_else(|| WatchError::Internal("session has no mirror".to_string()))?
            .to_string();

        let envelope = match self.api.fetch_dashboard(&uid).await? {
            FetchOutcome::Found(envelope) => envelope,
            FetchOutcome::NotFound => {
                return Err(WatchError::Retryable(format!(
                    "mirror {} returned status 404",
                    uid
                )))
            }
            FetchOutcome::Failed { status, body } => {
                return Err(WatchError::Retryable(format!(
                    "mirror {} returned status {}: {}",
                    uid, status, body
                )))
            }
        };

        let version = envelope.version()?;
        let previous = state.last_observed_version();
        state.record_observation(version, envelope.dashboard);

        debug!(
            "Mirror {} at version {} (previous {}, changed {})",
            uid,
            version,
            previous,
            state.changed()
        );
        Ok(())
    }
}
