use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, MutexGuard};

use crate::artifact::Document;

/// Mutable state of a watch session.
///
/// `last_observed_version` and `changed` only move together through
/// [`SessionState::record_observation`] and [`SessionState::mark_flushed`].
#[derive(Debug, Default)]
pub struct SessionState {
    mirror_uid: Option<String>,
    /// 0 means no version has been observed yet
    last_observed_version: i64,
    changed: bool,
    remote: Option<Document>,
}

impl SessionState {
    pub fn mirror_uid(&self) -> Option<&str> {
        self.mirror_uid.as_deref()
    }

    pub fn set_mirror_uid(&mut self, uid: impl Into<String>) {
        self.mirror_uid = Some(uid.into());
    }

    pub fn last_observed_version(&self) -> i64 {
        self.last_observed_version
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Last remote dashboard body observed, if any.
    pub fn remote(&self) -> Option<&Document> {
        self.remote.as_ref()
    }

    /// Record a fetched remote version and dashboard body.
    ///
    /// The first observation never counts as a change.
    pub fn record_observation(&mut self, version: i64, dashboard: Document) {
        self.changed =
            self.last_observed_version != 0 && version != self.last_observed_version;
        self.last_observed_version = version;
        self.remote = Some(dashboard);
    }

    /// Clear the changed flag after a successful write to disk.
    pub fn mark_flushed(&mut self) {
        self.changed = false;
    }
}

/// Point-in-time copy of a session's state, for logging and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub mirror_uid: Option<String>,
    pub last_observed_version: i64,
    pub changed: bool,
}

/// One artifact/mirror pair being watched.
#[derive(Debug)]
pub struct WatchSession {
    file_path: PathBuf,
    folder_uid: Option<String>,
    state: Mutex<SessionState>,
}

impl WatchSession {
    pub fn new(file_path: impl Into<PathBuf>, folder_uid: Option<String>) -> Self {
        Self {
            file_path: file_path.into(),
            folder_uid: folder_uid.filter(|f| !f.is_empty()),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn folder_uid(&self) -> Option<&str> {
        self.folder_uid.as_deref()
    }

    /// Exclusive access to the session state.
    ///
    /// Detect and flush hold this for their whole duration, so at most one
    /// of them runs against a session at a time.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub async fn mirror_uid(&self) -> Option<String> {
        self.state.lock().await.mirror_uid.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            mirror_uid: state.mirror_uid.clone(),
            last_observed_version: state.last_observed_version,
            changed: state.changed,
        }
    }
}
