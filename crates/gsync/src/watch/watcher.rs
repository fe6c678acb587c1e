use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gsync_core::{DashboardApi, ResourceRegistry, WatchError, WatchSession};
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::detector::ChangeDetector;
use super::provisioner::Provisioner;
use super::writer;

/// Retryable polling failures tolerated per session.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Initializing,
    Watching,
    ShuttingDown,
    Failed,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchState::Initializing => write!(f, "initializing"),
            WatchState::Watching => write!(f, "watching"),
            WatchState::ShuttingDown => write!(f, "shutting-down"),
            WatchState::Failed => write!(f, "failed"),
        }
    }
}

/// How a watch loop ended without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// Stop was requested. The caller should save and tear down.
    CleanShutdown,
}

/// Outcome of the final save and teardown. Each part fails independently.
#[derive(Debug)]
pub struct TeardownReport {
    pub mirror_uid: Option<String>,
    pub flush: Result<(), WatchError>,
    pub delete: Result<(), WatchError>,
    /// `Ok(false)` when no registry entry was left to remove
    pub deregister: Result<bool, WatchError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.flush.is_ok() && self.delete.is_ok() && self.deregister.is_ok()
    }
}

/// Drives one watch session: provisions or adopts its mirror, polls it on
/// a fixed interval and writes detected changes to disk.
pub struct Watcher {
    api: Arc<dyn DashboardApi>,
    registry: Arc<dyn ResourceRegistry>,
    provisioner: Provisioner,
    detector: ChangeDetector,
    interval: Duration,
    max_retries: u32,
}

impl Watcher {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        registry: Arc<dyn ResourceRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(api.clone()),
            detector: ChangeDetector::new(api.clone()),
            api,
            registry,
            interval: interval.max(Duration::from_millis(1)),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[cfg(test)]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn enter(&self, session: &WatchSession, state: WatchState) {
        debug!(
            "Watch of {} entering state {}",
            session.file_path().display(),
            state
        );
    }

    /// Resolve the session's mirror: adopt the recorded one if it still
    /// exists, otherwise provision a new one and record it.
    pub async fn prepare(&self, session: &WatchSession) -> Result<String, WatchError> {
        let path = session.file_path();

        let uid = match self.registry.lookup(path).await? {
            Some(uid) if self.provisioner.exists(&uid).await? => {
                info!(url = %self.api.dashboard_url(&uid), "Watcher dashboard found");
                uid
            }
            recorded => {
                if let Some(stale) = recorded {
                    info!(uid = %stale, "Recorded watcher dashboard no longer exists, recreating");
                }
                info!("Creating watcher dashboard...");
                let uid = self.provisioner.provision(path, session.folder_uid()).await?;
                // The mirror exists from here on, even if recording it fails
                session.lock().await.set_mirror_uid(uid.clone());
                self.registry.upsert(&uid, path).await.map_err(|e| {
                    WatchError::Internal(format!(
                        "created mirror {} for {} but failed to record it: {}",
                        uid,
                        path.display(),
                        e
                    ))
                })?;
                info!(url = %self.api.dashboard_url(&uid), "Watcher dashboard created");
                uid
            }
        };

        session.lock().await.set_mirror_uid(uid.clone());
        Ok(uid)
    }

    /// Run the watch loop until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is observed between ticks; a poll already in flight
    /// completes first. Retryable failures count against a budget that is
    /// not replenished by later successes.
    pub async fn run(
        &self,
        session: &WatchSession,
        cancel: CancellationToken,
    ) -> Result<WatchExit, WatchError> {
        self.enter(session, WatchState::Initializing);
        let uid = match self.prepare(session).await {
            Ok(uid) => uid,
            Err(e) => {
                self.enter(session, WatchState::Failed);
                return Err(e);
            }
        };

        self.enter(session, WatchState::Watching);
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retries: u32 = 0;

        info!("Watching...");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.enter(session, WatchState::ShuttingDown);
                    info!("Shutdown requested, stopping watch of {}", session.file_path().display());
                    return Ok(WatchExit::CleanShutdown);
                }
                _ = ticker.tick() => {
                    match self.detector.detect(session).await {
                        Ok(()) => {
                            if session.snapshot().await.changed {
                                info!("Version change detected, saving changes...");
                                if let Err(e) = writer::flush(session).await {
                                    error!(
                                        uid = %uid,
                                        path = %session.file_path().display(),
                                        "Failed to save changes: {}", e
                                    );
                                }
                            }
                        }
                        Err(e) if e.is_retryable() => {
                            if retries >= self.max_retries {
                                self.enter(session, WatchState::Failed);
                                error!(uid = %uid, "Max retries reached: {}", e);
                                return Err(WatchError::Internal(format!(
                                    "giving up on mirror {} for {} after {} retries: {}",
                                    uid,
                                    session.file_path().display(),
                                    retries,
                                    e
                                )));
                            }
                            retries += 1;
                            warn!(retry = retries, "Error detected, attempting retry: {}", e);
                        }
                        Err(e) => {
                            self.enter(session, WatchState::Failed);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Save the latest remote state, delete the mirror and drop its
    /// registry entry.
    ///
    /// The three run concurrently; the delete waits only until the final
    /// fetch has completed so the mirror is never removed before being read.
    pub async fn teardown(&self, session: &WatchSession) -> TeardownReport {
        let path = session.file_path();
        let Some(uid) = session.mirror_uid().await else {
            let deregister = self.registry.remove(path).await;
            return TeardownReport {
                mirror_uid: None,
                flush: Err(WatchError::Internal("session has no mirror".to_string())),
                delete: Err(WatchError::Internal("session has no mirror".to_string())),
                deregister,
            };
        };

        info!("Saving final changes to disk");
        let (fetched_tx, fetched_rx) = oneshot::channel::<()>();

        let save = async move {
            let detected = self.detector.detect(session).await;
            let _ = fetched_tx.send(());
            match detected {
                Ok(()) => writer::flush(session).await,
                Err(e) => Err(e),
            }
        };
        let delete = async {
            let _ = fetched_rx.await;
            self.api.delete_dashboard(&uid).await
        };
        let deregister = self.registry.remove(path);

        let (flush, delete, deregister) = tokio::join!(save, delete, deregister);

        if let Err(e) = &flush {
            error!(path = %path.display(), "Failed saving final changes: {}", e);
        }
        if let Err(e) = &delete {
            error!(
                uid = %uid,
                url = %self.api.dashboard_url(&uid),
                "Failed deleting watcher dashboard, delete it manually: {}", e
            );
        }
        if let Err(e) = &deregister {
            error!(uid = %uid, "Failed clearing resource from config: {}", e);
        }

        TeardownReport {
            mirror_uid: Some(uid),
            flush,
            delete,
            deregister,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_dashboard, FakeDashboardApi, Fixture, ScriptedFetch};
    use serde_json::json;
    use tokio::time::sleep;

    const TICK: Duration = Duration::from_millis(20);

    struct Harness {
        fixture: Fixture,
        api: Arc<FakeDashboardApi>,
        registry: Arc<dyn ResourceRegistry>,
        watcher: Arc<Watcher>,
        session: Arc<WatchSession>,
    }

    async fn harness() -> Harness {
        let fixture = Fixture::new(sample_dashboard()).await;
        let api = Arc::new(FakeDashboardApi::new());
        let registry: Arc<dyn ResourceRegistry> = Arc::new(fixture.registry());
        let watcher = Arc::new(Watcher::new(api.clone(), registry.clone(), TICK));
        let session = Arc::new(WatchSession::new(&fixture.artifact, None));
        Harness {
            fixture,
            api,
            registry,
            watcher,
            session,
        }
    }

    fn spawn_run(
        h: &Harness,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<WatchExit, WatchError>> {
        let watcher = h.watcher.clone();
        let session = h.session.clone();
        tokio::spawn(async move { watcher.run(&session, cancel).await })
    }

    /// Wait until the loop has resolved its mirror, before the first tick.
    async fn wait_for_mirror(session: &WatchSession) -> String {
        loop {
            if let Some(uid) = session.mirror_uid().await {
                return uid;
            }
            sleep(Duration::from_millis(1)).await;
        }
    }

    async fn wait_for_observation(session: &WatchSession) {
        while session.snapshot().await.last_observed_version == 0 {
            sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let h = harness().await;

        let first = h.watcher.prepare(&h.session).await.unwrap();
        let second = h.watcher.prepare(&h.session).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(FakeDashboardApi::count(&h.api.creates), 1);
        assert_eq!(
            h.registry.lookup(&h.fixture.artifact).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_prepare_recreates_deleted_mirror() {
        let h = harness().await;
        let first = h.watcher.prepare(&h.session).await.unwrap();

        // Deleted out-of-band
        h.api.delete_dashboard(&first).await.unwrap();

        let second = h.watcher.prepare(&h.session).await.unwrap();
        assert_ne!(first, second);
        assert!(h.api.contains(&second));

        let entries = h.registry.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, second);
    }

    #[tokio::test]
    async fn test_prepare_lookup_failure_is_fatal() {
        let h = harness().await;
        h.registry.upsert("recorded", &h.fixture.artifact).await.unwrap();
        h.api.script(ScriptedFetch::Status(500));

        let err = h.watcher.prepare(&h.session).await.unwrap_err();
        assert!(matches!(err, WatchError::Internal(_)));
        assert_eq!(FakeDashboardApi::count(&h.api.creates), 0);
    }

    #[tokio::test]
    async fn test_run_writes_remote_changes() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&h, cancel.clone());

        let uid = wait_for_mirror(&h.session).await;
        wait_for_observation(&h.session).await;
        h.api.edit(&uid, "refresh", json!("5s"));
        while h.session.snapshot().await.last_observed_version < 2 {
            sleep(Duration::from_millis(2)).await;
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), WatchExit::CleanShutdown);

        let written = h.fixture.read_artifact();
        assert_eq!(written["refresh"], json!("5s"));
        assert_eq!(written["version"], json!(6));
        assert_eq!(written["uid"], json!("cpu-local"));
        assert_eq!(written["title"], json!("CPU"));
    }

    #[tokio::test]
    async fn test_retry_budget_fails_on_fourth_retryable_error() {
        let h = harness().await;
        let handle = spawn_run(&h, CancellationToken::new());
        wait_for_mirror(&h.session).await;
        for _ in 0..4 {
            h.api.script(ScriptedFetch::Status(502));
        }

        let result = handle.await.unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, WatchError::Internal(_)));
        assert!(err.to_string().contains("after 3 retries"));
        assert_eq!(FakeDashboardApi::count(&h.api.fetches), 4 + 1);
    }

    #[tokio::test]
    async fn test_three_retryable_errors_are_absorbed() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&h, cancel.clone());
        wait_for_mirror(&h.session).await;
        for _ in 0..3 {
            h.api.script(ScriptedFetch::Status(502));
        }

        sleep(TICK * 8).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), WatchExit::CleanShutdown);
        assert!(h.session.snapshot().await.last_observed_version > 0);
    }

    #[tokio::test]
    async fn test_retry_budget_is_not_replenished() {
        let h = harness().await;
        let watcher = Watcher::new(h.api.clone(), h.registry.clone(), TICK).with_max_retries(1);
        let cancel = CancellationToken::new();

        let session = h.session.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { watcher.run(&session, token).await });
        wait_for_mirror(&h.session).await;
        h.api.script(ScriptedFetch::Status(502));

        // One failure, then some clean polls
        sleep(TICK * 6).await;
        assert!(!handle.is_finished());

        // The next failure exceeds the budget
        h.api.script(ScriptedFetch::Status(502));
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("after 1 retries"));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let h = harness().await;
        let handle = spawn_run(&h, CancellationToken::new());
        wait_for_mirror(&h.session).await;
        h.api.script(ScriptedFetch::Transport);

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_provisioning_failure_never_starts_loop() {
        let h = harness().await;
        h.api.fail_creates();

        let err = spawn_run(&h, CancellationToken::new())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, WatchError::Internal(_)));
        assert_eq!(FakeDashboardApi::count(&h.api.fetches), 1);
        assert!(h.registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecorded_mirror_is_identified() {
        let h = harness().await;
        // Config saves fail: the temp file path is taken by a directory
        std::fs::create_dir(h.fixture.store.path().with_extension("json.tmp")).unwrap();

        let err = spawn_run(&h, CancellationToken::new())
            .await
            .unwrap()
            .unwrap_err();

        let uids = h.api.uids();
        assert_eq!(uids.len(), 1);
        assert_eq!(h.session.mirror_uid().await.as_deref(), Some(uids[0].as_str()));
        assert!(err.to_string().contains(&uids[0]));
        assert!(err.to_string().contains("cpu.json"));
    }

    #[tokio::test]
    async fn test_clean_shutdown_and_teardown() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&h, cancel.clone());

        // One successful tick
        let uid = wait_for_mirror(&h.session).await;
        wait_for_observation(&h.session).await;

        // Edited after the last poll; only the final save can pick it up
        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), WatchExit::CleanShutdown);
        h.api.edit(&uid, "refresh", json!("1m"));

        let report = h.watcher.teardown(&h.session).await;
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.mirror_uid.as_deref(), Some(uid.as_str()));
        assert!(matches!(report.deregister, Ok(true)));

        let written = h.fixture.read_artifact();
        assert_eq!(written["refresh"], json!("1m"));
        assert_eq!(written["version"], json!(6));

        assert!(!h.api.contains(&uid));
        assert_eq!(FakeDashboardApi::count(&h.api.deletes), 1);
        assert_eq!(h.registry.lookup(&h.fixture.artifact).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_teardown_failures_are_independent() {
        let h = harness().await;
        h.watcher.prepare(&h.session).await.unwrap();
        h.api.fail_deletes();

        let report = h.watcher.teardown(&h.session).await;

        assert!(report.flush.is_ok());
        assert!(report.delete.is_err());
        assert!(matches!(report.deregister, Ok(true)));
        assert!(!report.is_clean());
        assert_eq!(FakeDashboardApi::count(&h.api.deletes), 1);
    }

    #[tokio::test]
    async fn test_teardown_surfaces_final_flush_error() {
        let h = harness().await;
        let uid = h.watcher.prepare(&h.session).await.unwrap();
        std::fs::write(&h.fixture.artifact, b"{broken").unwrap();

        let report = h.watcher.teardown(&h.session).await;

        assert!(matches!(report.flush, Err(WatchError::InvalidArtifact(_))));
        assert!(report.delete.is_ok());
        assert!(!h.api.contains(&uid));
    }
}
