//! In-memory stand-ins for the remote API, used by the watch engine tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gsync_core::artifact::Document;
use gsync_core::{CreateDashboardRequest, DashboardApi, DashboardEnvelope, FetchOutcome, WatchError};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::context::{ConfigStore, Context, DashboardSettings, FileRegistry, GsyncConfig};

/// Scripted result for the next fetch, taking precedence over stored dashboards.
#[derive(Debug, Clone)]
pub enum ScriptedFetch {
    Status(u16),
    Transport,
}

#[derive(Default)]
pub struct FakeDashboardApi {
    dashboards: Mutex<HashMap<String, (i64, Document)>>,
    script: Mutex<VecDeque<ScriptedFetch>>,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
    pub creates: AtomicUsize,
    pub fetches: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeDashboardApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uid: &str, version: i64, dashboard: Document) {
        self.dashboards
            .lock()
            .unwrap()
            .insert(uid.to_string(), (version, dashboard));
    }

    /// Simulate an edit in the Grafana UI: bump the version and set `key`.
    pub fn edit(&self, uid: &str, key: &str, value: Value) {
        let mut dashboards = self.dashboards.lock().unwrap();
        let (version, dashboard) = dashboards.get_mut(uid).expect("dashboard exists");
        *version += 1;
        dashboard.insert("version".to_string(), json!(*version));
        dashboard.insert(key.to_string(), value);
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.dashboards.lock().unwrap().contains_key(uid)
    }

    pub fn uids(&self) -> Vec<String> {
        self.dashboards.lock().unwrap().keys().cloned().collect()
    }

    pub fn script(&self, fetch: ScriptedFetch) {
        self.script.lock().unwrap().push_back(fetch);
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DashboardApi for FakeDashboardApi {
    fn base_url(&self) -> &str {
        "http://grafana.test"
    }

    async fn create_dashboard(&self, request: &CreateDashboardRequest) -> Result<(), WatchError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(WatchError::Internal(
                "Dashboard create failed with status 500".to_string(),
            ));
        }

        let uid = request
            .dashboard
            .get("uid")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::Internal("missing uid".to_string()))?
            .to_string();

        // Grafana stores new dashboards at version 1
        let mut dashboard = request.dashboard.clone();
        dashboard.insert("version".to_string(), json!(1));
        self.insert(&uid, 1, dashboard);
        Ok(())
    }

    async fn fetch_dashboard(&self, uid: &str) -> Result<FetchOutcome, WatchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedFetch::Status(status)) => {
                return Ok(FetchOutcome::Failed {
                    status,
                    body: "scripted failure".to_string(),
                })
            }
            Some(ScriptedFetch::Transport) => {
                return Err(WatchError::Internal("connection refused".to_string()))
            }
            None => {}
        }

        let dashboards = self.dashboards.lock().unwrap();
        Ok(match dashboards.get(uid) {
            Some((version, dashboard)) => {
                let mut meta = Document::new();
                // Grafana's meta.version arrives as a float on the wire
                meta.insert("version".to_string(), json!(*version as f64));
                FetchOutcome::Found(DashboardEnvelope {
                    meta,
                    dashboard: dashboard.clone(),
                })
            }
            None => FetchOutcome::NotFound,
        })
    }

    async fn delete_dashboard(&self, uid: &str) -> Result<(), WatchError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(WatchError::Internal(
                "Dashboard delete failed with status 500".to_string(),
            ));
        }
        self.dashboards.lock().unwrap().remove(uid);
        Ok(())
    }
}

/// A temp dashboards directory with one artifact and a config file with a
/// single `test` context pointing at it.
pub struct Fixture {
    pub dir: TempDir,
    pub artifact: PathBuf,
    pub store: ConfigStore,
}

impl Fixture {
    pub async fn new(artifact: Value) -> Self {
        let dir = TempDir::new().unwrap();
        let artifact_path = dir.path().join("cpu.json");
        std::fs::write(&artifact_path, serde_json::to_vec_pretty(&artifact).unwrap()).unwrap();

        let store = ConfigStore::new(dir.path().join(".gsync").join("config.json"));
        let mut config = GsyncConfig::default();
        config.upsert(Context {
            name: "test".to_string(),
            url: "http://grafana.test".to_string(),
            token: "glsa_token".to_string(),
            dashboards: DashboardSettings {
                path: dir.path().to_path_buf(),
                tenant: "1".to_string(),
                ..Default::default()
            },
        });
        config.current_context = "test".to_string();
        store.save(&config).await.unwrap();

        Self {
            dir,
            artifact: artifact_path,
            store,
        }
    }

    pub fn registry(&self) -> FileRegistry {
        FileRegistry::new(self.store.clone(), "test")
    }

    pub fn read_artifact(&self) -> Value {
        read_json(&self.artifact)
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

pub fn sample_dashboard() -> Value {
    json!({
        "id": 12,
        "uid": "cpu-local",
        "title": "CPU",
        "description": "Node CPU usage",
        "version": 5,
        "panels": [{"type": "graph", "title": "load"}]
    })
}
