use std::path::{Path, PathBuf};

use gsync_core::{RegistryEntry, WatchError};
use serde::{Deserialize, Serialize};

/// Contents of the gsync config file: every context plus the active one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GsyncConfig {
    #[serde(default)]
    pub current_context: String,
    #[serde(default)]
    pub contexts: Vec<Context>,
}

impl GsyncConfig {
    /// Get a context by name.
    pub fn get(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Get a mutable context by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Context> {
        self.contexts.iter_mut().find(|c| c.name == name)
    }

    /// Replace the context with the same name, or append it.
    pub fn upsert(&mut self, context: Context) {
        if let Some(existing) = self.get_mut(&context.name) {
            *existing = context;
        } else {
            self.contexts.push(context);
        }
    }
}

/// A named Grafana environment: credentials, dashboards directory and
/// the mirrors currently recorded for it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub name: String,
    pub url: String,
    pub token: String,
    pub dashboards: DashboardSettings,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("dashboards", &self.dashboards)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Strip surrounding whitespace from user-supplied values.
    pub fn trim_inputs(&mut self) {
        self.name = self.name.trim().to_string();
        self.url = self.url.trim().to_string();
        self.token = self.token.trim().to_string();
        self.dashboards.tenant = self.dashboards.tenant.trim().to_string();
        let path = self.dashboards.path.to_string_lossy().trim().to_string();
        self.dashboards.path = PathBuf::from(path);
        self.dashboards.folder_uid = self
            .dashboards
            .folder_uid
            .take()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
    }

    /// Check the fields every context needs. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.name.is_empty() {
            return Err(WatchError::Context("context name is required".to_string()));
        }
        if self.url.is_empty() {
            return Err(WatchError::Context("grafana url is required".to_string()));
        }
        if self.token.is_empty() {
            return Err(WatchError::Context("grafana auth token is required".to_string()));
        }
        if self.dashboards.tenant.is_empty() {
            return Err(WatchError::Context("grafana tenant is required".to_string()));
        }
        Ok(())
    }
}

/// Dashboard settings of a context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSettings {
    /// Directory holding the dashboard JSON files
    pub path: PathBuf,
    /// Grafana organisation id
    pub tenant: String,
    /// Folder mirrors are created in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,
    /// Mirrors recorded for this context
    #[serde(default)]
    pub resources: Vec<RegistryEntry>,
}

impl DashboardSettings {
    pub fn resource_by_path(&self, path: &Path) -> Option<&RegistryEntry> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// Record `uid` for `path`. Returns false when nothing changed.
    pub fn upsert_resource(&mut self, uid: &str, path: &Path) -> bool {
        if self.resources.iter().any(|r| r.uid == uid) {
            return false;
        }

        let now = Some(chrono::Utc::now());
        if let Some(existing) = self.resources.iter_mut().find(|r| r.path == path) {
            existing.uid = uid.to_string();
            existing.created_at = now;
        } else {
            self.resources.push(RegistryEntry {
                uid: uid.to_string(),
                path: path.to_path_buf(),
                created_at: now,
            });
        }
        true
    }

    pub fn remove_resource(&mut self, path: &Path) -> Option<RegistryEntry> {
        let pos = self.resources.iter().position(|r| r.path == path)?;
        Some(self.resources.remove(pos))
    }
}
