use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// A watched artifact and the mirror recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub uid: String,
    pub path: PathBuf,
    /// When the mirror was recorded (absent in files written by older versions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Durable mapping from artifact path to mirror uid, scoped to one context.
///
/// Every mutating call persists the full registry before returning.
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Name of the context this registry is scoped to.
    fn context_name(&self) -> &str;

    /// Mirror uid recorded for `path`, if any.
    async fn lookup(&self, path: &Path) -> Result<Option<String>, WatchError>;

    /// Record `uid` for `path`.
    ///
    /// No-op if `uid` is already recorded; replaces the uid of an existing
    /// entry for `path`; otherwise appends a new entry.
    async fn upsert(&self, uid: &str, path: &Path) -> Result<(), WatchError>;

    /// Remove the entry for `path`. Returns false if there was none.
    async fn remove(&self, path: &Path) -> Result<bool, WatchError>;

    /// All entries of the context.
    async fn list(&self) -> Result<Vec<RegistryEntry>, WatchError>;
}
