//! Watch engine: mirror provisioning, change detection, disk writes and
//! the polling loop that drives them.

mod cleanup;
mod detector;
mod provisioner;
mod watcher;
mod writer;

use std::path::Path;

use gsync_core::artifact::{self, Document};
use gsync_core::WatchError;

pub use cleanup::clear_mirrors;
pub use watcher::{WatchExit, Watcher};

/// Read and validate the artifact currently on disk.
pub async fn read_artifact(path: &Path) -> Result<Document, WatchError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        WatchError::Io(format!(
            "Failed to read dashboard file {}: {}",
            path.display(),
            e
        ))
    })?;

    artifact::parse_artifact(&content).map_err(|e| match e {
        WatchError::InvalidArtifact(msg) => {
            WatchError::InvalidArtifact(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
