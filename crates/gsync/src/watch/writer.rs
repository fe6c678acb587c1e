use gsync_core::artifact;
use gsync_core::{WatchError, WatchSession};
use tokio::fs;
use tracing::{debug, instrument};

use super::read_artifact;

/// Write the last observed remote dashboard back to the session's artifact.
///
/// The file is re-read first so `id`, `uid`, `title` and `description`
/// keep their on-disk values. The on-disk version is bumped by one only
/// when the session saw a change. The changed flag is cleared once the
/// file has been replaced.
#[instrument(skip(session), level = "debug", fields(path = %session.file_path().display()))]
pub async fn flush(session: &WatchSession) -> Result<(), WatchError> {
    let mut state = session.lock().await;
    let path = session.file_path();

    let remote = state.remote().ok_or_else(|| {
        WatchError::Internal(format!(
            "No remote state observed yet for {}",
            path.display()
        ))
    })?;

    let local = read_artifact(path).await?;
    let disk_version = artifact::document_version(&local)?;
    let version = if state.changed() {
        disk_version.checked_add(1).ok_or_else(|| {
            WatchError::InvalidVersion(format!(
                "version {} of {} cannot be incremented",
                disk_version,
                path.display()
            ))
        })?
    } else {
        disk_version
    };

    let merged = artifact::overlay_local_identity(remote, &local, version);
    let json = artifact::to_pretty_json(&merged)?;

    // A symlinked artifact is replaced at its target so the link survives
    let target = fs::canonicalize(path).await.map_err(|e| {
        WatchError::Io(format!("Failed to resolve {}: {}", path.display(), e))
    })?;
    let permissions = fs::metadata(&target)
        .await
        .map_err(|e| WatchError::Io(format!("Failed to stat {}: {}", target.display(), e)))?
        .permissions();

    // Write atomically via temp file in the same directory
    let temp_path = target.with_extension("json.gsync.tmp");
    fs::write(&temp_path, &json).await.map_err(|e| {
        WatchError::Io(format!(
            "Failed to write temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    if let Err(e) = fs::set_permissions(&temp_path, permissions).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(WatchError::Io(format!(
            "Failed to set permissions on {}: {}",
            temp_path.display(),
            e
        )));
    }
    fs::rename(&temp_path, &target).await.map_err(|e| {
        WatchError::Io(format!(
            "Failed to rename temp file to {}: {}",
            target.display(),
            e
        ))
    })?;

    state.mark_flushed();
    debug!(
        "Wrote {} bytes to {} at version {}",
        json.len(),
        path.display(),
        version
    );
    Ok(())
}
