use std::sync::Arc;

use futures::future::join_all;
use gsync_core::{DashboardApi, RegistryEntry, ResourceRegistry, WatchError};
use tracing::{info, warn};

use super::provisioner::Provisioner;

/// Result of clearing every mirror recorded in a context.
#[derive(Debug, Default)]
pub struct ClearReport {
    pub cleared: Vec<RegistryEntry>,
    pub failures: Vec<(RegistryEntry, WatchError)>,
}

impl ClearReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete every mirror recorded in `registry` and drop its entry.
///
/// An entry is only dropped once its mirror is gone, so a failed delete
/// can be retried by running the clear again.
pub async fn clear_mirrors(
    api: Arc<dyn DashboardApi>,
    registry: Arc<dyn ResourceRegistry>,
) -> Result<ClearReport, WatchError> {
    let entries = registry.list().await?;
    if entries.is_empty() {
        info!("No watcher dashboards in context {}", registry.context_name());
        return Ok(ClearReport::default());
    }

    info!("Clearing {} watcher dashboards", entries.len());
    let provisioner = Provisioner::new(api.clone());

    let outcomes = join_all(entries.into_iter().map(|entry| {
        let api = api.clone();
        let registry = registry.clone();
        let provisioner = &provisioner;
        async move {
            let result = clear_one(api.as_ref(), registry.as_ref(), provisioner, &entry).await;
            (entry, result)
        }
    }))
    .await;

    let mut report = ClearReport::default();
    for (entry, result) in outcomes {
        match result {
            Ok(()) => report.cleared.push(entry),
            Err(e) => {
                warn!(uid = %entry.uid, path = %entry.path.display(), "Failed to clear watcher dashboard: {}", e);
                report.failures.push((entry, e));
            }
        }
    }

    Ok(report)
}

async fn clear_one(
    api: &dyn DashboardApi,
    registry: &dyn ResourceRegistry,
    provisioner: &Provisioner,
    entry: &RegistryEntry,
) -> Result<(), WatchError> {
    if let Err(e) = api.delete_dashboard(&entry.uid).await {
        // Already deleted elsewhere counts as cleared
        if provisioner.exists(&entry.uid).await? {
            return Err(WatchError::Internal(format!(
                "dashboard delete error, uid={}: {}",
                entry.uid, e
            )));
        }
    }

    registry.remove(&entry.path).await.map_err(|e| {
        WatchError::Internal(format!(
            "clear dashboard config error, uid={}: {}",
            entry.uid, e
        ))
    })?;
    Ok(())
}
