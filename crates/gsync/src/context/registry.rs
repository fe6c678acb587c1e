use std::path::Path;

use async_trait::async_trait;
use gsync_core::{RegistryEntry, ResourceRegistry, WatchError};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::model::{Context, GsyncConfig};
use super::store::ConfigStore;

/// Resource registry stored in the gsync config file, scoped to one context.
///
/// Each mutation reloads the file, applies the change and rewrites the
/// whole file. Mutations from this process are serialized; concurrent
/// writers in other processes are not supported.
pub struct FileRegistry {
    store: ConfigStore,
    context: String,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(store: ConfigStore, context: impl Into<String>) -> Self {
        Self {
            store,
            context: context.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn context_of<'a>(&self, config: &'a GsyncConfig) -> Result<&'a Context, WatchError> {
        config
            .get(&self.context)
            .ok_or_else(|| WatchError::NotFound(format!("context {}", self.context)))
    }

    fn context_mut<'a>(&self, config: &'a mut GsyncConfig) -> Result<&'a mut Context, WatchError> {
        config
            .get_mut(&self.context)
            .ok_or_else(|| WatchError::NotFound(format!("context {}", self.context)))
    }
}

#[async_trait]
impl ResourceRegistry for FileRegistry {
    fn context_name(&self) -> &str {
        &self.context
    }

    #[instrument(skip(self), level = "debug")]
    async fn lookup(&self, path: &Path) -> Result<Option<String>, WatchError> {
        let config = self.store.load().await?;
        let context = self.context_of(&config)?;
        Ok(context
            .dashboards
            .resource_by_path(path)
            .map(|r| r.uid.clone()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn upsert(&self, uid: &str, path: &Path) -> Result<(), WatchError> {
        let _guard = self.write_lock.lock().await;

        let mut config = self.store.load().await?;
        let context = self.context_mut(&mut config)?;
        if !context.dashboards.upsert_resource(uid, path) {
            debug!("Mirror {} already recorded in context {}", uid, self.context);
        }

        self.store.save(&config).await?;
        debug!(
            "Recorded mirror {} for {} in context {}",
            uid,
            path.display(),
            self.context
        );
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, path: &Path) -> Result<bool, WatchError> {
        let _guard = self.write_lock.lock().await;

        let mut config = self.store.load().await?;
        let context = self.context_mut(&mut config)?;
        let removed = context.dashboards.remove_resource(path);

        self.store.save(&config).await?;
        match &removed {
            Some(entry) => debug!(
                "Removed mirror {} for {} from context {}",
                entry.uid,
                path.display(),
                self.context
            ),
            None => debug!(
                "No mirror recorded for {} in context {}",
                path.display(),
                self.context
            ),
        }
        Ok(removed.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list(&self) -> Result<Vec<RegistryEntry>, WatchError> {
        let config = self.store.load().await?;
        let context = self.context_of(&config)?;
        Ok(context.dashboards.resources.clone())
    }
}
