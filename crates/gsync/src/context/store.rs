use std::path::{Path, PathBuf};

use gsync_core::WatchError;
use tokio::fs;
use tracing::{debug, instrument};

use super::model::{Context, GsyncConfig};

const CONFIG_DIR: &str = ".gsync";
const CONFIG_FILE: &str = "config.json";

/// JSON config file holding every context and its recorded mirrors.
///
/// Every save rewrites the whole file through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `~/.gsync/config.json`
    pub fn default_path() -> Result<PathBuf, WatchError> {
        let home = dirs::home_dir()
            .ok_or_else(|| WatchError::Io("Could not find home directory".to_string()))?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config file. A missing file is an error.
    #[instrument(skip(self), level = "debug", fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<GsyncConfig, WatchError> {
        self.load_optional().await?.ok_or_else(|| {
            WatchError::NotFound(format!(
                "config file {} (run `gsync config create-context` first)",
                self.path.display()
            ))
        })
    }

    /// Load the config file, or an empty config if it does not exist yet.
    pub async fn load_or_default(&self) -> Result<GsyncConfig, WatchError> {
        Ok(self.load_optional().await?.unwrap_or_default())
    }

    async fn load_optional(&self) -> Result<Option<GsyncConfig>, WatchError> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => {
                let config: GsyncConfig = serde_json::from_str(&json).map_err(|e| {
                    WatchError::Serialization(format!(
                        "Failed to parse config {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                debug!("Loaded config with {} contexts", config.contexts.len());
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WatchError::Io(format!(
                "Failed to read config {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self, config), level = "debug", fields(contexts = config.contexts.len()))]
    pub async fn save(&self, config: &GsyncConfig) -> Result<(), WatchError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                WatchError::Io(format!(
                    "Failed to create config dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(config).map_err(|e| {
            WatchError::Serialization(format!("Failed to serialize config: {}", e))
        })?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json)
            .await
            .map_err(|e| WatchError::Io(format!("Failed to write config: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| WatchError::Io(format!("Failed to rename config: {}", e)))?;

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    /// Add a context, or replace the one with the same name.
    ///
    /// The first context created becomes the current one.
    pub async fn create_context(&self, mut context: Context) -> Result<(), WatchError> {
        context.trim_inputs();
        context.validate()?;

        let dashboards_dir = &context.dashboards.path;
        if fs::metadata(dashboards_dir).await.is_err() {
            return Err(WatchError::Context(format!(
                "dashboard path {} not found in local filesystem",
                dashboards_dir.display()
            )));
        }

        let mut config = self.load_or_default().await?;
        if config.current_context.is_empty() {
            config.current_context = context.name.clone();
        }

        debug!("Storing context {}", context.name);
        config.upsert(context);
        self.save(&config).await
    }

    /// Persist `name` as the current context.
    pub async fn use_context(&self, name: &str) -> Result<(), WatchError> {
        let mut config = self.load().await?;
        if config.get(name).is_none() {
            return Err(WatchError::NotFound(format!("context {}", name)));
        }
        config.current_context = name.to_string();
        self.save(&config).await
    }

    /// Resolve the context to run against: the override if given, else the current one.
    pub async fn resolve_context(&self, override_name: Option<&str>) -> Result<Context, WatchError> {
        let config = self.load().await?;
        let name = match override_name {
            Some(name) => name,
            None if config.current_context.is_empty() => {
                return Err(WatchError::Context(
                    "no current context; run `gsync config use-context` or pass --context"
                        .to_string(),
                ))
            }
            None => config.current_context.as_str(),
        };

        config
            .get(name)
            .cloned()
            .ok_or_else(|| WatchError::NotFound(format!("context {}", name)))
    }
}
