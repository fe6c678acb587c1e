//! Subcommand handlers.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use gsync_core::{DashboardApi, ResourceRegistry, WatchSession};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{CreateContextArgs, StartDashboardArgs};
use crate::context::{ConfigStore, Context, DashboardSettings, FileRegistry, GsyncConfig};
use crate::grafana::GrafanaClient;
use crate::watch::{self, WatchExit, Watcher};

pub async fn create_context(store: &ConfigStore, args: CreateContextArgs) -> anyhow::Result<()> {
    let context = Context {
        name: args.name,
        url: args.url,
        token: args.token,
        dashboards: DashboardSettings {
            path: args.path,
            tenant: args.tenant,
            folder_uid: args.folder_uid,
            resources: Vec::new(),
        },
    };
    let name = context.name.trim().to_string();

    store.create_context(context).await?;
    info!("Saved context {} to {}", name, store.path().display());
    Ok(())
}

pub async fn use_context(store: &ConfigStore, name: &str) -> anyhow::Result<()> {
    store.use_context(name).await?;
    info!("Switched to context {}", name);
    Ok(())
}

pub async fn get_contexts(store: &ConfigStore) -> anyhow::Result<()> {
    let config: GsyncConfig = store.load().await?;
    for context in &config.contexts {
        let marker = if context.name == config.current_context {
            "*"
        } else {
            " "
        };
        println!("{} {}\t{}", marker, context.name, context.url);
    }
    Ok(())
}

/// Grafana client and registry for `context`.
fn connect(
    store: &ConfigStore,
    context: &Context,
) -> anyhow::Result<(Arc<dyn DashboardApi>, Arc<dyn ResourceRegistry>)> {
    let api = GrafanaClient::new(
        context.url.clone(),
        context.dashboards.tenant.clone(),
        context.token.clone(),
    )?;
    let registry = FileRegistry::new(store.clone(), context.name.clone());
    Ok((Arc::new(api), Arc::new(registry)))
}

/// Watch one dashboard until interrupted, then save and tear down.
pub async fn start_dashboard(
    store: &ConfigStore,
    args: StartDashboardArgs,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let context = store.resolve_context(args.context.as_deref()).await?;
    let artifact_path = context.dashboards.path.join(&args.dashboard);

    // Fail before touching Grafana if the file is unusable
    watch::read_artifact(&artifact_path).await?;

    info!(
        context = %context.name,
        path = %artifact_path.display(),
        "Starting dashboard watcher process"
    );
    info!("Interrupt the process to save current changes to local dashboard config file");

    let (api, registry) = connect(store, &context)?;
    let watcher = Watcher::new(api, registry, Duration::from_secs(args.interval));
    let session = WatchSession::new(artifact_path, context.dashboards.folder_uid.clone());

    match watcher.run(&session, cancel).await {
        Ok(WatchExit::CleanShutdown) => {
            let report = watcher.teardown(&session).await;
            let uid = report.mirror_uid.as_deref().unwrap_or_default();
            if report.is_clean() {
                info!(uid = %uid, "Watcher dashboard removed, changes saved");
                Ok(ExitCode::SUCCESS)
            } else {
                error!(
                    uid = %uid,
                    path = %session.file_path().display(),
                    "Teardown incomplete, check the errors above"
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Err(e) => {
            let uid = session.mirror_uid().await.unwrap_or_default();
            error!(
                uid = %uid,
                path = %session.file_path().display(),
                "Watcher stopped: {}. Delete the watcher dashboard manually if it still exists", e
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Delete every watcher dashboard recorded in the context.
pub async fn clear_all(store: &ConfigStore, context: Option<&str>) -> anyhow::Result<ExitCode> {
    let context = store.resolve_context(context).await?;
    let (api, registry) = connect(store, &context)?;

    let report = watch::clear_mirrors(api, registry).await?;
    for (entry, e) in &report.failures {
        error!(uid = %entry.uid, path = %entry.path.display(), "Failed to clear: {}", e);
    }

    if report.is_clean() {
        if !report.cleared.is_empty() {
            info!(
                "Successfully removed {} watcher dashboards from Grafana",
                report.cleared.len()
            );
        }
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
