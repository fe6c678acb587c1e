mod commands;
mod config;
mod context;
mod grafana;
mod watch;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, ClearCommand, Command, ConfigCommand, StartCommand};
use context::ConfigStore;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::new(ConfigStore::default_path()?),
    };

    match cli.command {
        Command::Config(ConfigCommand::CreateContext(args)) => {
            commands::create_context(&store, args).await?;
        }
        Command::Config(ConfigCommand::UseContext { name }) => {
            commands::use_context(&store, &name).await?;
        }
        Command::Config(ConfigCommand::GetContexts) => {
            commands::get_contexts(&store).await?;
        }
        Command::Start(StartCommand::Dashboard(args)) => {
            let cancel = CancellationToken::new();
            let token = cancel.clone();
            tokio::spawn(async move {
                escalate_signals(token, shutdown_signal).await;
                warn!("Interrupted again, exiting without cleanup");
                std::process::exit(130);
            });
            return commands::start_dashboard(&store, args, cancel).await;
        }
        Command::Clear(ClearCommand::All { context }) => {
            return commands::clear_all(&store, context.as_deref()).await;
        }
        Command::Version => {
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Cancel `token` on the first shutdown signal, then return on the second.
async fn escalate_signals<F, Fut>(token: CancellationToken, mut next_signal: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    next_signal().await;
    info!("Saving changes and removing the watcher dashboard, interrupt again to exit immediately");
    token.cancel();
    next_signal().await;
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
