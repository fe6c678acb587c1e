use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line for the gsync binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "gsync")]
#[command(about = "Sync Grafana dashboard edits back to local JSON files")]
pub struct Cli {
    /// Path to the gsync config file (defaults to ~/.gsync/config.json)
    #[arg(long, global = true, env = "GSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage Grafana contexts.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Start a watcher.
    #[command(subcommand)]
    Start(StartCommand),

    /// Clear watcher resources on Grafana.
    #[command(subcommand)]
    Clear(ClearCommand),

    /// Show the current client version.
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Create or replace a context.
    CreateContext(CreateContextArgs),

    /// Set the current context.
    UseContext {
        /// Name of the context to make current
        name: String,
    },

    /// List contexts, marking the current one.
    GetContexts,
}

#[derive(Args, Debug, Clone)]
pub struct CreateContextArgs {
    /// Context name
    #[arg(long)]
    pub name: String,

    /// Grafana base URL
    #[arg(long)]
    pub url: String,

    /// Grafana service account token
    #[arg(long)]
    pub token: String,

    /// Local directory holding the dashboard JSON files
    #[arg(long)]
    pub path: PathBuf,

    /// Grafana organization id
    #[arg(long)]
    pub tenant: String,

    /// Folder to create watcher dashboards in
    #[arg(long)]
    pub folder_uid: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StartCommand {
    /// Watch and sync dashboard changes.
    Dashboard(StartDashboardArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StartDashboardArgs {
    /// Dashboard file, relative to the context's dashboards path
    #[arg(short, long)]
    pub dashboard: PathBuf,

    /// Polling interval in seconds
    #[arg(
        short,
        long,
        default_value = "10",
        env = "GSYNC_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Override the current context for this run
    #[arg(short, long, env = "GSYNC_CONTEXT")]
    pub context: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ClearCommand {
    /// Delete every watcher dashboard recorded in the context.
    All {
        /// Override the current context for this run
        #[arg(short, long, env = "GSYNC_CONTEXT")]
        context: Option<String>,
    },
}
