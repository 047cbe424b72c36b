//! Armada cluster registry CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use armada_common::telemetry::LogFormat;
use armada_common::{DEFAULT_NAMESPACE, NAMESPACE_ENV};
use clap::{Parser, Subcommand};

/// Manage the clusters Armada may deploy to
#[derive(Parser, Debug)]
#[command(name = "armada-clusters")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Namespace holding cluster records and settings
    #[arg(long, env = NAMESPACE_ENV, default_value = DEFAULT_NAMESPACE, global = true)]
    pub registry_namespace: String,

    /// Log output format (text or json)
    #[arg(long, env = "ARMADA_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered clusters
    List(commands::list::ListArgs),
    /// Show one cluster
    Get(commands::get::GetArgs),
    /// Register a cluster
    Add(commands::add::AddArgs),
    /// Change a registered cluster
    Update(commands::update::UpdateArgs),
    /// Remove a registered cluster
    Rm(commands::rm::RmArgs),
    /// Stream cluster changes until interrupted
    Watch,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let registry =
            commands::connect(self.kubeconfig.as_deref(), &self.registry_namespace).await?;
        match self.command {
            Commands::List(args) => commands::list::run(&registry, args).await,
            Commands::Get(args) => commands::get::run(&registry, args).await,
            Commands::Add(args) => commands::add::run(&registry, args).await,
            Commands::Update(args) => commands::update::run(&registry, args).await,
            Commands::Rm(args) => commands::rm::run(&registry, args).await,
            Commands::Watch => commands::watch::run(&registry).await,
        }
    }
}
