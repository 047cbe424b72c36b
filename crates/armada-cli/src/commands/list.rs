//! `list` - show every registered cluster

use armada_registry::ClusterRegistry;
use clap::Args;

use super::format::{cluster_row, print_table, CLUSTER_HEADERS};
use super::{redacted, OutputFormat};
use crate::Result;

/// List registered clusters
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,

    /// Only clusters in this project
    #[arg(long)]
    pub project: Option<String>,
}

pub async fn run(registry: &ClusterRegistry, args: ListArgs) -> Result<()> {
    let clusters = match args.project.as_deref() {
        Some(project) => registry.get_project_clusters(project).await?,
        None => registry.list_clusters().await?,
    };

    match args.output {
        OutputFormat::Json => {
            let shown: Vec<_> = clusters.iter().map(redacted).collect();
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        OutputFormat::Table => {
            let rows: Vec<_> = clusters.iter().map(cluster_row).collect();
            print_table(CLUSTER_HEADERS, &rows);
        }
    }
    Ok(())
}
