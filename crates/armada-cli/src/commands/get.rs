//! `get` - show one cluster in detail

use armada_registry::{ClusterLookup, ClusterRegistry};
use clap::Args;

use super::format::format_age;
use super::{redacted, OutputFormat};
use crate::Result;

/// Show one cluster
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Server URL of the cluster
    pub server: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

pub async fn run(registry: &ClusterRegistry, args: GetArgs) -> Result<()> {
    let lookup = registry.lookup_cluster(&args.server).await?;
    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&redacted(lookup.cluster()))?);
        }
        OutputFormat::Table => {
            for (key, value) in describe(&lookup) {
                println!("{:<12} {}", format!("{}:", key), value);
            }
        }
    }
    Ok(())
}

/// Key/value lines describing a cluster
fn describe(lookup: &ClusterLookup) -> Vec<(&'static str, String)> {
    let cluster = lookup.cluster();
    let mut lines = vec![
        ("Server", cluster.server.clone()),
        ("Name", cluster.name.clone()),
        (
            "Source",
            if lookup.is_stored() { "stored" } else { "built-in" }.to_string(),
        ),
    ];
    if !cluster.project.is_empty() {
        lines.push(("Project", cluster.project.clone()));
    }
    lines.push((
        "Namespaces",
        if cluster.namespaces.is_empty() {
            "all".to_string()
        } else {
            cluster.namespaces.join(", ")
        },
    ));
    if cluster.cluster_resources {
        lines.push(("Cluster-wide", "yes".to_string()));
    }
    if let Some(shard) = cluster.shard {
        lines.push(("Shard", shard.to_string()));
    }
    for (key, value) in &cluster.labels {
        lines.push(("Label", format!("{}={}", key, value)));
    }
    for (key, value) in &cluster.annotations {
        lines.push(("Annotation", format!("{}={}", key, value)));
    }
    if let Some(ts) = cluster.refresh_requested_at.as_ref() {
        lines.push(("Refresh", format!("requested {} ago", format_age(ts))));
    }
    lines
}
