//! `rm` - remove a registered cluster

use armada_registry::ClusterRegistry;
use clap::Args;

use crate::Result;

/// Remove a registered cluster
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Server URL of the cluster
    pub server: String,
}

pub async fn run(registry: &ClusterRegistry, args: RmArgs) -> Result<()> {
    registry.delete_cluster(&args.server).await?;
    println!("Cluster '{}' removed", args.server);
    Ok(())
}
