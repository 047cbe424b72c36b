//! `add` - register a cluster

use armada_registry::{Cluster, ClusterRegistry};
use clap::Args;
use tracing::info;

use super::ClusterFields;
use crate::Result;

/// Register a cluster
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Server URL of the cluster
    pub server: String,

    #[command(flatten)]
    pub fields: ClusterFields,
}

pub async fn run(registry: &ClusterRegistry, args: AddArgs) -> Result<()> {
    let mut cluster = Cluster::new(args.server, "");
    args.fields.apply_to(&mut cluster)?;

    let created = registry.create_cluster(&cluster).await?;
    info!(server = %created.server, name = %created.name, "Cluster added");
    println!("Cluster '{}' added", created.server);
    Ok(())
}
