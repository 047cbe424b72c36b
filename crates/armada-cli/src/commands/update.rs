//! `update` - change a registered cluster

use armada_registry::ClusterRegistry;
use chrono::Utc;
use clap::Args;
use tracing::info;

use super::ClusterFields;
use crate::{Error, Result};

/// Change a registered cluster
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Server URL of the cluster
    pub server: String,

    #[command(flatten)]
    pub fields: ClusterFields,

    /// Ask controllers to re-probe the cluster
    #[arg(long)]
    pub refresh: bool,
}

pub async fn run(registry: &ClusterRegistry, args: UpdateArgs) -> Result<()> {
    if args.fields.is_empty() && !args.refresh {
        return Err(Error::validation("nothing to update"));
    }

    let mut cluster = registry.get_cluster(&args.server).await?;
    args.fields.apply_to(&mut cluster)?;
    if args.refresh {
        cluster.refresh_requested_at = Some(Utc::now());
    }

    let updated = registry.update_cluster(&cluster).await?;
    info!(server = %updated.server, refresh = args.refresh, "Cluster updated");
    println!("Cluster '{}' updated", updated.server);
    Ok(())
}
