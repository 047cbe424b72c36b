//! `watch` - stream cluster changes

use armada_registry::ClusterRegistry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CommandErrorExt;
use crate::Result;

pub async fn run(registry: &ClusterRegistry) -> Result<()> {
    let cancel = CancellationToken::new();
    let watch = registry.watch_clusters(
        cancel.clone(),
        |c| println!("ADDED    {}  {}", c.server, c.name),
        |old, new| {
            if old.name == new.name {
                println!("UPDATED  {}  {}", new.server, new.name);
            } else {
                println!("UPDATED  {}  {} -> {}", new.server, old.name, new.name);
            }
        },
        |server| println!("DELETED  {}", server),
    );
    tokio::pin!(watch);

    tokio::select! {
        result = &mut watch => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.cmd_err()?;
            debug!("Interrupted, stopping watch");
            cancel.cancel();
            watch.await?;
        }
    }
    Ok(())
}
