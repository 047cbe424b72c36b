//! Change fan-out to in-process subscribers
//!
//! The consumer task applies each backend event to the cache, turns it into
//! a cluster-level change and hands it to every subscriber synchronously
//! under the fan-out lock. Registration replays the current state under the
//! same lock, so a subscriber sees each change exactly once and in backend
//! order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use armada_common::{Error, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::Cluster;
use crate::codec::secret_to_cluster;
use crate::naming::normalize_server;
use crate::registry::{ClusterRegistry, Shared};
use crate::store::SecretEvent;

type AddHandler = Box<dyn Fn(Cluster) + Send + Sync>;
type UpdateHandler = Box<dyn Fn(Cluster, Cluster) + Send + Sync>;
type DeleteHandler = Box<dyn Fn(String) + Send + Sync>;

/// Lifecycle of the backend change stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StreamState {
    Running,
    /// Stream ended or the registry shut down
    Ended,
    /// Stream failed with a terminal error
    Failed(String),
}

/// A cluster-level change derived from a backend event
#[derive(Clone, Debug, PartialEq)]
enum ClusterChange {
    Added(Cluster),
    Updated { old: Cluster, new: Cluster },
    Deleted(Cluster),
}

struct Subscriber {
    on_add: AddHandler,
    on_update: UpdateHandler,
    on_delete: DeleteHandler,
    /// In-cluster setting captured at registration
    local_enabled: bool,
}

impl Subscriber {
    /// Deliver a change, presenting the local cluster as always present when
    /// it was enabled at registration
    fn notify(&self, change: &ClusterChange) {
        match change {
            ClusterChange::Added(cluster) if self.local_enabled && cluster.is_local() => {
                (self.on_update)(Cluster::local(), cluster.clone())
            }
            ClusterChange::Added(cluster) => (self.on_add)(cluster.clone()),
            ClusterChange::Updated { old, new } => (self.on_update)(old.clone(), new.clone()),
            ClusterChange::Deleted(cluster) if self.local_enabled && cluster.is_local() => {
                (self.on_update)(cluster.clone(), Cluster::local())
            }
            ClusterChange::Deleted(cluster) => (self.on_delete)(cluster.server.clone()),
        }
    }
}

/// Subscribers plus the cluster state they have been told about
#[derive(Default)]
pub(crate) struct Fanout {
    /// Decoded clusters by record name
    known: BTreeMap<String, Cluster>,
    subscribers: HashMap<u64, Subscriber>,
    next_id: u64,
}

impl Fanout {
    /// Initialize the delivered state from a full listing
    pub(crate) fn seed(&mut self, secrets: &[Secret]) {
        self.known = secrets
            .iter()
            .filter_map(|secret| decode(secret).map(|c| (secret.name_any(), c)))
            .collect();
    }

    /// Fold an event into the delivered state and report what changed
    fn observe(&mut self, event: &SecretEvent) -> Vec<ClusterChange> {
        match event {
            SecretEvent::Added(secret) | SecretEvent::Modified(secret) => {
                let Some(cluster) = decode(secret) else {
                    return Vec::new();
                };
                match self.known.insert(secret.name_any(), cluster.clone()) {
                    None => vec![ClusterChange::Added(cluster)],
                    Some(old) if old == cluster => Vec::new(),
                    Some(old)
                        if normalize_server(&old.server) != normalize_server(&cluster.server) =>
                    {
                        vec![ClusterChange::Deleted(old), ClusterChange::Added(cluster)]
                    }
                    Some(old) => vec![ClusterChange::Updated { old, new: cluster }],
                }
            }
            SecretEvent::Deleted(secret) => self
                .known
                .remove(&secret.name_any())
                .map(ClusterChange::Deleted)
                .into_iter()
                .collect(),
        }
    }

    fn dispatch(&self, changes: &[ClusterChange]) {
        for change in changes {
            debug!(
                change = change_kind(change),
                subscribers = self.subscribers.len(),
                "Dispatching cluster change"
            );
            for subscriber in self.subscribers.values() {
                subscriber.notify(change);
            }
        }
    }

    /// Replay current state to a new subscriber and register it
    fn subscribe(&mut self, subscriber: Subscriber) -> u64 {
        if subscriber.local_enabled {
            let local = self
                .known
                .values()
                .find(|c| c.is_local())
                .cloned()
                .unwrap_or_else(Cluster::local);
            (subscriber.on_add)(local);
        }
        for cluster in self.known.values() {
            if subscriber.local_enabled && cluster.is_local() {
                continue;
            }
            (subscriber.on_add)(cluster.clone());
        }

        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, subscriber);
        id
    }
}

fn change_kind(change: &ClusterChange) -> &'static str {
    match change {
        ClusterChange::Added(_) => "added",
        ClusterChange::Updated { .. } => "updated",
        ClusterChange::Deleted(_) => "deleted",
    }
}

/// Decode a record, logging and skipping malformed ones
pub(crate) fn decode(secret: &Secret) -> Option<Cluster> {
    match secret_to_cluster(secret) {
        Ok(cluster) => Some(cluster),
        Err(e) => {
            warn!(record = %secret.name_any(), error = %e, "Skipping malformed cluster secret");
            None
        }
    }
}

/// Drive the backend change stream until it ends or the registry shuts down
pub(crate) async fn consume_events(
    shared: Arc<Shared>,
    mut events: BoxStream<'static, Result<SecretEvent>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Cluster registry shutting down");
                shared.stream_state.send_replace(StreamState::Ended);
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                // Subscribers follow the backend's order even when the cache
                // already holds a newer write-through version.
                let mut fanout = shared.fanout.lock();
                shared.cache.apply(&event);
                let changes = fanout.observe(&event);
                fanout.dispatch(&changes);
            }
            Some(Err(e)) => {
                warn!(error = %e, "Cluster watch failed");
                shared
                    .stream_state
                    .send_replace(StreamState::Failed(e.to_string()));
                return;
            }
            None => {
                info!("Cluster watch stream ended");
                shared.stream_state.send_replace(StreamState::Ended);
                return;
            }
        }
    }
}

/// Unregisters a subscriber when its watch completes or is dropped
struct Subscription {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.fanout.lock().subscribers.remove(&self.id);
        debug!(subscriber = self.id, "Cluster watch unsubscribed");
    }
}

impl ClusterRegistry {
    /// Receive cluster changes until `cancel` fires
    ///
    /// Every known cluster is first replayed through `on_add`; afterwards
    /// changes arrive in backend order. Handlers run on the registry's
    /// consumer task and hold up delivery while they run; they must not call
    /// back into `watch_clusters`.
    ///
    /// When the in-cluster setting is enabled at registration the local
    /// cluster is always present: it is replayed first, a stored record for
    /// it arrives as an update, and deleting that record is an update back to
    /// the synthesized cluster.
    ///
    /// Returns `Ok(())` on cancellation, registry shutdown or stream end, and
    /// the terminal error if the backend stream fails.
    pub async fn watch_clusters<A, U, D>(
        &self,
        cancel: CancellationToken,
        on_add: A,
        on_update: U,
        on_delete: D,
    ) -> Result<()>
    where
        A: Fn(Cluster) + Send + Sync + 'static,
        U: Fn(Cluster, Cluster) + Send + Sync + 'static,
        D: Fn(String) + Send + Sync + 'static,
    {
        let local_enabled = self.shared.settings.in_cluster_enabled().await?;
        let mut state = self.shared.stream_state.subscribe();

        let id = self.shared.fanout.lock().subscribe(Subscriber {
            on_add: Box::new(on_add),
            on_update: Box::new(on_update),
            on_delete: Box::new(on_delete),
            local_enabled,
        });
        let _subscription = Subscription {
            shared: self.shared.clone(),
            id,
        };
        debug!(subscriber = id, local_enabled, "Cluster watch subscribed");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => StreamState::Ended,
            _ = self.shutdown.cancelled() => StreamState::Ended,
            outcome = wait_for_end(&mut state) => outcome,
        };

        match outcome {
            StreamState::Failed(message) => Err(Error::unavailable(message)),
            _ => Ok(()),
        }
    }
}

async fn wait_for_end(state: &mut watch::Receiver<StreamState>) -> StreamState {
    match state.wait_for(|s| *s != StreamState::Running).await {
        Ok(s) => s.clone(),
        Err(_) => StreamState::Ended,
    }
}
