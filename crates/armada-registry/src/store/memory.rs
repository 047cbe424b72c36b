//! In-process secret store
//!
//! Mirrors the API server semantics the registry relies on: monotonically
//! increasing resourceVersions, compare-and-swap on update, and a watch
//! stream that delivers every change in commit order.

use std::collections::BTreeMap;
use std::sync::Arc;

use armada_common::{Error, Result};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::{LabelSelector, SecretEvent, SecretStore};

/// Events buffered per watcher before it is considered lagged
const WATCH_BUFFER: usize = 1024;

/// Secrets held in memory
///
/// Cloning shares the underlying store.
#[derive(Clone)]
pub struct MemorySecretStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: RwLock<State>,
    events: broadcast::Sender<SecretEvent>,
}

#[derive(Default)]
struct State {
    secrets: BTreeMap<String, Secret>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                events,
            }),
        }
    }

    /// Number of stored Secrets
    pub fn len(&self) -> usize {
        self.inner.state.read().secrets.len()
    }

    /// Whether the store holds no Secrets
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish while the state lock is held so watchers see commit order
    fn publish(&self, event: SecretEvent) {
        // No receivers is not an error
        let _ = self.inner.events.send(event);
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.inner.state.read().secrets.get(name).cloned())
    }

    async fn create(&self, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        if name.is_empty() {
            return Err(Error::invalid_argument("secret name is required"));
        }

        let mut state = self.inner.state.write();
        if state.secrets.contains_key(&name) {
            return Err(Error::record_already_exists(name));
        }
        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(state.next_revision());
        state.secrets.insert(name, stored.clone());
        self.publish(SecretEvent::Added(stored.clone()));
        Ok(stored)
    }

    async fn update(&self, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        let mut state = self.inner.state.write();
        let current = state
            .secrets
            .get(&name)
            .ok_or_else(|| Error::record_not_found(&name))?;

        if let Some(expected) = secret.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(expected) {
                return Err(Error::conflict(
                    name,
                    "the object has been modified; please apply your changes to the latest version and try again",
                ));
            }
        }

        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(state.next_revision());
        state.secrets.insert(name, stored.clone());
        self.publish(SecretEvent::Modified(stored.clone()));
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.inner.state.write();
        let removed = state
            .secrets
            .remove(name)
            .ok_or_else(|| Error::record_not_found(name))?;
        self.publish(SecretEvent::Deleted(removed));
        Ok(())
    }

    async fn list(&self, selector: &str) -> Result<Vec<Secret>> {
        let selector = LabelSelector::parse(selector)?;
        let state = self.inner.state.read();
        Ok(state
            .secrets
            .values()
            .filter(|s| selector.matches(s.labels()))
            .cloned()
            .collect())
    }

    fn watch(&self, selector: &str) -> BoxStream<'static, Result<SecretEvent>> {
        let selector = match LabelSelector::parse(selector) {
            Ok(selector) => selector,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };

        BroadcastStream::new(self.inner.events.subscribe())
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(event) if selector.matches(event.secret().labels()) => Some(Ok(event)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => Some(Err(Error::unavailable(
                        format!("secret watch fell behind by {} events", missed),
                    ))),
                })
            })
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_common::ErrorKind;
    use kube::api::ObjectMeta;

    fn secret(name: &str, labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_versions() {
        let store = MemorySecretStore::new();
        let a = store.create(&secret("a", &[])).await.unwrap();
        let b = store.create(&secret("b", &[])).await.unwrap();
        assert_eq!(a.resource_version().as_deref(), Some("1"));
        assert_eq!(b.resource_version().as_deref(), Some("2"));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = MemorySecretStore::new();
        store.create(&secret("a", &[])).await.unwrap();
        let err = store.create(&secret("a", &[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn update_checks_resource_version() {
        let store = MemorySecretStore::new();
        let created = store.create(&secret("a", &[])).await.unwrap();

        let updated = store.update(&created).await.unwrap();
        assert_eq!(updated.resource_version().as_deref(), Some("2"));

        let err = store.update(&created).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = store.update(&secret("missing", &[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemorySecretStore::new();
        let err = store.delete("a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn list_filters_by_selector() {
        let store = MemorySecretStore::new();
        store.create(&secret("a", &[("type", "cluster")])).await.unwrap();
        store.create(&secret("b", &[("type", "repo")])).await.unwrap();

        let listed = store.list("type=cluster").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name_any(), "a");
    }

    #[tokio::test]
    async fn watch_delivers_matching_changes_in_order() {
        let store = MemorySecretStore::new();
        let mut events = store.watch("type=cluster");

        let a = store.create(&secret("a", &[("type", "cluster")])).await.unwrap();
        store.create(&secret("b", &[("type", "repo")])).await.unwrap();
        let a2 = store.update(&a).await.unwrap();
        store.delete("a").await.unwrap();

        assert_eq!(events.next().await.unwrap().unwrap(), SecretEvent::Added(a));
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            SecretEvent::Modified(a2.clone())
        );
        assert_eq!(events.next().await.unwrap().unwrap(), SecretEvent::Deleted(a2));
    }

    #[tokio::test]
    async fn lagging_watch_fails_then_ends() {
        let store = MemorySecretStore::new();
        let mut events = store.watch("");

        for i in 0..(WATCH_BUFFER + 10) {
            store.create(&secret(&format!("s{i}"), &[])).await.unwrap();
        }

        let err = events.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(events.next().await.is_none());
    }
}
