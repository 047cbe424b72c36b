//! Secret store backed by the Kubernetes API

use std::collections::{HashMap, HashSet};

use armada_common::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, warn};

use super::{SecretEvent, SecretStore};

/// Secrets in one namespace of a Kubernetes cluster
#[derive(Clone)]
pub struct KubeSecretStore {
    api: Api<Secret>,
    namespace: String,
}

impl KubeSecretStore {
    /// Create a store for the given namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(name, e))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        self.api
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(&name, e))
    }

    async fn update(&self, secret: &Secret) -> Result<Secret> {
        let name = secret.name_any();
        if name.is_empty() {
            return Err(Error::invalid_argument("secret name is required for update"));
        }
        self.api
            .replace(&name, &PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(&name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(name, e))
    }

    async fn list(&self, selector: &str) -> Result<Vec<Secret>> {
        let list = self
            .api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| Error::from_kube(&self.namespace, e))?;
        Ok(list.items)
    }

    fn watch(&self, selector: &str) -> BoxStream<'static, Result<SecretEvent>> {
        let namespace = self.namespace.clone();
        let config = watcher::Config::default().labels(selector);
        let mut state = WatchState::default();

        // The watcher relists and retries with backoff on its own; errors are
        // reported but never end the stream.
        watcher(self.api.clone(), config)
            .default_backoff()
            .flat_map(move |event| {
                let events = match event {
                    Ok(event) => state.apply(event),
                    Err(e) => {
                        warn!(namespace = %namespace, error = %e, "Secret watch error, retrying");
                        Vec::new()
                    }
                };
                stream::iter(events.into_iter().map(Ok))
            })
            .boxed()
    }
}

/// Tracks what the watcher has delivered so raw watcher events can be
/// reported as added, modified or deleted
///
/// A relist (`Init` .. `InitDone`) replays every object; objects not replayed
/// were deleted while the watch was down.
#[derive(Default)]
struct WatchState {
    known: HashMap<String, Secret>,
    relisted: Option<HashSet<String>>,
}

impl WatchState {
    fn apply(&mut self, event: watcher::Event<Secret>) -> Vec<SecretEvent> {
        match event {
            watcher::Event::Init => {
                debug!("Secret watch relisting");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(secret) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(secret.name_any());
                }
                self.upsert(secret, true).into_iter().collect()
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<String> = self
                    .known
                    .keys()
                    .filter(|name| !seen.contains(*name))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|name| self.known.remove(&name))
                    .map(SecretEvent::Deleted)
                    .collect()
            }
            watcher::Event::Apply(secret) => self.upsert(secret, false).into_iter().collect(),
            watcher::Event::Delete(secret) => {
                self.known.remove(&secret.name_any());
                vec![SecretEvent::Deleted(secret)]
            }
        }
    }

    /// Record a Secret; unchanged replays during a relist produce no event
    fn upsert(&mut self, secret: Secret, relist: bool) -> Option<SecretEvent> {
        let name = secret.name_any();
        match self.known.insert(name, secret.clone()) {
            None => Some(SecretEvent::Added(secret)),
            Some(prev)
                if relist && prev.resource_version() == secret.resource_version() =>
            {
                None
            }
            Some(_) => Some(SecretEvent::Modified(secret)),
        }
    }
}
