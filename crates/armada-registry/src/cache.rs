//! In-memory snapshot of cluster Secrets
//!
//! Keyed by normalized server, with a secondary index from record name to
//! server so delete events (which carry the record name) resolve in O(1).
//! A single `parking_lot::RwLock` guards both maps; readers clone out under
//! the read lock.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::naming::normalize_server;
use crate::store::SecretEvent;

/// Concurrency-safe cache of cluster Secrets
#[derive(Default)]
pub struct ClusterCache {
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    by_server: HashMap<String, Secret>,
    servers_by_name: HashMap<String, String>,
    /// Records deleted through the registry whose delete event has not
    /// arrived yet, with their last resourceVersion
    tombstones: HashMap<String, Option<u64>>,
}

impl ClusterCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot, e.g. after a relist
    pub fn replace_all(&self, secrets: impl IntoIterator<Item = Secret>) {
        let mut state = self.state.write();
        *state = CacheState::default();
        for secret in secrets {
            state.upsert(secret);
        }
    }

    /// Insert or replace a record; returns false if it was stale or unkeyed
    pub fn upsert(&self, secret: Secret) -> bool {
        self.state.write().upsert(secret)
    }

    /// Remove a record by name after a write-through delete
    ///
    /// Leaves a tombstone so an in-flight event for the deleted version
    /// cannot bring it back. Nothing is recorded when the backend's delete
    /// event already removed the record.
    pub fn remove(&self, name: &str) -> Option<Secret> {
        let mut state = self.state.write();
        let removed = state.remove(name)?;
        state.tombstones.insert(name.to_string(), revision(&removed));
        Some(removed)
    }

    /// Apply a backend event; returns whether the snapshot changed
    pub fn apply(&self, event: &SecretEvent) -> bool {
        let mut state = self.state.write();
        match event {
            SecretEvent::Added(secret) | SecretEvent::Modified(secret) => {
                state.upsert(secret.clone())
            }
            SecretEvent::Deleted(secret) => {
                let name = secret.name_any();
                state.tombstones.remove(&name);
                let current = state
                    .servers_by_name
                    .get(&name)
                    .and_then(|key| state.by_server.get(key));
                if let Some(current) = current {
                    if is_older(secret, current) {
                        debug!(record = %name, "Ignoring delete for superseded record");
                        return false;
                    }
                }
                state.remove(&name).is_some()
            }
        }
    }

    /// Look up a record by server; the server is normalized first
    pub fn get(&self, server: &str) -> Option<Secret> {
        self.state
            .read()
            .by_server
            .get(&normalize_server(server))
            .cloned()
    }

    /// Look up a record by its backend name
    pub fn get_by_name(&self, name: &str) -> Option<Secret> {
        let state = self.state.read();
        state
            .servers_by_name
            .get(name)
            .and_then(|key| state.by_server.get(key))
            .cloned()
    }

    /// Whether a record exists for the server
    pub fn contains(&self, server: &str) -> bool {
        self.state
            .read()
            .by_server
            .contains_key(&normalize_server(server))
    }

    /// Snapshot of every record
    pub fn records(&self) -> Vec<Secret> {
        self.state.read().by_server.values().cloned().collect()
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.state.read().by_server.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheState {
    fn upsert(&mut self, secret: Secret) -> bool {
        let name = secret.name_any();
        let Some(key) = server_key(&secret) else {
            warn!(record = %name, "Skipping cluster secret without a server");
            return false;
        };

        if let Some(tombstone) = self.tombstones.get(&name) {
            match (revision(&secret), tombstone) {
                (Some(incoming), Some(deleted)) if incoming <= *deleted => {
                    debug!(record = %name, "Ignoring event for deleted record");
                    return false;
                }
                _ => {
                    self.tombstones.remove(&name);
                }
            }
        }

        let old_key = self.servers_by_name.get(&name).cloned();
        if let Some(current) = old_key.as_ref().and_then(|k| self.by_server.get(k)) {
            if is_older(&secret, current) {
                debug!(record = %name, "Ignoring stale record");
                return false;
            }
        }

        // The record that claimed a server first keeps it
        if let Some(owner) = self.by_server.get(&key).map(|s| s.name_any()) {
            if owner != name {
                warn!(
                    record = %name,
                    owner = %owner,
                    server = %key,
                    "Two records share a server, keeping the first"
                );
                return self.remove(&name).is_some();
            }
        }

        if let Some(old_key) = old_key.filter(|k| *k != key) {
            debug!(record = %name, from = %old_key, to = %key, "Record server changed");
            self.by_server.remove(&old_key);
        }

        self.servers_by_name.insert(name, key.clone());
        self.by_server.insert(key, secret);
        true
    }

    fn remove(&mut self, name: &str) -> Option<Secret> {
        let key = self.servers_by_name.remove(name)?;
        self.by_server.remove(&key)
    }
}

fn server_key(secret: &Secret) -> Option<String> {
    let raw = secret.data.as_ref()?.get("server")?;
    let server = std::str::from_utf8(&raw.0).ok()?;
    Some(normalize_server(server))
}

fn revision(secret: &Secret) -> Option<u64> {
    secret.metadata.resource_version.as_deref()?.parse().ok()
}

/// Whether `incoming` is strictly older than `current`; unknown when either
/// resourceVersion is not numeric
fn is_older(incoming: &Secret, current: &Secret) -> bool {
    matches!((revision(incoming), revision(current)), (Some(a), Some(b)) if a < b)
}
