//! Secret storage backends
//!
//! The registry talks to storage only through [`SecretStore`]. Two backends
//! ship with the crate: [`KubeSecretStore`] against a live API server and
//! [`MemorySecretStore`] for tests and embedding.

mod kubernetes;
mod memory;

pub use self::kubernetes::KubeSecretStore;
pub use self::memory::MemorySecretStore;

use std::collections::BTreeMap;

use armada_common::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Secret;

#[cfg(test)]
use mockall::automock;

/// A change observed on the backend
#[derive(Clone, Debug, PartialEq)]
pub enum SecretEvent {
    /// Secret appeared
    Added(Secret),
    /// Secret changed
    Modified(Secret),
    /// Secret removed; carries its last known state
    Deleted(Secret),
}

impl SecretEvent {
    /// The Secret the event refers to
    pub fn secret(&self) -> &Secret {
        match self {
            Self::Added(s) | Self::Modified(s) | Self::Deleted(s) => s,
        }
    }
}

/// Namespaced Secret storage
///
/// Errors use the registry taxonomy: `create` reports `AlreadyExists`,
/// `update` reports `NotFound` or `Conflict` when the Secret's
/// resourceVersion is stale, `delete` reports `NotFound`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a Secret by name
    async fn get(&self, name: &str) -> Result<Option<Secret>>;

    /// Create a Secret; its name must be set
    async fn create(&self, secret: &Secret) -> Result<Secret>;

    /// Replace a Secret, checking its resourceVersion when set
    async fn update(&self, secret: &Secret) -> Result<Secret>;

    /// Delete a Secret by name
    async fn delete(&self, name: &str) -> Result<()>;

    /// List Secrets matching an equality label selector
    async fn list(&self, selector: &str) -> Result<Vec<Secret>>;

    /// Stream changes to Secrets matching an equality label selector
    ///
    /// An `Err` item is terminal; the stream ends after yielding it.
    fn watch(&self, selector: &str) -> BoxStream<'static, Result<SecretEvent>>;
}

/// Parsed equality label selector (`k=v`, `k==v`, comma separated)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Parse a selector string; an empty string matches everything
    pub fn parse(selector: &str) -> Result<Self> {
        let mut requirements = BTreeMap::new();
        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "unsupported label selector term {:?}",
                        term
                    ))
                })?;
            let key = key.trim();
            if key.is_empty() || key.ends_with('!') {
                return Err(Error::invalid_argument(format!(
                    "unsupported label selector term {:?}",
                    term
                )));
            }
            requirements.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { requirements })
    }

    /// Whether the given labels satisfy every requirement
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}
