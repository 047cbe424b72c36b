//! Instance settings consumed by the registry
//!
//! The registry reads the in-cluster toggle on every create, list and watch
//! registration instead of caching it, so flipping the ConfigMap takes
//! effect on the next call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::debug;

use crate::{Error, Result, IN_CLUSTER_ENABLED_KEY};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Source of instance-wide settings
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Whether the cluster hosting the control plane may be registered and listed
    async fn in_cluster_enabled(&self) -> Result<bool>;
}

/// Interpret the in-cluster toggle from settings data
///
/// Only the literal `"false"` disables the local cluster; a missing map or key
/// leaves it enabled.
pub fn in_cluster_enabled_from(data: Option<&BTreeMap<String, String>>) -> bool {
    data.and_then(|d| d.get(IN_CLUSTER_ENABLED_KEY))
        .map(|v| v != "false")
        .unwrap_or(true)
}

/// Settings read from a ConfigMap in the registry namespace
#[derive(Clone)]
pub struct ConfigMapSettings {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapSettings {
    /// Create a reader for the named ConfigMap
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
        }
    }
}

#[async_trait]
impl SettingsSource for ConfigMapSettings {
    async fn in_cluster_enabled(&self) -> Result<bool> {
        let cm = self
            .api
            .get_opt(&self.name)
            .await
            .map_err(|e| Error::from_kube(&self.name, e))?;
        if cm.is_none() {
            debug!(config_map = %self.name, "Settings ConfigMap not found, using defaults");
        }
        Ok(in_cluster_enabled_from(
            cm.as_ref().and_then(|cm| cm.data.as_ref()),
        ))
    }
}

/// Fixed settings, flippable at runtime
///
/// Used when no ConfigMap backs the registry and in tests.
#[derive(Debug)]
pub struct StaticSettings {
    in_cluster_enabled: AtomicBool,
}

impl StaticSettings {
    /// Create settings with the given toggle value
    pub fn new(in_cluster_enabled: bool) -> Self {
        Self {
            in_cluster_enabled: AtomicBool::new(in_cluster_enabled),
        }
    }

    /// Flip the in-cluster toggle
    pub fn set_in_cluster_enabled(&self, enabled: bool) {
        self.in_cluster_enabled.store(enabled, Ordering::SeqCst);
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn in_cluster_enabled(&self) -> Result<bool> {
        Ok(self.in_cluster_enabled.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_enable_local_cluster() {
        assert!(in_cluster_enabled_from(None));
        assert!(in_cluster_enabled_from(Some(&BTreeMap::new())));
    }

    #[test]
    fn only_literal_false_disables() {
        let mut data = BTreeMap::new();
        data.insert(IN_CLUSTER_ENABLED_KEY.to_string(), "false".to_string());
        assert!(!in_cluster_enabled_from(Some(&data)));

        data.insert(IN_CLUSTER_ENABLED_KEY.to_string(), "FALSE".to_string());
        assert!(in_cluster_enabled_from(Some(&data)));

        data.insert(IN_CLUSTER_ENABLED_KEY.to_string(), "true".to_string());
        assert!(in_cluster_enabled_from(Some(&data)));
    }

    #[tokio::test]
    async fn static_settings_can_be_flipped() {
        let settings = StaticSettings::default();
        assert!(settings.in_cluster_enabled().await.unwrap());

        settings.set_in_cluster_enabled(false);
        assert!(!settings.in_cluster_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn settings_trait_is_mockable() {
        let mut mock = MockSettingsSource::new();
        mock.expect_in_cluster_enabled()
            .times(1)
            .returning(|| Err(Error::unavailable("connection refused")));

        let err = mock.in_cluster_enabled().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
