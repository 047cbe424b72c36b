//! Registry configuration
//!
//! Environment access goes through [`RegistryEnv`] so configuration can be
//! tested without touching process-global state.

use armada_common::{
    CLUSTER_NAME_PREFIX, DEFAULT_NAMESPACE, NAMESPACE_ENV, SETTINGS_CONFIG_MAP,
};

/// Source of environment overrides for the registry
#[cfg_attr(test, mockall::automock)]
pub trait RegistryEnv: Send + Sync {
    /// Namespace override, if set
    fn namespace(&self) -> Option<String>;
}

/// Reads overrides from process environment variables
#[derive(Clone, Default)]
pub struct OsEnv;

impl RegistryEnv for OsEnv {
    fn namespace(&self) -> Option<String> {
        std::env::var(NAMESPACE_ENV).ok()
    }
}

/// Where and how the registry stores cluster records
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Namespace holding cluster Secrets and the settings ConfigMap
    pub namespace: String,
    /// Prefix for generated record names
    pub name_prefix: String,
    /// Name of the settings ConfigMap
    pub settings_config_map: String,
}

impl RegistryConfig {
    /// Build a config for an explicit namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name_prefix: CLUSTER_NAME_PREFIX.to_string(),
            settings_config_map: SETTINGS_CONFIG_MAP.to_string(),
        }
    }

    /// Build a config from environment overrides
    ///
    /// An unset or empty namespace falls back to the default.
    pub fn from_env(env: &dyn RegistryEnv) -> Self {
        let namespace = env
            .namespace()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        Self::new(namespace)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from_env(&OsEnv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_override_wins() {
        let mut env = MockRegistryEnv::new();
        env.expect_namespace().returning(|| Some("cd-system".to_string()));

        let config = RegistryConfig::from_env(&env);
        assert_eq!(config.namespace, "cd-system");
        assert_eq!(config.name_prefix, CLUSTER_NAME_PREFIX);
        assert_eq!(config.settings_config_map, SETTINGS_CONFIG_MAP);
    }

    #[test]
    fn missing_or_empty_namespace_uses_default() {
        let mut env = MockRegistryEnv::new();
        env.expect_namespace().returning(|| None);
        assert_eq!(RegistryConfig::from_env(&env).namespace, DEFAULT_NAMESPACE);

        let mut env = MockRegistryEnv::new();
        env.expect_namespace().returning(|| Some(String::new()));
        assert_eq!(RegistryConfig::from_env(&env).namespace, DEFAULT_NAMESPACE);
    }
}
