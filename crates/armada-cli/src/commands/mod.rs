//! CLI commands

use std::fmt::Display;
use std::path::{Path, PathBuf};

use armada_registry::{Cluster, ClusterConfig, ClusterRegistry, RegistryConfig};
use clap::{Args, ValueEnum};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

pub mod add;
pub mod format;
pub mod get;
pub mod list;
pub mod rm;
pub mod update;
pub mod watch;

/// Placeholder shown instead of credentials
const REDACTED: &str = "******";

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}

/// Build a kube [`Client`] from an explicit kubeconfig path or the defaults
pub async fn kube_client(kubeconfig: Option<&str>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default().await.cmd_err();
    };
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e)))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .cmd_err()?;
    Client::try_from(config).cmd_err()
}

/// Connect to the cluster and start a registry over the given namespace
pub async fn connect(kubeconfig: Option<&str>, namespace: &str) -> Result<ClusterRegistry> {
    let client = kube_client(kubeconfig).await?;
    debug!(namespace = %namespace, "Starting cluster registry");
    Ok(ClusterRegistry::start_with_client(client, RegistryConfig::new(namespace)).await?)
}

/// Parse a `KEY=VALUE` argument
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

/// Cluster fields settable from the command line
#[derive(Args, Debug, Default)]
pub struct ClusterFields {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,

    /// Project the cluster belongs to
    #[arg(long)]
    pub project: Option<String>,

    /// Namespace to manage on the cluster; repeat for several (default: all)
    #[arg(long = "namespace", value_name = "NAMESPACE")]
    pub namespaces: Vec<String>,

    /// Manage cluster-scoped resources even when namespaces are set
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub cluster_resources: Option<bool>,

    /// Controller shard to pin the cluster to
    #[arg(long)]
    pub shard: Option<i64>,

    /// Label to set; repeat for several
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// Annotation to set; repeat for several
    #[arg(long = "annotation", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub annotations: Vec<(String, String)>,

    /// JSON file with connection settings (bearerToken, tlsClientConfig, ...)
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

impl ClusterFields {
    /// Whether no field was supplied
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.project.is_none()
            && self.namespaces.is_empty()
            && self.cluster_resources.is_none()
            && self.shard.is_none()
            && self.labels.is_empty()
            && self.annotations.is_empty()
            && self.config_file.is_none()
    }

    /// Overlay the supplied fields onto `cluster`
    pub fn apply_to(self, cluster: &mut Cluster) -> Result<()> {
        if let Some(name) = self.name {
            cluster.name = name;
        }
        if let Some(project) = self.project {
            cluster.project = project;
        }
        if !self.namespaces.is_empty() {
            cluster.namespaces = self.namespaces;
        }
        if let Some(cluster_resources) = self.cluster_resources {
            cluster.cluster_resources = cluster_resources;
        }
        if let Some(shard) = self.shard {
            cluster.shard = Some(shard);
        }
        cluster.labels.extend(self.labels);
        cluster.annotations.extend(self.annotations);
        if let Some(path) = self.config_file {
            cluster.config = read_config_file(&path)?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ClusterConfig> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| Error::InvalidConfigFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Copy of `cluster` with credentials masked, for display
pub fn redacted(cluster: &Cluster) -> Cluster {
    let mut cluster = cluster.clone();
    let config = &mut cluster.config;
    for secret in [&mut config.password, &mut config.bearer_token] {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    }
    if let Some(tls) = config.tls_client_config.as_mut() {
        if tls.key_data.is_some() {
            tls.key_data = Some(REDACTED.to_string());
        }
    }
    cluster
}
