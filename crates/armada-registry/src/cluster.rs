//! Cluster domain types
//!
//! A [`Cluster`] is the unit of registration: the connection URI of a target
//! cluster plus the credentials and metadata needed to deploy to it.

use std::collections::BTreeMap;

use armada_common::{LOCAL_CLUSTER_NAME, LOCAL_CLUSTER_SERVER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::naming::normalize_server;

/// A registered target cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Canonical connection URI; the business key
    pub server: String,
    /// Display name; defaults to `server` when stored
    pub name: String,
    /// Credentials and transport settings
    #[serde(default)]
    pub config: ClusterConfig,
    /// Namespaces managed on this cluster; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Logical grouping tag
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// Controller shard pinned to this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<i64>,
    /// Whether cluster-scoped resources are managed when `namespaces` is set
    #[serde(default)]
    pub cluster_resources: bool,
    /// Passthrough labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Passthrough annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// When set, asks consumers to re-probe this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_requested_at: Option<DateTime<Utc>>,
    /// Runtime connection state, populated by consumers; never persisted
    #[serde(skip)]
    pub connection_state: ConnectionState,
}

impl Cluster {
    /// Create a cluster with just a server and display name
    pub fn new(server: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// The synthesized registration for the cluster hosting the control plane
    ///
    /// Empty config means "use ambient in-process credentials".
    pub fn local() -> Self {
        Self::new(LOCAL_CLUSTER_SERVER, LOCAL_CLUSTER_NAME)
    }

    /// Whether this cluster points at the control plane's own cluster
    pub fn is_local(&self) -> bool {
        is_local_server(&self.server)
    }
}

/// Whether `server` denotes the cluster the control plane runs in
pub fn is_local_server(server: &str) -> bool {
    normalize_server(server) == normalize_server(LOCAL_CLUSTER_SERVER)
}

/// Credentials and transport settings for reaching a cluster
///
/// Opaque to the registry beyond being serializable. Unknown JSON fields are
/// ignored so records written by newer versions still decode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Basic auth username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    /// TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_client_config: Option<TlsClientConfig>,
    /// AWS IAM authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_auth_config: Option<AwsAuthConfig>,
    /// External credential plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_provider_config: Option<ExecProviderConfig>,
    /// HTTP proxy URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Disable response compression
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable_compression: bool,
}

impl ClusterConfig {
    /// Whether no credentials are configured
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// TLS settings for a cluster connection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsClientConfig {
    /// Skip server certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Server name for SNI and verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Client certificate PEM, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_data: Option<String>,
    /// Client key PEM, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_data: Option<String>,
    /// CA bundle PEM, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_data: Option<String>,
}

/// AWS IAM authentication settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAuthConfig {
    /// EKS cluster name
    pub cluster_name: String,
    /// IAM role to assume
    #[serde(default, rename = "roleARN", skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    /// Named AWS profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// External credential plugin settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecProviderConfig {
    /// Command to run
    pub command: String,
    /// Arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// client.authentication.k8s.io version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Message shown when the command is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,
}

/// Connection health as observed by consumers
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionState {
    /// Last observed status
    pub status: ConnectionStatus,
    /// Detail for the status
    pub message: String,
    /// When the status last changed
    pub modified_at: Option<DateTime<Utc>>,
}

/// Connection status values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not yet probed
    #[default]
    Unknown,
    /// Last probe succeeded
    Successful,
    /// Last probe failed
    Failed,
}

/// Result of looking up a cluster by server
///
/// Distinguishes persistence-backed records from the ephemeral local cluster
/// materialized at read time.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterLookup {
    /// Backed by a stored record
    Stored(Cluster),
    /// Synthesized at read time; nothing is stored
    Synthesized(Cluster),
}

impl ClusterLookup {
    /// The cluster regardless of origin
    pub fn into_cluster(self) -> Cluster {
        match self {
            Self::Stored(c) | Self::Synthesized(c) => c,
        }
    }

    /// Borrow the cluster regardless of origin
    pub fn cluster(&self) -> &Cluster {
        match self {
            Self::Stored(c) | Self::Synthesized(c) => c,
        }
    }

    /// Whether the cluster is backed by a stored record
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}
