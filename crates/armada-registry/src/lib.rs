//! Cluster registry for Armada
//!
//! Records which target clusters the control plane may deploy to. Each
//! cluster is persisted as a labelled Secret; [`ClusterRegistry`] serves
//! reads from an in-memory cache kept in sync by a backend watch and fans
//! changes out to in-process subscribers.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> armada_common::Result<()> {
//! use armada_registry::{Cluster, ClusterRegistry, RegistryConfig};
//!
//! let client = kube::Client::try_default().await?;
//! let registry = ClusterRegistry::start_with_client(client, RegistryConfig::default()).await?;
//! registry
//!     .create_cluster(&Cluster::new("https://10.0.0.1:6443", "staging"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod cache;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod naming;
pub mod registry;
pub mod store;
mod watch;

pub use cluster::{
    AwsAuthConfig, Cluster, ClusterConfig, ClusterLookup, ConnectionState, ConnectionStatus,
    ExecProviderConfig, TlsClientConfig,
};
pub use config::RegistryConfig;
pub use registry::ClusterRegistry;
pub use store::{KubeSecretStore, MemorySecretStore, SecretEvent, SecretStore};
