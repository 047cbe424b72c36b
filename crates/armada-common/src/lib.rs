//! Common types for Armada: errors, settings access, and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod settings;
pub mod telemetry;

pub use error::{Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace holding cluster registration secrets and settings
pub const DEFAULT_NAMESPACE: &str = "armada";

/// Environment variable overriding the registry namespace
pub const NAMESPACE_ENV: &str = "ARMADA_NAMESPACE";

/// Label key marking what kind of record a Secret holds
pub const SECRET_TYPE_LABEL_KEY: &str = "armada.dev/secret-type";

/// Label value for Secrets that hold cluster registrations
pub const SECRET_TYPE_CLUSTER: &str = "cluster";

/// Label selector scoping list/watch calls to cluster registrations
pub const CLUSTER_SECRET_SELECTOR: &str = "armada.dev/secret-type=cluster";

/// Annotation recording when a cluster refresh was requested (RFC3339)
pub const REFRESH_ANNOTATION_KEY: &str = "armada.dev/refresh";

/// Bookkeeping annotation written by `kubectl apply`; never stored or surfaced
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Server address of the cluster the control plane itself runs in
pub const LOCAL_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Display name of the synthesized local cluster
pub const LOCAL_CLUSTER_NAME: &str = "in-cluster";

/// Prefix for generated cluster record names
pub const CLUSTER_NAME_PREFIX: &str = "cluster";

/// Name of the ConfigMap holding instance-wide settings
pub const SETTINGS_CONFIG_MAP: &str = "armada-cm";

/// Settings key toggling the local cluster
pub const IN_CLUSTER_ENABLED_KEY: &str = "cluster.inClusterEnabled";
