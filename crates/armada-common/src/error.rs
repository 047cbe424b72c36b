//! Error types for the Armada cluster registry
//!
//! Every error maps onto an [`ErrorKind`] so callers can tell "nothing there"
//! from "already there" from "your input was wrong" without matching on
//! messages. Transport layers translate kinds into their own status codes.

use thiserror::Error;

/// Classification of an [`Error`] for caller-side handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: bad URI, bad config JSON, reserved annotation, missing field
    InvalidArgument,
    /// Get/update/delete of an absent record
    NotFound,
    /// Create of a record whose identifier already exists
    AlreadyExists,
    /// Operation not allowed in the current settings (e.g. local cluster disabled)
    PreconditionFailed,
    /// Optimistic-concurrency rejection from the backend
    Conflict,
    /// Backend or transport failure
    Unavailable,
    /// Bug or unexpected state inside the registry
    Internal,
}

/// Main error type for registry operations
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation before reaching the backend
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what's invalid
        message: String,
        /// The offending field or record name, when known
        field: Option<String>,
    },

    /// Record does not exist
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Kind of record (e.g. "cluster", "secret")
        kind: String,
        /// Server address or record name
        name: String,
    },

    /// Record already exists
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists {
        /// Kind of record (e.g. "cluster", "secret")
        kind: String,
        /// Server address or record name
        name: String,
    },

    /// Operation rejected by instance settings
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Description of the unmet precondition
        message: String,
    },

    /// Backend rejected a write because the record changed underneath it
    #[error("conflict updating {name}: {message}")]
    Conflict {
        /// Record name
        name: String,
        /// Backend message
        message: String,
    },

    /// Backend unreachable or watch stream failed
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error not covered by the other variants
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "cache", "watch")
        context: String,
    },
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
            field: None,
        }
    }

    /// Create an invalid-argument error naming the offending field or record
    pub fn invalid_argument_for(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error for a cluster server
    pub fn cluster_not_found(server: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "cluster".to_string(),
            name: server.into(),
        }
    }

    /// Create a not-found error for a backend record
    pub fn record_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "secret".to_string(),
            name: name.into(),
        }
    }

    /// Create an already-exists error for a cluster server
    pub fn cluster_already_exists(server: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "cluster".to_string(),
            name: server.into(),
        }
    }

    /// Create an already-exists error for a backend record
    pub fn record_already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "secret".to_string(),
            name: name.into(),
        }
    }

    /// Create a precondition-failed error
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: msg.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Unavailable { .. } => ErrorKind::Unavailable,
            Error::Kube { .. } => ErrorKind::Unavailable,
            Error::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if the caller may retry this operation unchanged
    ///
    /// Conflicts succeed once re-read; transport failures may be transient.
    /// Kubernetes 4xx errors other than those mapped to dedicated variants
    /// are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict { .. } | Error::Unavailable { .. } => true,
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            _ => false,
        }
    }

    /// Map a kube-rs error for the named record onto the registry taxonomy
    ///
    /// 404 becomes `NotFound`, 409 becomes `AlreadyExists` or `Conflict`
    /// depending on the API reason. Everything else is propagated unchanged.
    pub fn from_kube(name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::record_not_found(name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::record_already_exists(name)
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(name, ae.message),
            other => Self::Kube { source: other },
        }
    }
}
