//! Error types for the cleanup agent.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CleanupError> = std::result::Result<T, E>;

/// Outcome classes reported by a [`ResourceBackend`](crate::ResourceBackend).
///
/// `NotFound` is kept separate from every other failure: an absent resource
/// satisfies a deletion and must never be reported as an error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The resource does not exist
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// Network or TLS handshake timeout
    #[error("transient API failure: {0}")]
    Transient(String),

    /// Any other Kubernetes API failure
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),

    /// The resource kind is not served by the API server
    #[error("resource {0} is not served by the API server")]
    Discovery(String),
}

impl BackendError {
    /// Returns true if the backend reported the resource as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for failures worth another attempt (network and TLS timeouts).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<kube::Error> for BackendError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                resource: response.message,
            },
            err if is_timeout(&err) => Self::Transient(err.to_string()),
            err => Self::Api(err),
        }
    }
}

/// Walks the source chain looking for a connect, read or TLS handshake timeout.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        let message = err.to_string();
        if message.contains("TLS handshake timeout")
            || message.contains("timed out")
            || message.contains("deadline has elapsed")
        {
            return true;
        }
        current = err.source();
    }
    false
}

/// Errors produced while cleaning up files and resources.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to read {config_type} config at {}: {source}", .path.display())]
    ReadConfig {
        config_type: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unmarshal {config_type} config: {source}")]
    MalformedConfig {
        config_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Non-retryable backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("resource deletion failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("timed out after {timeout:?} waiting for {gvr} {name} to be deleted")]
    VerificationTimeout {
        gvr: String,
        namespace: Option<String>,
        name: String,
        timeout: Duration,
    },

    /// A `FinalizeCleanup` notification arrived while no run was waiting for one
    #[error("illegally notified cleanup prior to cleanup resources call")]
    IllegalNotification,

    #[error("failed to set owner reference on {gvr} {name}: {source}")]
    OwnerReference {
        gvr: String,
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("owner resource {gvr} {name} is missing {field}")]
    IncompleteOwner {
        gvr: String,
        name: String,
        field: &'static str,
    },

    #[error("resource {name} deletion failed: {source}")]
    InstanceFailed {
        name: String,
        #[source]
        source: Box<CleanupError>,
    },

    #[error("resource deletion failed for {gvr}: {source}")]
    DirectiveFailed {
        gvr: String,
        #[source]
        source: Box<CleanupError>,
    },

    #[error("cleanup task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("cleanup cancelled")]
    Cancelled,
}

impl CleanupError {
    /// Returns true if this error, or any error it wraps, is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::InstanceFailed { source, .. } | Self::DirectiveFailed { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }
}
