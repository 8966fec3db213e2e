//! Polling for resource absence.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::ResourceBackend;
use crate::error::{CleanupError, Result};
use crate::plan::ResourceKind;

/// Polls the backend every `interval` until the resource is gone.
///
/// The first check runs immediately. A not-found response on any poll is
/// success; any other backend error aborts the wait. If the resource still
/// exists after `timeout` the result is [`CleanupError::VerificationTimeout`].
pub async fn wait_for_deletion(
    backend: &dyn ResourceBackend,
    kind: &ResourceKind,
    namespace: Option<&str>,
    name: &str,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    info!(gvr = %kind, name, namespace, "Waiting for resource to be deleted");

    let poll = async {
        loop {
            match backend.get(kind, namespace, name).await {
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => {
                    error!(gvr = %kind, name, namespace, error = %err, "failed to get resource");
                    return Err(CleanupError::Backend(err));
                }
                Ok(_) => debug!(gvr = %kind, name, namespace, "Resource still exists"),
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::select! {
        () = cancel.cancelled() => Err(CleanupError::Cancelled),
        result = tokio::time::timeout(timeout, poll) => match result {
            Ok(Ok(())) => {
                info!(gvr = %kind, name, namespace, "Resource deleted successfully");
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                error!(
                    gvr = %kind,
                    name,
                    namespace,
                    ?timeout,
                    "timed out waiting for resource deletion"
                );
                Err(CleanupError::VerificationTimeout {
                    gvr: kind.to_string(),
                    namespace: namespace.map(str::to_string),
                    name: name.to_string(),
                    timeout,
                })
            }
        },
    }
}
