//! Single resource deletion with retries.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::ResourceBackend;
use crate::config::CleanupSettings;
use crate::error::{CleanupError, Result};
use crate::plan::{DeleteDirective, ResourceKind};
use crate::retry::retry_on_error;
use crate::verify;

/// Deletes resources named by plan directives.
///
/// Cheap to clone; bulk deletion hands a clone to every spawned task.
#[derive(Clone)]
pub struct Deleter {
    backend: Arc<dyn ResourceBackend>,
    settings: Arc<CleanupSettings>,
    cancel: CancellationToken,
}

impl Deleter {
    pub fn new(
        backend: Arc<dyn ResourceBackend>,
        settings: Arc<CleanupSettings>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            settings,
            cancel,
        }
    }

    pub fn backend(&self) -> &dyn ResourceBackend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> &CleanupSettings {
        &self.settings
    }

    /// Deletes the resource named by a single-resource directive, waiting for
    /// it to disappear when blocking deletion is enabled.
    pub async fn delete_single(&self, directive: &DeleteDirective) -> Result<()> {
        let Some(name) = directive.name() else {
            return self.delete_all(directive).await;
        };
        info!(
            gvr = %directive.kind,
            name,
            namespace = directive.namespace(),
            "Deleting resource"
        );
        self.delete_resource(
            directive,
            directive.namespace(),
            name,
            self.settings.blocking_deletion,
        )
        .await
    }

    /// Deletes one resource with background propagation.
    ///
    /// A missing resource counts as deleted. Transient failures are retried
    /// with [`CleanupSettings::backoff`]. When the final attempt fails, the
    /// error is returned for must-delete directives and logged otherwise.
    /// With `wait` set, the resource is then polled until it is gone.
    pub async fn delete_resource(
        &self,
        directive: &DeleteDirective,
        namespace: Option<&str>,
        name: &str,
        wait: bool,
    ) -> Result<()> {
        let kind = &directive.kind;
        let result = retry_on_error(&self.settings.backoff, &self.cancel, || {
            self.backend.delete(kind, namespace, name)
        })
        .await;

        match result {
            Ok(()) => info!(gvr = %kind, name, namespace, "Resource deletion initiated"),
            Err(CleanupError::Backend(err)) if err.is_not_found() => {
                warn!(gvr = %kind, name, namespace, error = %err, "resource not found, skipping");
            }
            Err(CleanupError::Cancelled) => return Err(CleanupError::Cancelled),
            Err(err) if directive.must_delete => {
                error!(
                    gvr = %kind,
                    name,
                    namespace,
                    error = %err,
                    "resource deletion failed after retries"
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    gvr = %kind,
                    name,
                    namespace,
                    error = %err,
                    "resource deletion failed after retries"
                );
            }
        }

        if wait {
            if let Err(err) = self.wait_for_deletion(kind, namespace, name).await {
                error!(
                    gvr = %kind,
                    name,
                    namespace,
                    error = %err,
                    "failed to verify resource deletion"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// Polls until the resource is gone, using the configured interval and timeout.
    pub async fn wait_for_deletion(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        verify::wait_for_deletion(
            self.backend.as_ref(),
            kind,
            namespace,
            name,
            self.settings.deletion_interval,
            self.settings.deletion_timeout,
            &self.cancel,
        )
        .await
    }
}
