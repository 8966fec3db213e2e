//! Plan execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backend::ResourceBackend;
use crate::config::CleanupSettings;
use crate::coordinator::await_self_destruct;
use crate::delete::Deleter;
use crate::error::{CleanupError, Result};
use crate::files;
use crate::ownership::chain_owner_references;
use crate::plan::{self, DeleteDirective};
use crate::signal::FinalizeSignal;

/// Runs a cleanup: files first, then the ordered resource plan.
///
/// The last directive in the plan must name the agent's own workload. Before
/// deleting it, the agent's RBAC objects are chained to it and the
/// self-destruct coordinator decides when deletion may proceed.
pub struct Cleaner {
    deleter: Deleter,
    settings: Arc<CleanupSettings>,
    signal: FinalizeSignal,
    cancel: CancellationToken,
}

impl Cleaner {
    pub fn new(backend: Arc<dyn ResourceBackend>, settings: CleanupSettings) -> Self {
        Self::with_cancellation(backend, settings, CancellationToken::new())
    }

    pub fn with_cancellation(
        backend: Arc<dyn ResourceBackend>,
        settings: CleanupSettings,
        cancel: CancellationToken,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            deleter: Deleter::new(backend, Arc::clone(&settings), cancel.clone()),
            settings,
            signal: FinalizeSignal::new(),
            cancel,
        }
    }

    /// Handle for delivering `FinalizeCleanup` notifications to this cleaner.
    pub fn signal(&self) -> FinalizeSignal {
        self.signal.clone()
    }

    pub fn settings(&self) -> &CleanupSettings {
        &self.settings
    }

    /// Deletes the files listed in the file plan.
    pub async fn cleanup_files(&self) -> Result<usize> {
        files::cleanup_files(&self.settings.file_config_path).await
    }

    /// Loads the resource plan and executes it.
    pub async fn cleanup_resources(&self) -> Result<()> {
        let plan = plan::load_plan(&self.settings.resource_config_path)
            .await
            .map_err(|err| {
                error!(error = %err, "failed to load resource cleanup config");
                err
            })?;
        self.execute_plan(&plan).await
    }

    /// Walks the plan once, in order.
    ///
    /// A failed must-delete directive aborts the run; other failures are
    /// logged and the walk continues. The notification window is open for the
    /// whole run and closed on every exit path.
    pub async fn execute_plan(&self, plan: &[DeleteDirective]) -> Result<()> {
        let notifications = self.signal.arm().await;
        let result = self.walk(plan, notifications).await;
        self.signal.disarm().await;
        result
    }

    async fn walk(
        &self,
        plan: &[DeleteDirective],
        mut notifications: tokio::sync::mpsc::Receiver<()>,
    ) -> Result<()> {
        let last = plan.len().saturating_sub(1);
        for (index, directive) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(CleanupError::Cancelled);
            }

            if index == last {
                chain_owner_references(
                    self.deleter.backend(),
                    directive,
                    &self.settings.access,
                )
                .await?;

                let trigger = await_self_destruct(
                    self.settings.blocking_deletion,
                    &mut notifications,
                    self.settings.cleanup_timeout,
                    &self.cancel,
                )
                .await?;
                self.signal.disarm().await;
                info!(?trigger, "Self-destruct condition met");
            }

            let result = match directive.name() {
                Some(name) => {
                    info!(
                        gvr = %directive.kind,
                        name,
                        namespace = directive.namespace(),
                        "deleting resource"
                    );
                    self.deleter.delete_single(directive).await
                }
                None => self.deleter.delete_all(directive).await,
            };

            match result {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) if directive.must_delete => {
                    error!(gvr = %directive.kind, error = %err, "resource deletion failed");
                    return Err(CleanupError::DirectiveFailed {
                        gvr: directive.kind.to_string(),
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    error!(
                        gvr = %directive.kind,
                        error = %err,
                        "resource deletion failed, continuing"
                    );
                }
            }
        }
        Ok(())
    }
}
