//! Deletion of every resource of a kind.

use kube::ResourceExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::backend::ResourceScope;
use crate::delete::Deleter;
use crate::error::{CleanupError, Result};
use crate::plan::{DeleteDirective, ResourceKind};

/// A listed resource scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub namespace: Option<String>,
    pub name: String,
}

impl Instance {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl Deleter {
    /// Deletes every resource of the directive's kind, restricted to the
    /// directive's namespace when one is set.
    pub async fn delete_all(&self, directive: &DeleteDirective) -> Result<()> {
        info!(
            gvr = %directive.kind,
            namespace = directive.namespace(),
            "Deleting all resources of type"
        );

        let instances = self.list_instances(directive).await?;
        if instances.is_empty() {
            warn!(
                gvr = %directive.kind,
                namespace = directive.namespace(),
                "no resources found, skipping"
            );
            return Ok(());
        }

        if self.settings().blocking_deletion {
            self.delete_all_blocking(directive, instances).await
        } else {
            self.delete_all_sequential(directive, &instances).await
        }
    }

    /// Enumerates the resources a bulk directive covers.
    ///
    /// Namespaced kinds are listed namespace by namespace; cluster-scoped kinds
    /// with a single global listing.
    pub async fn list_instances(&self, directive: &DeleteDirective) -> Result<Vec<Instance>> {
        let kind = &directive.kind;
        let scope = self.backend().scope(kind).await.map_err(|err| {
            error!(gvr = %kind, error = %err, "failed to resolve resource scope");
            CleanupError::Backend(err)
        })?;

        let objects = match scope {
            ResourceScope::Cluster => self.list(kind, None).await?,
            ResourceScope::Namespaced => {
                let namespaces = self
                    .backend()
                    .list(&ResourceKind::namespaces(), None)
                    .await
                    .map_err(|err| {
                        error!(error = %err, "failed to list namespaces");
                        CleanupError::Backend(err)
                    })?;

                let mut objects = Vec::new();
                for namespace in namespaces.iter().map(|ns| ns.name_any()) {
                    if directive.namespace().is_some_and(|ns| ns != namespace) {
                        info!(gvr = %kind, namespace = %namespace, "skipping namespace");
                        continue;
                    }
                    objects.extend(self.list(kind, Some(&namespace)).await?);
                }
                objects
            }
        };

        Ok(objects
            .iter()
            .map(|object| Instance {
                namespace: object
                    .namespace()
                    .filter(|ns| !ns.is_empty())
                    .or_else(|| directive.namespace.clone()),
                name: object.name_any(),
            })
            .collect())
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<kube::api::DynamicObject>> {
        self.backend().list(kind, namespace).await.map_err(|err| {
            error!(gvr = %kind, namespace, error = %err, "failed to list resources");
            CleanupError::Backend(err)
        })
    }

    async fn delete_all_sequential(
        &self,
        directive: &DeleteDirective,
        instances: &[Instance],
    ) -> Result<()> {
        for instance in instances {
            info!(
                gvr = %directive.kind,
                name = %instance.name,
                namespace = instance.namespace(),
                "Deleting resource"
            );
            if let Err(err) = self
                .delete_resource(directive, instance.namespace(), &instance.name, false)
                .await
            {
                if directive.must_delete || err.is_cancelled() {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Initiates every deletion concurrently, then verifies every deletion
    /// concurrently. No verification starts before all initiations finish.
    async fn delete_all_blocking(
        &self,
        directive: &DeleteDirective,
        instances: Vec<Instance>,
    ) -> Result<()> {
        let mut initiations = JoinSet::new();
        for instance in instances.clone() {
            let deleter = self.clone();
            let directive = directive.clone();
            initiations.spawn(async move {
                info!(
                    gvr = %directive.kind,
                    name = %instance.name,
                    namespace = instance.namespace(),
                    "Deleting resource"
                );
                deleter
                    .delete_resource(&directive, instance.namespace(), &instance.name, false)
                    .await
                    .map_err(|err| instance_failed(&instance, err))
            });
        }
        let initiation_errors = join_all(initiations).await;

        let mut verifications = JoinSet::new();
        for instance in instances {
            let deleter = self.clone();
            let kind = directive.kind.clone();
            verifications.spawn(async move {
                deleter
                    .wait_for_deletion(&kind, instance.namespace(), &instance.name)
                    .await
                    .map_err(|err| instance_failed(&instance, err))
            });
        }
        let verification_errors = join_all(verifications).await;

        let mut errors: Vec<CleanupError> = initiation_errors
            .into_iter()
            .chain(verification_errors)
            .collect();
        if let Some(index) = errors.iter().position(CleanupError::is_cancelled) {
            return Err(errors.swap_remove(index));
        }
        if directive.must_delete && !errors.is_empty() {
            return Err(errors.remove(0));
        }
        for err in errors {
            error!(gvr = %directive.kind, error = %err, "resource deletion failed");
        }
        Ok(())
    }
}

fn instance_failed(instance: &Instance, err: CleanupError) -> CleanupError {
    CleanupError::InstanceFailed {
        name: instance.name.clone(),
        source: Box::new(err),
    }
}

/// Waits for every task, collecting failures in completion order.
async fn join_all(mut tasks: JoinSet<Result<()>>) -> Vec<CleanupError> {
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(err),
            Err(err) => errors.push(CleanupError::TaskFailed(err)),
        }
    }
    errors
}
