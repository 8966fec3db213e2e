//! Owner references from the agent's RBAC objects to its own workload.
//!
//! Once the workload is deleted, the garbage collector removes the
//! ServiceAccount and the role objects it ran under.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::{error, info};

use crate::backend::ResourceBackend;
use crate::config::AccessObjects;
use crate::error::{BackendError, CleanupError, Result};
use crate::plan::{DeleteDirective, ResourceKind};

/// Builds an owner reference to the workload named by `owner` and appends it
/// to the ServiceAccount and then the Role/RoleBinding (or
/// ClusterRole/ClusterRoleBinding) pair.
///
/// Namespaced access objects are looked up in the owner's namespace.
pub async fn chain_owner_references(
    backend: &dyn ResourceBackend,
    owner: &DeleteDirective,
    access: &AccessObjects,
) -> Result<OwnerReference> {
    let owner_ref = owner_reference(backend, owner).await?;
    let namespace = owner.namespace();

    let mut targets = vec![(
        ResourceKind::service_accounts(),
        namespace,
        access.service_account.as_str(),
    )];
    match &access.cluster {
        Some(cluster) => {
            targets.push((ResourceKind::cluster_roles(), None, cluster.role.as_str()));
            targets.push((
                ResourceKind::cluster_role_bindings(),
                None,
                cluster.role_binding.as_str(),
            ));
        }
        None => {
            targets.push((ResourceKind::roles(), namespace, access.role.as_str()));
            targets.push((
                ResourceKind::role_bindings(),
                namespace,
                access.role_binding.as_str(),
            ));
        }
    }

    for (kind, namespace, name) in targets {
        append_owner_reference(backend, &kind, namespace, name, &owner_ref)
            .await
            .map_err(|source| CleanupError::OwnerReference {
                gvr: kind.to_string(),
                name: name.to_string(),
                source,
            })?;
    }
    Ok(owner_ref)
}

async fn owner_reference(
    backend: &dyn ResourceBackend,
    owner: &DeleteDirective,
) -> Result<OwnerReference> {
    let name = owner.name().unwrap_or_default();
    let object = backend
        .get(&owner.kind, owner.namespace(), name)
        .await
        .map_err(|source| {
            error!(gvr = %owner.kind, name, error = %source, "failed to get resource");
            CleanupError::OwnerReference {
                gvr: owner.kind.to_string(),
                name: name.to_string(),
                source,
            }
        })?;

    let incomplete = |field| CleanupError::IncompleteOwner {
        gvr: owner.kind.to_string(),
        name: name.to_string(),
        field,
    };
    let types = object.types.as_ref().ok_or_else(|| incomplete("kind"))?;
    let uid = object.uid().ok_or_else(|| incomplete("uid"))?;

    Ok(OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: object.name_any(),
        uid,
        ..OwnerReference::default()
    })
}

async fn append_owner_reference(
    backend: &dyn ResourceBackend,
    kind: &ResourceKind,
    namespace: Option<&str>,
    name: &str,
    owner_ref: &OwnerReference,
) -> std::result::Result<(), BackendError> {
    let mut object = backend.get(kind, namespace, name).await.map_err(|err| {
        error!(gvr = %kind, name, namespace, error = %err, "failed to get resource");
        err
    })?;

    object.owner_references_mut().push(owner_ref.clone());

    backend.update(kind, &object).await.map_err(|err| {
        error!(
            gvr = %kind,
            name,
            namespace,
            error = %err,
            "failed to update resource with owner reference"
        );
        err
    })?;

    info!(gvr = %kind, name, namespace, owner = %owner_ref.name, "Set cleanup ownerReference");
    Ok(())
}
