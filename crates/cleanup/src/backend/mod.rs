//! Resource backend abstraction.
//!
//! The cleanup core only talks to the cluster through [`ResourceBackend`].
//! [`KubeBackend`] implements it over the Kubernetes API; tests provide an
//! in-memory implementation.

mod client;

pub use client::KubeBackend;

use async_trait::async_trait;
use kube::api::DynamicObject;

use crate::error::BackendError;
use crate::plan::ResourceKind;

/// Whether a kind of resource lives inside namespaces or at cluster scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

/// Operations the cleanup core needs from the cluster.
///
/// Implementations must report a missing resource as
/// [`BackendError::NotFound`] and never fold it into another variant.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Resolve whether `kind` is namespaced or cluster-scoped.
    async fn scope(&self, kind: &ResourceKind) -> Result<ResourceScope, BackendError>;

    /// List resources of `kind`, in one namespace or across all of them.
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, BackendError>;

    /// Fetch a single resource.
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, BackendError>;

    /// Delete a single resource with background propagation.
    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), BackendError>;

    /// Replace a resource with `object`.
    async fn update(
        &self,
        kind: &ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, BackendError>;
}
