//! Kubernetes implementation of [`ResourceBackend`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersion;
use kube::discovery::{self, ApiResource, Scope};
use kube::{Client, Config, ResourceExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ResourceBackend, ResourceScope};
use crate::error::BackendError;
use crate::plan::ResourceKind;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ResourceBackend`] over `Api<DynamicObject>`.
///
/// Kinds are resolved through API discovery on first use and cached, so the
/// scope of a kind comes from the API server rather than from its name.
pub struct KubeBackend {
    client: Client,
    resources: Mutex<HashMap<ResourceKind, (ApiResource, ResourceScope)>>,
}

impl KubeBackend {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Build a client from the in-cluster environment (or a local kubeconfig)
    /// with request timeouts suited to a short-lived agent.
    pub async fn connect() -> Result<Self, BackendError> {
        let mut config = Config::infer().await.map_err(kube::Error::InferConfig)?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(REQUEST_TIMEOUT);
        config.write_timeout = Some(REQUEST_TIMEOUT);
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    async fn resolve(
        &self,
        kind: &ResourceKind,
    ) -> Result<(ApiResource, ResourceScope), BackendError> {
        let mut resources = self.resources.lock().await;
        if let Some(resolved) = resources.get(kind) {
            return Ok(resolved.clone());
        }

        let gv = GroupVersion::gv(&kind.group, &kind.version);
        let group = discovery::pinned_group(&self.client, &gv).await?;
        let (resource, capabilities) = group
            .versioned_resources(&kind.version)
            .into_iter()
            .find(|(resource, _)| resource.plural == kind.resource)
            .ok_or_else(|| BackendError::Discovery(kind.to_string()))?;
        let scope = match capabilities.scope {
            Scope::Namespaced => ResourceScope::Namespaced,
            Scope::Cluster => ResourceScope::Cluster,
        };
        debug!(gvr = %kind, kind = %resource.kind, ?scope, "Resolved resource kind");

        resources.insert(kind.clone(), (resource.clone(), scope));
        Ok((resource, scope))
    }

    async fn api(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, BackendError> {
        let (resource, scope) = self.resolve(kind).await?;
        let api = match (scope, namespace) {
            (ResourceScope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }
}

#[async_trait]
impl ResourceBackend for KubeBackend {
    async fn scope(&self, kind: &ResourceKind) -> Result<ResourceScope, BackendError> {
        Ok(self.resolve(kind).await?.1)
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, BackendError> {
        let api = self.api(kind, namespace).await?;
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, BackendError> {
        let api = self.api(kind, namespace).await?;
        Ok(api.get(name).await?)
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), BackendError> {
        let api = self.api(kind, namespace).await?;
        api.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, BackendError> {
        let api = self.api(kind, object.metadata.namespace.as_deref()).await?;
        Ok(api
            .replace(&object.name_any(), &PostParams::default(), object)
            .await?)
    }
}
