//! Recording in-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cleanup::{
    BackendError, CleanupSettings, DeleteDirective, ResourceBackend, ResourceKind, ResourceScope,
};
use kube::api::{ApiResource, DynamicObject};
use kube::core::ErrorResponse;
use kube::ResourceExt;

/// A backend call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scope(ResourceKind),
    List {
        kind: ResourceKind,
        namespace: Option<String>,
    },
    Get {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    Delete {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    Update {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
}

impl Call {
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    pub fn is_get(&self) -> bool {
        matches!(self, Self::Get { .. })
    }
}

/// Failure injected into a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Network timeout, retried
    Transient,
    /// Permission denied, not retried
    Forbidden,
}

impl Failure {
    fn error(self) -> BackendError {
        match self {
            Self::Transient => {
                BackendError::Transient("net/http: TLS handshake timeout".to_string())
            }
            Self::Forbidden => BackendError::Api(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "forbidden".to_string(),
                reason: "Forbidden".to_string(),
                code: 403,
            })),
        }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    kind: ResourceKind,
    object: DynamicObject,
    /// Gets that still see the object after deletion; `None` while not deleting
    remaining_gets: Option<u32>,
}

#[derive(Default)]
struct State {
    objects: Vec<Stored>,
    calls: Vec<Call>,
    delete_failures: HashMap<String, VecDeque<Failure>>,
    lingering: HashMap<String, u32>,
    next_uid: u32,
}

/// In-memory [`ResourceBackend`] that records every call.
#[derive(Default, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a namespace object.
    pub fn add_namespace(&self, name: &str) -> &Self {
        self.add(&ResourceKind::namespaces(), None, name)
    }

    /// Stores a resource and returns `self` for chaining.
    pub fn add(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.next_uid += 1;
        let mut object = DynamicObject::new(name, &api_resource(kind));
        object.metadata.namespace = namespace.map(str::to_string);
        object.metadata.uid = Some(format!("uid-{name}-{}", state.next_uid));
        state.objects.push(Stored {
            kind: kind.clone(),
            object,
            remaining_gets: None,
        });
        self
    }

    /// Makes the next deletes of `name` fail with `failures`, in order.
    pub fn fail_deletes(&self, name: &str, failures: &[Failure]) -> &Self {
        self.state
            .lock()
            .unwrap()
            .delete_failures
            .entry(name.to_string())
            .or_default()
            .extend(failures.iter().copied());
        self
    }

    /// Keeps `name` visible to `gets` further gets once deleted.
    pub fn linger(&self, name: &str, gets: u32) -> &Self {
        self.state
            .lock()
            .unwrap()
            .lingering
            .insert(name.to_string(), gets);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn exists(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> bool {
        self.object(kind, namespace, name).is_some()
    }

    pub fn object(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .find(|stored| matches(stored, kind, namespace, name))
            .map(|stored| stored.object.clone())
    }
}

fn matches(stored: &Stored, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> bool {
    stored.kind == *kind
        && stored.object.metadata.namespace.as_deref() == namespace
        && stored.object.name_any() == name
}

fn scope_of(kind: &ResourceKind) -> ResourceScope {
    match kind.resource.as_str() {
        "namespaces" | "clusterroles" | "clusterrolebindings" | "nodes" => ResourceScope::Cluster,
        _ => ResourceScope::Namespaced,
    }
}

fn api_resource(kind: &ResourceKind) -> ApiResource {
    let kind_name = match kind.resource.as_str() {
        "namespaces" => "Namespace",
        "pods" => "Pod",
        "jobs" => "Job",
        "daemonsets" => "DaemonSet",
        "deployments" => "Deployment",
        "configmaps" => "ConfigMap",
        "serviceaccounts" => "ServiceAccount",
        "roles" => "Role",
        "rolebindings" => "RoleBinding",
        "clusterroles" => "ClusterRole",
        "clusterrolebindings" => "ClusterRoleBinding",
        other => other,
    };
    ApiResource {
        group: kind.group.clone(),
        version: kind.version.clone(),
        api_version: kind.api_version(),
        kind: kind_name.to_string(),
        plural: kind.resource.clone(),
    }
}

fn not_found(kind: &ResourceKind, name: &str) -> BackendError {
    BackendError::NotFound {
        resource: format!("{} \"{name}\" not found", kind.resource),
    }
}

#[async_trait]
impl ResourceBackend for FakeBackend {
    async fn scope(&self, kind: &ResourceKind) -> Result<ResourceScope, BackendError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Scope(kind.clone()));
        Ok(scope_of(kind))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List {
            kind: kind.clone(),
            namespace: namespace.map(str::to_string),
        });
        Ok(state
            .objects
            .iter()
            .filter(|stored| stored.kind == *kind && stored.remaining_gets.is_none())
            .filter(|stored| {
                namespace.is_none() || stored.object.metadata.namespace.as_deref() == namespace
            })
            .map(|stored| stored.object.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get {
            kind: kind.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });

        let index = state
            .objects
            .iter()
            .position(|stored| matches(stored, kind, namespace, name))
            .ok_or_else(|| not_found(kind, name))?;
        match state.objects[index].remaining_gets {
            Some(0) => {
                state.objects.remove(index);
                Err(not_found(kind, name))
            }
            Some(remaining) => {
                state.objects[index].remaining_gets = Some(remaining - 1);
                Ok(state.objects[index].object.clone())
            }
            None => Ok(state.objects[index].object.clone()),
        }
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete {
            kind: kind.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });

        if let Some(failure) = state
            .delete_failures
            .get_mut(name)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure.error());
        }

        let index = state
            .objects
            .iter()
            .position(|stored| {
                matches(stored, kind, namespace, name) && stored.remaining_gets.is_none()
            })
            .ok_or_else(|| not_found(kind, name))?;
        match state.lingering.get(name).copied() {
            Some(gets) => state.objects[index].remaining_gets = Some(gets),
            None => {
                state.objects.remove(index);
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, BackendError> {
        let mut state = self.state.lock().unwrap();
        let namespace = object.metadata.namespace.clone();
        let name = object.name_any();
        state.calls.push(Call::Update {
            kind: kind.clone(),
            namespace: namespace.clone(),
            name: name.clone(),
        });

        let stored = state
            .objects
            .iter_mut()
            .find(|stored| matches(stored, kind, namespace.as_deref(), &name))
            .ok_or_else(|| not_found(kind, &name))?;
        stored.object = object.clone();
        Ok(object.clone())
    }
}

/// Settings with blocking deletion toggled and every other value at its default.
pub fn settings(blocking_deletion: bool) -> CleanupSettings {
    CleanupSettings {
        blocking_deletion,
        ..CleanupSettings::default()
    }
}

pub fn pods() -> ResourceKind {
    ResourceKind::new("", "v1", "pods")
}

pub fn jobs() -> ResourceKind {
    ResourceKind::new("batch", "v1", "jobs")
}

pub fn config_maps() -> ResourceKind {
    ResourceKind::new("", "v1", "configmaps")
}

/// Directive for the agent's own Job, always last in a plan.
pub fn self_job(namespace: &str) -> DeleteDirective {
    DeleteDirective::named(jobs(), Some(namespace), "spectro-cleanup")
}

/// Stores the agent's Job together with its ServiceAccount, Role and RoleBinding.
pub fn add_agent_objects(backend: &FakeBackend, namespace: &str) {
    backend
        .add(&jobs(), Some(namespace), "spectro-cleanup")
        .add(&ResourceKind::service_accounts(), Some(namespace), "spectro-cleanup")
        .add(&ResourceKind::roles(), Some(namespace), "spectro-cleanup-role")
        .add(
            &ResourceKind::role_bindings(),
            Some(namespace),
            "spectro-cleanup-rolebinding",
        );
}
