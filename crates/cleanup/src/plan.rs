//! Deletion plan types and loading.
//!
//! The plan is an ordered JSON array. The last entry must name the cleanup
//! agent's own Pod, Job or DaemonSet.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{CleanupError, Result};

/// Config type label for the file deletion plan
pub const FILES_TO_DELETE: &str = "filesToDelete";
/// Config type label for the resource deletion plan
pub const RESOURCES_TO_DELETE: &str = "resourcesToDelete";

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Group, version and plural resource name identifying a kind of resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKind {
    #[serde(default, alias = "Group")]
    pub group: String,
    #[serde(alias = "Version")]
    pub version: String,
    #[serde(alias = "Resource")]
    pub resource: String,
}

impl ResourceKind {
    #[must_use]
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    #[must_use]
    pub fn namespaces() -> Self {
        Self::new("", "v1", "namespaces")
    }

    #[must_use]
    pub fn service_accounts() -> Self {
        Self::new("", "v1", "serviceaccounts")
    }

    #[must_use]
    pub fn roles() -> Self {
        Self::new(RBAC_GROUP, "v1", "roles")
    }

    #[must_use]
    pub fn role_bindings() -> Self {
        Self::new(RBAC_GROUP, "v1", "rolebindings")
    }

    #[must_use]
    pub fn cluster_roles() -> Self {
        Self::new(RBAC_GROUP, "v1", "clusterroles")
    }

    #[must_use]
    pub fn cluster_role_bindings() -> Self {
        Self::new(RBAC_GROUP, "v1", "clusterrolebindings")
    }

    /// `apiVersion` string for this kind, e.g. `v1` or `apps/v1`.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Resource={}", self.api_version(), self.resource)
    }
}

/// One entry in the deletion plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDirective {
    #[serde(flatten)]
    pub kind: ResourceKind,

    /// Resource to delete. `None` deletes every resource of the kind.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    /// Namespace of the resource. With no name set, restricts bulk deletion to
    /// this namespace; `None` covers every namespace.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub namespace: Option<String>,

    /// Abort the whole cleanup if this resource cannot be deleted.
    #[serde(default)]
    pub must_delete: bool,
}

impl DeleteDirective {
    /// Directive for a single named resource.
    #[must_use]
    pub fn named(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind,
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            must_delete: false,
        }
    }

    /// Directive deleting every resource of `kind`, optionally within one namespace.
    #[must_use]
    pub fn all(kind: ResourceKind, namespace: Option<&str>) -> Self {
        Self {
            kind,
            name: None,
            namespace: namespace.map(str::to_string),
            must_delete: false,
        }
    }

    #[must_use]
    pub fn must_delete(mut self) -> Self {
        self.must_delete = true;
        self
    }

    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.name.is_none()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Reads a config file, returning `None` when it does not exist.
pub async fn read_config(path: &Path, config_type: &'static str) -> Result<Option<Vec<u8>>> {
    debug!(path = %path.display(), config_type, "Reading cleanup config");
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(config_type, "config file not found, skipping");
            Ok(None)
        }
        Err(source) => Err(CleanupError::ReadConfig {
            config_type,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses a resource deletion plan.
pub fn parse_plan(bytes: &[u8]) -> Result<Vec<DeleteDirective>> {
    serde_json::from_slice(bytes).map_err(|source| CleanupError::MalformedConfig {
        config_type: RESOURCES_TO_DELETE,
        source,
    })
}

/// Loads the resource deletion plan. A missing file is an empty plan.
pub async fn load_plan(path: &Path) -> Result<Vec<DeleteDirective>> {
    match read_config(path, RESOURCES_TO_DELETE).await? {
        Some(bytes) => parse_plan(&bytes),
        None => Ok(Vec::new()),
    }
}
