//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::retry::{Backoff, DELETE_BACKOFF};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Self-destructing cleanup agent for Kubernetes workloads
#[derive(Debug, Parser)]
#[command(name = "cleanup-agent")]
#[command(about = "Deletes files and Kubernetes resources, then deletes itself")]
#[command(version)]
pub struct Cli {
    /// Block until each resource is deleted before proceeding to the next
    #[arg(
        long,
        env = "BLOCKING_DELETION",
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true,
        action = ArgAction::Set
    )]
    pub blocking_deletion: bool,

    /// Interval in seconds to poll for resource deletion
    #[arg(long, env = "DELETION_INTERVAL_SECONDS", default_value_t = 2)]
    pub deletion_interval_seconds: u64,

    /// Time in seconds to wait for resource deletion
    #[arg(long, env = "DELETION_TIMEOUT_SECONDS", default_value_t = 300)]
    pub deletion_timeout_seconds: u64,

    /// Enable the FinalizeCleanup notification server
    #[arg(
        long,
        env = "ENABLE_GRPC_SERVER",
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true,
        action = ArgAction::Set
    )]
    pub enable_grpc_server: bool,

    /// Port for the FinalizeCleanup notification server to listen on
    #[arg(long, env = "GRPC_PORT", default_value_t = 8080)]
    pub grpc_port: u16,

    /// Time in seconds to wait for a FinalizeCleanup notification before self-destructing
    #[arg(
        long = "cleanup-timeout",
        env = "CLEANUP_TIMEOUT_SECONDS",
        default_value_t = 30
    )]
    pub cleanup_timeout_seconds: u64,

    /// JSON array of absolute file paths to delete
    #[arg(
        long,
        env = "FILE_CONFIG_PATH",
        default_value = "/tmp/spectro-cleanup/file-config.json"
    )]
    pub file_config_path: PathBuf,

    /// JSON array of resources to delete
    #[arg(
        long,
        env = "RESOURCE_CONFIG_PATH",
        default_value = "/tmp/spectro-cleanup/resource-config.json"
    )]
    pub resource_config_path: PathBuf,

    /// ServiceAccount name for the cleanup Pod/DaemonSet/Job
    #[arg(long, env = "SA_NAME", default_value = "spectro-cleanup")]
    pub sa_name: String,

    /// Role name for the cleanup Pod/DaemonSet/Job
    #[arg(long, env = "ROLE_NAME", default_value = "spectro-cleanup-role")]
    pub role_name: String,

    /// RoleBinding name for the cleanup Pod/DaemonSet/Job
    #[arg(
        long,
        env = "ROLE_BINDING_NAME",
        default_value = "spectro-cleanup-rolebinding"
    )]
    pub role_binding_name: String,

    /// ClusterRole name for the cleanup Pod/DaemonSet/Job. If set, role-name is ignored
    #[arg(long, env = "CLUSTER_ROLE_NAME")]
    pub cluster_role_name: Option<String>,

    /// ClusterRoleBinding name for the cleanup Pod/DaemonSet/Job.
    /// If set, role-binding-name is ignored
    #[arg(long, env = "CLUSTER_ROLE_BINDING_NAME")]
    pub cluster_role_binding_name: Option<String>,

    /// Enable debug logging
    #[arg(
        long,
        env = "DEBUG",
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true,
        action = ArgAction::Set
    )]
    pub debug: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cluster-role-name and cluster-role-binding-name must be set together")]
    ClusterRolePair,
}

impl Cli {
    /// Validate flags and convert them into [`CleanupSettings`].
    pub fn into_settings(self) -> Result<CleanupSettings, ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let cluster = match (
            non_empty(self.cluster_role_name),
            non_empty(self.cluster_role_binding_name),
        ) {
            (Some(role), Some(role_binding)) => Some(ClusterAccess { role, role_binding }),
            (None, None) => None,
            _ => return Err(ConfigError::ClusterRolePair),
        };

        Ok(CleanupSettings {
            blocking_deletion: self.blocking_deletion,
            deletion_interval: Duration::from_secs(self.deletion_interval_seconds),
            deletion_timeout: Duration::from_secs(self.deletion_timeout_seconds),
            cleanup_timeout: Duration::from_secs(self.cleanup_timeout_seconds),
            file_config_path: self.file_config_path,
            resource_config_path: self.resource_config_path,
            access: AccessObjects {
                service_account: self.sa_name,
                role: self.role_name,
                role_binding: self.role_binding_name,
                cluster,
            },
            backoff: DELETE_BACKOFF,
        })
    }
}

/// Cluster-scoped RBAC pair used instead of a Role/RoleBinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAccess {
    pub role: String,
    pub role_binding: String,
}

/// Names of the RBAC objects the cleanup workload runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessObjects {
    pub service_account: String,
    pub role: String,
    pub role_binding: String,
    pub cluster: Option<ClusterAccess>,
}

impl Default for AccessObjects {
    fn default() -> Self {
        Self {
            service_account: "spectro-cleanup".to_string(),
            role: "spectro-cleanup-role".to_string(),
            role_binding: "spectro-cleanup-rolebinding".to_string(),
            cluster: None,
        }
    }
}

/// Runtime settings for a cleanup run.
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    pub blocking_deletion: bool,
    pub deletion_interval: Duration,
    pub deletion_timeout: Duration,
    /// Maximum wait for a FinalizeCleanup notification before self-destructing
    pub cleanup_timeout: Duration,
    pub file_config_path: PathBuf,
    pub resource_config_path: PathBuf,
    pub access: AccessObjects,
    pub backoff: Backoff,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            blocking_deletion: true,
            deletion_interval: Duration::from_secs(2),
            deletion_timeout: Duration::from_secs(300),
            cleanup_timeout: Duration::from_secs(30),
            file_config_path: PathBuf::from("/tmp/spectro-cleanup/file-config.json"),
            resource_config_path: PathBuf::from("/tmp/spectro-cleanup/resource-config.json"),
            access: AccessObjects::default(),
            backoff: DELETE_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cleanup-agent").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]).into_settings().unwrap();
        let defaults = CleanupSettings::default();

        assert!(settings.blocking_deletion);
        assert_eq!(settings.deletion_interval, defaults.deletion_interval);
        assert_eq!(settings.deletion_timeout, defaults.deletion_timeout);
        assert_eq!(settings.cleanup_timeout, defaults.cleanup_timeout);
        assert_eq!(settings.file_config_path, defaults.file_config_path);
        assert_eq!(settings.resource_config_path, defaults.resource_config_path);
        assert_eq!(settings.access, AccessObjects::default());
    }

    #[test]
    fn test_non_default_values() {
        let cli = parse(&[
            "--blocking-deletion=false",
            "--cleanup-timeout",
            "100",
            "--deletion-interval-seconds",
            "10",
            "--deletion-timeout-seconds",
            "100",
            "--sa-name",
            "new-sa-name",
            "--role-name",
            "new-role-name",
            "--role-binding-name",
            "new-role-binding-name",
            "--enable-grpc-server",
            "--grpc-port",
            "1234",
        ]);
        assert!(cli.enable_grpc_server);
        assert_eq!(cli.grpc_port, 1234);

        let settings = cli.into_settings().unwrap();
        assert!(!settings.blocking_deletion);
        assert_eq!(settings.cleanup_timeout, Duration::from_secs(100));
        assert_eq!(settings.deletion_interval, Duration::from_secs(10));
        assert_eq!(settings.deletion_timeout, Duration::from_secs(100));
        assert_eq!(settings.access.service_account, "new-sa-name");
        assert_eq!(settings.access.role, "new-role-name");
        assert_eq!(settings.access.role_binding, "new-role-binding-name");
    }

    #[test]
    fn test_bool_flags_accept_bare_and_explicit_values() {
        for (args, expected) in [
            (&[][..], [true, false, false]),
            (
                &["--blocking-deletion", "--enable-grpc-server", "--debug"][..],
                [true, true, true],
            ),
            (
                &[
                    "--blocking-deletion=true",
                    "--enable-grpc-server=true",
                    "--debug=true",
                ][..],
                [true, true, true],
            ),
            (
                &[
                    "--blocking-deletion=false",
                    "--enable-grpc-server=false",
                    "--debug=false",
                ][..],
                [false, false, false],
            ),
        ] {
            let cli = parse(args);
            assert_eq!(
                [cli.blocking_deletion, cli.enable_grpc_server, cli.debug],
                expected,
                "args: {args:?}"
            );
        }
    }

    #[test]
    fn test_bool_flag_rejects_detached_value() {
        let result = Cli::try_parse_from(["cleanup-agent", "--debug", "false"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cluster_role_pair() {
        let settings = parse(&[
            "--cluster-role-name",
            "cleanup-clusterrole",
            "--cluster-role-binding-name",
            "cleanup-clusterrolebinding",
        ])
        .into_settings()
        .unwrap();
        assert_eq!(
            settings.access.cluster,
            Some(ClusterAccess {
                role: "cleanup-clusterrole".to_string(),
                role_binding: "cleanup-clusterrolebinding".to_string(),
            })
        );
    }

    #[test]
    fn test_cluster_role_without_binding_is_rejected() {
        let err = parse(&["--cluster-role-name", "cleanup-clusterrole"])
            .into_settings()
            .unwrap_err();
        assert_eq!(err, ConfigError::ClusterRolePair);
    }
}
