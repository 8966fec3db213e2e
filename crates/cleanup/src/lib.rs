/*
 * 5D Labs Agent Platform - Cleanup Agent
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Self-destructing cleanup agent
//!
//! Runs inside a Pod, Job or DaemonSet and removes a declarative list of local
//! files and Kubernetes resources, then deletes its own workload. The RBAC
//! objects the agent runs under are handed to the garbage collector through
//! owner references, so nothing is left behind once the agent is gone.
//!
//! # Architecture
//!
//! - [`plan`] loads the ordered deletion plan
//! - [`Deleter`] deletes single resources and fans out bulk deletions
//! - [`ownership`] chains the agent's RBAC objects to its own workload
//! - [`FinalizeSignal`] and [`coordinator`] decide when self-destruction may proceed
//! - [`Cleaner`] walks the plan and applies the must-delete policy
//! - [`server`] exposes the `FinalizeCleanup` notification endpoint

pub mod backend;
pub mod bulk;
pub mod cleaner;
pub mod config;
pub mod coordinator;
pub mod delete;
pub mod error;
pub mod files;
pub mod ownership;
pub mod plan;
pub mod retry;
pub mod server;
pub mod signal;
pub mod telemetry;
pub mod verify;

// Re-export commonly used types
pub use backend::{KubeBackend, ResourceBackend, ResourceScope};
pub use cleaner::Cleaner;
pub use config::{AccessObjects, CleanupSettings, Cli, ClusterAccess, LogFormat};
pub use delete::Deleter;
pub use error::{BackendError, CleanupError, Result};
pub use plan::{DeleteDirective, ResourceKind};
pub use signal::FinalizeSignal;
