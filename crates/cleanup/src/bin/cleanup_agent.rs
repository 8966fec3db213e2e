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

//! Cleanup agent binary
//!
//! Deletes the configured files and Kubernetes resources, optionally serving
//! `FinalizeCleanup` notifications while it waits to self-destruct.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cleanup::{server, telemetry, Cleaner, Cli, KubeBackend};
use tokio::signal;
use tokio::time::Instant;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.debug, cli.log_format).context("failed to initialize tracing")?;

    let enable_server = cli.enable_grpc_server;
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.grpc_port));
    let settings = cli.into_settings()?;

    info!("Starting cleanup agent v{}", env!("CARGO_PKG_VERSION"));
    let started = Instant::now();

    let backend = KubeBackend::connect()
        .await
        .context("failed to create Kubernetes client")?;
    let cleaner = Cleaner::new(Arc::new(backend), settings);

    let server = enable_server.then(|| {
        let signal = cleaner.signal();
        tokio::spawn(async move {
            if let Err(e) = server::serve(addr, signal, shutdown_signal()).await {
                error!(
                    error = %e,
                    "FinalizeCleanup server stopped, unable to handle further requests"
                );
            }
        })
    });

    cleaner
        .cleanup_files()
        .await
        .context("failed to cleanup files")?;
    info!(duration = ?started.elapsed(), "File cleanup complete");

    cleaner
        .cleanup_resources()
        .await
        .context("failed to cleanup resources")?;
    info!(duration = ?started.elapsed(), "Resource cleanup complete");

    if let Some(server) = server {
        server.await?;
    }
    info!(total_duration = ?started.elapsed(), "Cleanup finished");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
