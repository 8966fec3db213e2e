//! Decides when the agent may delete its own workload.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{CleanupError, Result};

/// What allowed self-destruction to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfDestructTrigger {
    /// Blocking deletion already waited for every resource
    Immediate,
    /// A `FinalizeCleanup` notification arrived
    Notified,
    /// The cleanup timeout elapsed first
    TimedOut,
}

/// Waits until self-destruction may proceed.
///
/// In blocking mode this resolves immediately. Otherwise the first of a
/// notification on `notifications` or `timeout` wins.
pub async fn await_self_destruct(
    blocking: bool,
    notifications: &mut mpsc::Receiver<()>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<SelfDestructTrigger> {
    if blocking {
        info!("Self destructing...");
        return Ok(SelfDestructTrigger::Immediate);
    }

    info!(
        max_delay_seconds = timeout.as_secs(),
        "Waiting for final cleanup notification or timeout before destructing..."
    );
    tokio::select! {
        () = cancel.cancelled() => Err(CleanupError::Cancelled),
        Some(()) = notifications.recv() => {
            info!("FinalizeCleanup notification received, self destructing...");
            Ok(SelfDestructTrigger::Notified)
        }
        () = tokio::time::sleep(timeout) => {
            info!(
                elapsed_seconds = timeout.as_secs(),
                "Cleanup timeout elapsed, self destructing..."
            );
            Ok(SelfDestructTrigger::TimedOut)
        }
    }
}
