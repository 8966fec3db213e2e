//! One-shot `FinalizeCleanup` notification shared between a cleanup run and
//! the notification server.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::{CleanupError, Result};

/// Notification slot armed for the duration of a resource cleanup run.
///
/// Clones share the same slot. `notify` only succeeds between `arm` and
/// `disarm`; outside that window it reports
/// [`CleanupError::IllegalNotification`].
#[derive(Clone, Default)]
pub struct FinalizeSignal {
    sender: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl FinalizeSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh notification channel and returns its receiving end.
    ///
    /// Any previously armed channel is replaced.
    pub async fn arm(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        if self.sender.lock().await.replace(tx).is_some() {
            warn!("FinalizeCleanup signal re-armed while already active");
        }
        rx
    }

    /// Delivers a notification to the armed run.
    ///
    /// Repeated notifications before the run consumes the first are coalesced.
    pub async fn notify(&self) -> Result<()> {
        let sender = self.sender.lock().await;
        let Some(tx) = sender.as_ref() else {
            return Err(CleanupError::IllegalNotification);
        };
        match tx.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(())) => {
                info!("FinalizeCleanup notification already pending");
                Ok(())
            }
            Err(TrySendError::Closed(())) => Err(CleanupError::IllegalNotification),
        }
    }

    /// Closes the channel. Returns false if it was not armed.
    pub async fn disarm(&self) -> bool {
        self.sender.lock().await.take().is_some()
    }

    pub async fn is_armed(&self) -> bool {
        self.sender.lock().await.is_some()
    }
}
