//! Shutdown coordination across the cluster, sessions and bots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown state.
///
/// `initiated` stops new work (sessions, bot steps); `complete` marks that
/// the managers have been torn down.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    initiated: Arc<watch::Sender<bool>>,
    complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        let (initiated, _) = watch::channel(false);
        Self {
            initiated: Arc::new(initiated),
            complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        *self.initiated.borrow()
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn initiate_shutdown(&self) {
        if !self.initiated.send_replace(true) {
            info!("🛑 Shutdown initiated - no new sessions or bot steps");
        }
    }

    pub fn complete_shutdown(&self) {
        self.complete.store(true, Ordering::Release);
        info!("✅ Region managers stopped - ready for final cleanup");
    }

    /// Resolves once shutdown has been initiated.
    pub async fn wait_for_shutdown(&self) {
        let mut initiated = self.initiated.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = initiated.wait_for(|initiated| *initiated).await;
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}
