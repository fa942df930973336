//! Cooperative stop requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle for requesting that a running job stop.
///
/// Steps sample it only between chunks: a chunk in flight always finishes
/// its commit or rollback first.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested, halting at next chunk boundary");
        }
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
