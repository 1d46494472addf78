//! Cooperative cancellation for a single chat request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked by the orchestrator at the start of every cycle.
/// Setting it never interrupts a tool call already in flight.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token when the returned guard is dropped, unless the guard
    /// is disarmed first. Request handlers hold one for the lifetime of the
    /// client connection.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop { token: Some(self.clone()) }
    }
}

#[derive(Debug)]
pub struct CancelOnDrop {
    token: Option<CancellationToken>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
