//! Engine control handle
//!
//! Cloneable surface for stopping or pausing a running discussion from
//! outside the engine's own coroutine. Stop flips the engine cancellation
//! token, which propagates into the dispatcher and every task-scoped token.
//! Pause is advisory: it prevents the next round from starting but never
//! interrupts in-flight work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct EngineHandle {
    token: CancellationToken,
    stop_reason: Arc<Mutex<Option<String>>>,
    paused: Arc<AtomicBool>,
}

impl EngineHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            stop_reason: Arc::new(Mutex::new(None)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent: the first reason wins.
    pub fn stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut slot = self.stop_reason.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_none() {
                info!(reason = %reason, "discussion stop requested");
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn stop_reason(&self) -> Option<String> {
        self.stop_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent_first_reason_wins() {
        let handle = EngineHandle::new();
        handle.stop("user cancelled");
        handle.stop("late duplicate");
        assert!(handle.is_cancelled());
        assert_eq!(handle.stop_reason().as_deref(), Some("user cancelled"));
    }

    #[test]
    fn test_pause_resume() {
        let handle = EngineHandle::new();
        assert!(!handle.is_paused());
        handle.pause();
        assert!(handle.is_paused());
        handle.resume();
        assert!(!handle.is_paused());
    }
}
