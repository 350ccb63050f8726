//! Cooperative cancellation shared between a run and its watchers.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    ConfigChange,
    ConfigError,
    FailFast,
    WatchClose,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CancelReason::ConfigChange => "config change",
            CancelReason::ConfigError => "config error",
            CancelReason::FailFast => "fail fast",
            CancelReason::WatchClose => "watch close",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Default)]
struct TokenState {
    requested: bool,
    reason: Option<CancelReason>,
}

/// Cancel flag plus the first reason it was requested for.
///
/// Clones share state. Work checks the token at sibling and task boundaries;
/// nothing in flight is interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first reason wins; later calls are no-ops.
    pub fn cancel(&self, reason: CancelReason) {
        let mut state = self.lock();
        if state.requested {
            return;
        }
        debug!(%reason, "cancellation requested");
        state.requested = true;
        state.reason = Some(reason);
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.lock().requested
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.lock().reason
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.requested = false;
        state.reason = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
