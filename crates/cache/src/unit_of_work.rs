//! Completion notifications from the unit of work that owns a payload

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Callback run when a unit of work completes
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// A transaction or exchange that completes exactly once
///
/// Callbacks registered after completion must run immediately.
pub trait UnitOfWork: Send + Sync {
    fn on_completion(&self, callback: CompletionCallback);
}

#[derive(Default)]
struct UnitOfWorkState {
    completed: bool,
    callbacks: Vec<CompletionCallback>,
}

/// Thread-safe [`UnitOfWork`] that runs its callbacks on [`complete`](Self::complete)
#[derive(Clone, Default)]
pub struct UnitOfWorkHandle {
    state: Arc<Mutex<UnitOfWorkState>>,
}

impl UnitOfWorkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Mark the unit of work complete and run pending callbacks
    ///
    /// Returns `false` if it had already completed; callbacks never run twice.
    pub fn complete(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.completed {
                return false;
            }
            state.completed = true;
            std::mem::take(&mut state.callbacks)
        };

        tracing::trace!(callbacks = callbacks.len(), "unit of work completed");
        for callback in callbacks {
            callback();
        }
        true
    }
}

impl UnitOfWork for UnitOfWorkHandle {
    fn on_completion(&self, callback: CompletionCallback) {
        {
            let mut state = self.state.lock();
            if !state.completed {
                state.callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl fmt::Debug for UnitOfWorkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UnitOfWorkHandle")
            .field("completed", &state.completed)
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}
