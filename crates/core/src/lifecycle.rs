use std::sync::{Condvar, Mutex};

/// Process-wide lifecycle of the core.
///
/// `NotInitialized -> Suspended -> Running <-> Suspended`, with `Stopped`
/// reachable from any state and terminal. Workers process their queues only
/// while `Running`; in any other non-terminal state they park without
/// consuming work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotInitialized,
    Suspended,
    Running,
    Stopped,
}

/// The single owner of the lifecycle value, observed by all loops.
///
/// A condvar-backed cell rather than a raw shared field: transitions wake
/// every parked worker, and `Stopped` is enforced as terminal here.
#[derive(Debug)]
pub(crate) struct LifecycleGate {
    state: Mutex<Lifecycle>,
    cond: Condvar,
}

impl LifecycleGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(Lifecycle::NotInitialized),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> Lifecycle {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to `next`. Transitions out of `Stopped` are refused.
    pub(crate) fn set(&self, next: Lifecycle) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == Lifecycle::Stopped {
            if next != Lifecycle::Stopped {
                tracing::warn!(?next, "ignored lifecycle transition out of Stopped");
            }
            return;
        }
        tracing::debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
        self.cond.notify_all();
    }

    /// Park until the core is `Running` or `Stopped`, and return which.
    pub(crate) fn block_until_active(&self) -> Lifecycle {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while matches!(*state, Lifecycle::NotInitialized | Lifecycle::Suspended) {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        *state
    }
}
