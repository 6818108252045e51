use crate::command::Reply;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Completion status of a submitted command. Terminal once it leaves
/// `Pending`; exactly one worker finishes a given ticket exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Completed,
    Failed,
}

/// The terminal record of a command: status, a human-readable message, and
/// the reply payload shaped by the originating command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: Status,
    pub message: String,
    pub reply: Reply,
}

#[derive(Debug, Default)]
struct Slot {
    outcome: Option<Outcome>,
}

/// Single-assignment, thread-safe completion slot paired with a command.
///
/// The submitter keeps one clone and polls or blocks on it; the worker that
/// processes the command finishes the other. A second completion attempt is
/// ignored (with a warning) rather than overwriting the first.
#[derive(Debug, Clone, Default)]
pub struct Ticket {
    inner: Arc<(Mutex<Slot>, Condvar)>,
}

impl Ticket {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&self, status: Status, message: impl Into<String>, reply: Reply) -> bool {
        debug_assert!(status != Status::Pending);
        let (lock, cond) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        if slot.outcome.is_some() {
            tracing::warn!("ignored second completion of a ticket");
            return false;
        }
        slot.outcome = Some(Outcome {
            status,
            message: message.into(),
            reply,
        });
        cond.notify_all();
        true
    }

    /// Finish the ticket successfully.
    pub fn complete(&self, message: impl Into<String>, reply: Reply) -> bool {
        self.finish(Status::Completed, message, reply)
    }

    /// Finish the ticket with a failure cause.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.finish(Status::Failed, message, Reply::None)
    }

    /// Non-blocking status poll.
    pub fn status(&self) -> Status {
        let (lock, _) = &*self.inner;
        let slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        slot.outcome
            .as_ref()
            .map_or(Status::Pending, |outcome| outcome.status)
    }

    /// The outcome, if the ticket is terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        let (lock, _) = &*self.inner;
        let slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        slot.outcome.clone()
    }

    pub fn message(&self) -> Option<String> {
        self.outcome().map(|outcome| outcome.message)
    }

    /// Block until the ticket is finished.
    pub fn wait(&self) -> Outcome {
        let (lock, cond) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.outcome.clone() {
                return outcome;
            }
            slot = cond.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until the ticket is finished or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let (lock, cond) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.outcome.clone() {
                return Some(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            slot = guard;
        }
    }
}
