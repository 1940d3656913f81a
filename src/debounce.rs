use std::time::Duration;
use std::time::Instant;

/// Single-shot deadline that coalesces bursts of events into one action.
///
/// `trigger` restarts the deadline, cancelling any pending one, so at most
/// one unit of deferred work is ever in flight. The owner polls `fire` from
/// the interactive thread; no locking is involved.
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arm (or re-arm) the deadline at `now + delay`.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume an expired deadline. Returns true at most once per trigger.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
