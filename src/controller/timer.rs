use std::time::{Duration, Instant};

/// One-shot deadline polled from the tick loop instead of sleeping.
///
/// Cancelling an already fired or cancelled timer is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredTimer {
    deadline: Option<Instant>,
}

impl DeferredTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once, on the first poll at or past the deadline.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
