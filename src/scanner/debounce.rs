//! DebouncedScheduler: collapses bursts of change events into one task
//!
//! Trailing-edge debounce driven by explicit timestamps: every `request`
//! pushes the deadline to `now + window`, `poll` fires once the deadline
//! has passed. A zero window fires on the next poll.

use instant::Instant;
use std::time::Duration;

/// How a content source reacts to change events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Low churn: scan on the next poll after each event
    Immediate,
    /// High churn: collapse events within the window
    Debounced(Duration),
}

impl ScanPolicy {
    pub fn window(&self) -> Duration {
        match self {
            ScanPolicy::Immediate => Duration::ZERO,
            ScanPolicy::Debounced(window) => *window,
        }
    }
}

#[derive(Debug)]
pub struct DebouncedScheduler {
    window: Duration,
    deadline: Option<Instant>,
    requested: u64,
    fired: u64,
}

impl DebouncedScheduler {
    pub fn new(policy: ScanPolicy) -> Self {
        Self {
            window: policy.window(),
            deadline: None,
            requested: 0,
            fired: 0,
        }
    }

    /// Register a trigger. Returns false when it was folded into an
    /// already pending task.
    pub fn request(&mut self, now: Instant) -> bool {
        self.requested += 1;
        let fresh = self.deadline.is_none();
        self.deadline = Some(now + self.window);
        fresh
    }

    /// True exactly once per pending task, when its deadline has passed
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.fired += 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the pending task is due (for the host's timer)
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|deadline| {
            if deadline > now {
                deadline - now
            } else {
                Duration::ZERO
            }
        })
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }
}
