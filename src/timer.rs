//! Single-shot scheduled events
//!
//! Timers hold a deadline instead of an interrupt callback. The owner polls
//! them with the current time; a due timer fires once and disarms itself.

/// Device time in whole seconds
pub type Timestamp = u64;

/// A cancellable single-shot deadline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timer {
    due: Option<Timestamp>,
}

impl Timer {
    /// Create a disarmed timer
    pub const fn new() -> Self {
        Self { due: None }
    }

    /// Arm the timer `after` seconds from `now`, replacing any pending deadline
    pub fn arm(&mut self, now: Timestamp, after: u32) {
        self.due = Some(now.saturating_add(after as u64));
    }

    /// Disarm the timer
    pub fn cancel(&mut self) {
        self.due = None;
    }

    /// Pending deadline, if armed
    pub fn deadline(&self) -> Option<Timestamp> {
        self.due
    }

    /// Whether a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    /// Returns true once when the deadline has passed
    pub fn poll(&mut self, now: Timestamp) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}
