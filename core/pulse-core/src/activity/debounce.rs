//! Collapses bursts of editor signals into one settle evaluation.

use chrono::{DateTime, Duration, Utc};

pub const SETTLE_DEBOUNCE_MS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    deadline: DateTime<Utc>,
    is_write: bool,
}

/// Restartable one-shot timer. Each request cancels the previous one, so
/// only the last signal's write flag survives the quiet period.
#[derive(Debug)]
pub struct SettleDebouncer {
    delay: Duration,
    pending: Option<Pending>,
}

impl Default for SettleDebouncer {
    fn default() -> Self {
        Self::new(Duration::milliseconds(SETTLE_DEBOUNCE_MS))
    }
}

impl SettleDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn request(&mut self, is_write: bool, now: DateTime<Utc>) {
        self.pending = Some(Pending {
            deadline: now + self.delay,
            is_write,
        });
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.map(|p| p.deadline)
    }

    /// Returns the write flag to settle with once the quiet period has elapsed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<bool> {
        match self.pending {
            Some(p) if p.deadline <= now => {
                self.pending = None;
                Some(p.is_write)
            }
            _ => None,
        }
    }
}
