use chrono::{DateTime, Utc};

/// Decision returned for one request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Go,
    /// The budget is below the threshold; nothing may be sent before this instant.
    WaitUntil(DateTime<Utc>),
}

/// Last known state of the host's rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateSnapshot {
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Bookkeeping for the host's global rate-limit window (no IO, no locks).
///
/// The host reports `remaining` and `reset_at` on every response. Responses of concurrent workers
/// arrive out of order, so a report never raises `remaining` within the same window, and a report
/// for an older window is ignored.
#[derive(Debug)]
pub struct RateWindow {
    threshold: u64,
    remaining: Option<u64>,
    reset_at: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            remaining: None,
            reset_at: None,
        }
    }

    pub fn acquire(&mut self, now: DateTime<Utc>) -> Permit {
        if let Some(reset_at) = self.reset_at {
            if now >= reset_at {
                self.remaining = None;
                self.reset_at = None;
            } else if self.is_low() {
                return Permit::WaitUntil(reset_at);
            }
        }

        // Count the slot now so parallel workers see each other before the response lands.
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        Permit::Go
    }

    pub fn report(&mut self, remaining: u64, reset_at: DateTime<Utc>) {
        match self.reset_at {
            Some(current) if reset_at < current => {}
            Some(current) if reset_at == current => {
                self.remaining = Some(self.remaining.map_or(remaining, |r| r.min(remaining)));
            }
            _ => {
                self.remaining = Some(remaining);
                self.reset_at = Some(reset_at);
            }
        }
    }

    /// The host refused a request outright; hold everything until `reset_at`.
    pub fn throttled(&mut self, reset_at: DateTime<Utc>) {
        self.remaining = Some(0);
        self.reset_at = Some(self.reset_at.map_or(reset_at, |r| r.max(reset_at)));
    }

    pub fn snapshot(&self) -> RateSnapshot {
        RateSnapshot {
            remaining: self.remaining,
            reset_at: self.reset_at,
        }
    }

    fn is_low(&self) -> bool {
        self.remaining
            .is_some_and(|remaining| remaining == 0 || remaining < self.threshold)
    }
}
