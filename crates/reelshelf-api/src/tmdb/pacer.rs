//! Request pacing for the TMDB API.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Default minimum interval between requests (~40 req/s).
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(25);

/// Hands out request start times spaced at least `min_interval` apart.
///
/// Concurrent callers each reserve their own slot under a short lock and then
/// sleep outside of it, so one slow waiter never blocks the others' bookkeeping.
#[derive(Debug)]
pub struct RequestPacer {
    /// Minimum interval between request starts.
    min_interval: Duration,
    /// Earliest instant the next request may start.
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Creates a pacer with the given minimum interval.
    pub(crate) const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Creates a pacer with the default interval (25ms).
    pub(crate) const fn default_interval() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }

    /// Reserves the next slot and returns when it is reached.
    pub async fn wait(&self) {
        let start = self.reserve(Instant::now());
        if start > Instant::now() {
            tokio::time::sleep_until(start).await;
        }
    }

    /// Reserves a start instant no earlier than `now`.
    fn reserve(&self, now: Instant) -> Instant {
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = match *next {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next = start.checked_add(self.min_interval).or(Some(start));
        start
    }
}
