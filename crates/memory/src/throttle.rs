//! Per-component log throttling.
//!
//! Read-path degradations (unreadable documents, malformed snapshot fields)
//! can repeat on every request. Each component owns a `LogThrottle` and asks
//! it whether the current occurrence is worth a log line.

use std::sync::atomic::{AtomicU64, Ordering};

/// Logs the first `burst` occurrences, then one in every `every`.
#[derive(Debug)]
pub struct LogThrottle {
    seen: AtomicU64,
    burst: u64,
    every: u64,
}

impl LogThrottle {
    pub fn new(burst: u64, every: u64) -> Self {
        Self {
            seen: AtomicU64::new(0),
            burst,
            every: every.max(1),
        }
    }

    /// Record one occurrence and decide whether to log it.
    pub fn should_log(&self) -> bool {
        let previous = self
            .seen
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_add(1)))
            .unwrap_or(u64::MAX);
        if previous < self.burst {
            return true;
        }
        (previous - self.burst + 1) % self.every == 0
    }

    /// Occurrences recorded so far (saturating).
    pub fn occurrences(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(5, 100)
    }
}
