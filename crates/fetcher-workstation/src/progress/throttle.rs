//! Progress throttling.
//!
//! Rate-limits progress events to avoid overwhelming transfer listings.

use std::time::{Duration, Instant};

/// Rate-limiter for progress events of one transfer.
///
/// Ensures progress events are not emitted more frequently than the
/// configured interval. Reaching completion (a fraction of `1.0`) is always
/// let through so listings never stall just short of done.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide whether a progress event at `fraction` should be emitted now.
    pub fn admit(&mut self, fraction: f64) -> bool {
        self.admit_at(fraction, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&mut self, fraction: f64, now: Instant) -> bool {
        let due = match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        };
        if due || fraction >= 1.0 {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }

    /// Force the next check to emit (used after pause/resume).
    pub const fn reset(&mut self) {
        self.last_emit = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(fetcher_core::config::DEFAULT_PROGRESS_INTERVAL)
    }
}
