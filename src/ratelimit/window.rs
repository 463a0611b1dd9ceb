//! Sliding window of admission instants.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Ordered admission instants that are still inside the rolling window.
///
/// Instants are pushed in non-decreasing order, so pruning only ever
/// pops from the front.
#[derive(Debug, Default)]
pub struct RateWindow {
    admissions: VecDeque<Instant>,
}

impl RateWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty window with room for `capacity` admissions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            admissions: VecDeque::with_capacity(capacity),
        }
    }

    /// Drop every admission older than `window` relative to `now`.
    ///
    /// An admission exactly `window` old is retained. Returns the number
    /// of entries removed.
    pub fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some(&oldest) = self.admissions.front() {
            if now.saturating_duration_since(oldest) <= window {
                break;
            }
            self.admissions.pop_front();
            removed += 1;
        }
        removed
    }

    /// Record `now` if fewer than `max` admissions are retained.
    ///
    /// Returns `true` if the admission was recorded.
    pub fn try_record(&mut self, now: Instant, max: usize) -> bool {
        if self.admissions.len() >= max {
            return false;
        }
        self.admissions.push_back(now);
        true
    }

    /// Number of retained admissions.
    pub fn len(&self) -> usize {
        self.admissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admissions.is_empty()
    }

    /// The oldest retained admission, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.admissions.front().copied()
    }
}
