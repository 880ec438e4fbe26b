//! Bounded sliding window of R-R intervals.
//!
//! The window is count-bounded, not time-bounded: it holds the most recent
//! `capacity` accepted intervals in insertion order and evicts the oldest on
//! overflow. Capacity is clamped to 2..=1000.
//!
//! Interval validation (the 300..=2000 ms physiological gate) happens at the
//! ingress; the window stores whatever it is given.

use crate::config::{RR_WINDOW_MAX, RR_WINDOW_MIN};
use std::collections::VecDeque;

/// Insertion-ordered bounded window of R-R intervals in milliseconds.
#[derive(Debug, Clone)]
pub struct RrWindow {
    capacity: usize,
    intervals: VecDeque<f64>,
}

impl RrWindow {
    /// Create a window holding at most `capacity` intervals.
    ///
    /// Out-of-range capacities are clamped with a logged warning.
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(RR_WINDOW_MIN, RR_WINDOW_MAX);
        if clamped != capacity {
            tracing::warn!(requested = capacity, clamped, "rr window capacity clamped");
        }
        Self {
            capacity: clamped,
            intervals: VecDeque::with_capacity(clamped),
        }
    }

    /// Append an interval, evicting the oldest when full.
    pub fn push(&mut self, rr_ms: f64) {
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(rr_ms);
    }

    /// Number of retained intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True when no interval has been retained.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy the window out as a contiguous slice, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.intervals.iter().copied().collect()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals.iter().copied()
    }

    /// Most recently pushed interval.
    pub fn latest(&self) -> Option<f64> {
        self.intervals.back().copied()
    }

    /// Discard all intervals.
    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}
