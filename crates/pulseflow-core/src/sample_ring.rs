//! Bounded sample rings with stable global indexing.
//!
//! Every inbound stream lands in a fixed-capacity ring: the oldest samples
//! are evicted on overflow, never blocking the producer. ECG samples keep a
//! session-wide global index that survives eviction, so fiducial points can
//! reference samples long after the write position has wrapped. The
//! accelerometer ring additionally supports a nearest-by-time lookup used by
//! the motion canceller.
//!
//! ```rust
//! use pulseflow_core::sample_ring::SampleRing;
//!
//! let mut ring = SampleRing::new(4);
//! for k in 0..6 {
//!     ring.push(k as f64 * 0.1, k as f64);
//! }
//! // Capacity 4: samples 0 and 1 were evicted.
//! assert_eq!(ring.start_index(), 2);
//! assert_eq!(ring.end_index(), 6);
//! assert!(ring.get(1).is_none());
//! assert_eq!(ring.get(5), Some((0.5, 5.0)));
//! ```

use std::collections::VecDeque;

/// Fixed-capacity ring of timestamped samples with global indexing.
///
/// Global index `i` addresses the `i`-th sample ever pushed during the
/// session. Only the most recent `capacity` samples are retained.
#[derive(Debug, Clone)]
pub struct SampleRing {
    capacity: usize,
    /// Global index of the oldest retained sample.
    start_index: u64,
    times: VecDeque<f64>,
    values: VecDeque<f64>,
}

impl SampleRing {
    /// Create a ring retaining at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            start_index: 0,
            times: VecDeque::with_capacity(capacity),
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest if the ring is full.
    pub fn push(&mut self, timestamp_s: f64, value: f64) {
        if self.times.len() == self.capacity {
            self.times.pop_front();
            self.values.pop_front();
            self.start_index += 1;
        }
        self.times.push_back(timestamp_s);
        self.values.push_back(value);
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Global index of the oldest retained sample.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// One past the global index of the newest sample.
    pub fn end_index(&self) -> u64 {
        self.start_index + self.values.len() as u64
    }

    /// Whether `global_index` is still retained.
    pub fn contains(&self, global_index: u64) -> bool {
        global_index >= self.start_index && global_index < self.end_index()
    }

    /// Timestamp and value at a global index, if retained.
    pub fn get(&self, global_index: u64) -> Option<(f64, f64)> {
        if !self.contains(global_index) {
            return None;
        }
        let offset = (global_index - self.start_index) as usize;
        Some((self.times[offset], self.values[offset]))
    }

    /// Timestamp of the newest sample.
    pub fn latest_time(&self) -> Option<f64> {
        self.times.back().copied()
    }

    /// Copy out the trailing `count` samples (fewer if not available).
    ///
    /// Returns the global index of the first returned sample together with
    /// parallel timestamp and value vectors.
    pub fn tail(&self, count: usize) -> (u64, Vec<f64>, Vec<f64>) {
        let n = count.min(self.values.len());
        let skip = self.values.len() - n;
        let start = self.start_index + skip as u64;
        let times = self.times.iter().skip(skip).copied().collect();
        let values = self.values.iter().skip(skip).copied().collect();
        (start, times, values)
    }

    /// Discard everything and restart global indexing at zero.
    pub fn clear(&mut self) {
        self.times.clear();
        self.values.clear();
        self.start_index = 0;
    }
}

/// A motion reference sample resolved by [`MotionRing::nearest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRef {
    /// Absolute time distance to the requested timestamp, seconds.
    pub gap_s: f64,
    /// Acceleration magnitude in g.
    pub magnitude: f64,
    /// Motion component (magnitude with gravity removed) in g.
    pub motion: f64,
}

/// Fixed-capacity ring of accelerometer magnitudes ordered by time.
#[derive(Debug, Clone)]
pub struct MotionRing {
    capacity: usize,
    times: VecDeque<f64>,
    magnitudes: VecDeque<f64>,
    motions: VecDeque<f64>,
}

impl MotionRing {
    /// Create a ring retaining at most `capacity` reference samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            times: VecDeque::with_capacity(capacity),
            magnitudes: VecDeque::with_capacity(capacity),
            motions: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a reference sample, evicting the oldest if full.
    ///
    /// Timestamps must be non-decreasing; the nearest lookup relies on it.
    pub fn push(&mut self, timestamp_s: f64, magnitude: f64, motion: f64) {
        if self.times.len() == self.capacity {
            self.times.pop_front();
            self.magnitudes.pop_front();
            self.motions.pop_front();
        }
        self.times.push_back(timestamp_s);
        self.magnitudes.push_back(magnitude);
        self.motions.push_back(motion);
    }

    /// Number of retained reference samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Find the reference sample closest in time to `timestamp_s`.
    pub fn nearest(&self, timestamp_s: f64) -> Option<MotionRef> {
        if self.times.is_empty() {
            return None;
        }
        // First index with time >= timestamp_s.
        let right = self.times.partition_point(|&t| t < timestamp_s);
        let mut best = None;
        for idx in [right.checked_sub(1), Some(right)].into_iter().flatten() {
            if idx >= self.times.len() {
                continue;
            }
            let gap = (self.times[idx] - timestamp_s).abs();
            let better = match best {
                None => true,
                Some((best_gap, _)) => gap < best_gap,
            };
            if better {
                best = Some((gap, idx));
            }
        }
        best.map(|(gap_s, idx)| MotionRef {
            gap_s,
            magnitude: self.magnitudes[idx],
            motion: self.motions[idx],
        })
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.times.clear();
        self.magnitudes.clear();
        self.motions.clear();
    }
}
