//! ECG conditioning: smoothing and baseline wander removal.
//!
//! Two stages run on the trailing analysis window before fiducial detection:
//!
//! 1. **Moving-average smoothing** with a window of roughly 10 ms
//!    (`max(3, round(0.01 * fs))` taps). The caller may supply the samples
//!    immediately preceding the window so consecutive, overlapping passes
//!    stay continuous at the left edge.
//! 2. **Baseline removal**: the window is split into overlapping half-second
//!    segments; the mean of the lowest 20% of samples in each segment is the
//!    segment's baseline level, anchored at the segment center; levels are
//!    linearly extended across the window and subtracted.
//!
//! ```rust
//! use pulseflow_core::ecg_conditioner::EcgConditioner;
//!
//! let conditioner = EcgConditioner::new(130.0);
//! let window: Vec<f64> = (0..650).map(|i| 100.0 + (i as f64 * 0.2).sin()).collect();
//! let out = conditioner.condition(&window, &[]);
//! assert_eq!(out.len(), window.len());
//! // The constant 100-count offset is gone.
//! let mean = out.iter().sum::<f64>() / out.len() as f64;
//! assert!(mean.abs() < 2.0);
//! ```

/// Smoothing and baseline removal for a trailing ECG window.
#[derive(Debug, Clone)]
pub struct EcgConditioner {
    fs: f64,
    smooth_len: usize,
    segment_len: usize,
}

impl EcgConditioner {
    /// Create a conditioner for the given ECG sampling rate.
    pub fn new(fs: f64) -> Self {
        let smooth_len = ((0.01 * fs).round() as usize).max(3);
        let segment_len = ((0.5 * fs).round() as usize).max(4);
        Self {
            fs,
            smooth_len,
            segment_len,
        }
    }

    /// Sampling rate this conditioner was built for.
    pub fn sample_rate(&self) -> f64 {
        self.fs
    }

    /// Smoothing window length in samples.
    pub fn smooth_len(&self) -> usize {
        self.smooth_len
    }

    /// Run both stages. `prefix` holds the samples immediately before
    /// `window` (may be empty on cold start).
    pub fn condition(&self, window: &[f64], prefix: &[f64]) -> Vec<f64> {
        let smoothed = self.smooth(window, prefix);
        self.remove_baseline(&smoothed)
    }

    /// Causal moving average over `smooth_len` samples.
    ///
    /// For sample `i` the average runs over the `smooth_len` samples ending
    /// at `i`, reaching into `prefix` where the window does not provide
    /// enough history. With a shorter prefix the average shrinks to the
    /// available context.
    pub fn smooth(&self, window: &[f64], prefix: &[f64]) -> Vec<f64> {
        let k = self.smooth_len;
        let mut out = Vec::with_capacity(window.len());
        // Running sum over the last k samples of the virtual
        // prefix-then-window sequence.
        let mut sum = 0.0;
        let mut held = std::collections::VecDeque::with_capacity(k);
        let context = prefix.len().min(k.saturating_sub(1));
        for &p in &prefix[prefix.len() - context..] {
            if held.len() == k {
                sum -= held.pop_front().unwrap_or(0.0);
            }
            held.push_back(p);
            sum += p;
        }
        for &x in window {
            if held.len() == k {
                sum -= held.pop_front().unwrap_or(0.0);
            }
            held.push_back(x);
            sum += x;
            out.push(sum / held.len() as f64);
        }
        out
    }

    /// Subtract the estimated baseline from `signal`.
    pub fn remove_baseline(&self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let anchors = self.baseline_anchors(signal);
        let baseline = interpolate_anchors(&anchors, signal.len());
        signal
            .iter()
            .zip(baseline.iter())
            .map(|(&s, &b)| s - b)
            .collect()
    }

    /// Baseline level anchors: (center index, level) per overlapping
    /// half-second segment.
    fn baseline_anchors(&self, signal: &[f64]) -> Vec<(usize, f64)> {
        let seg = self.segment_len.min(signal.len()).max(1);
        let hop = (seg / 2).max(1);
        let mut anchors = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + seg).min(signal.len());
            let level = lowest_fraction_mean(&signal[start..end], 0.2);
            anchors.push((start + (end - start) / 2, level));
            if end == signal.len() {
                break;
            }
            start += hop;
        }
        anchors
    }
}

/// Mean of the lowest `fraction` of the values (at least one value).
fn lowest_fraction_mean(values: &[f64], fraction: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let take = ((sorted.len() as f64 * fraction).round() as usize).max(1);
    sorted[..take].iter().sum::<f64>() / take as f64
}

/// Piecewise-linear curve through the anchors, held flat beyond the outer
/// anchor centers.
fn interpolate_anchors(anchors: &[(usize, f64)], len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    if anchors.is_empty() {
        return out;
    }
    let mut seg = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        while seg + 1 < anchors.len() && anchors[seg + 1].0 <= i {
            seg += 1;
        }
        *slot = if i <= anchors[0].0 {
            anchors[0].1
        } else if i >= anchors[anchors.len() - 1].0 {
            anchors[anchors.len() - 1].1
        } else {
            let (x0, y0) = anchors[seg];
            let (x1, y1) = anchors[seg + 1];
            if x1 == x0 {
                y0
            } else {
                let t = (i - x0) as f64 / (x1 - x0) as f64;
                y0 + t * (y1 - y0)
            }
        };
    }
    out
}
