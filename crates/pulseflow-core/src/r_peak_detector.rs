//! R-peak detection on the conditioned trailing window.
//!
//! The detector runs a dynamic-threshold scan over the smoothed,
//! baseline-corrected window:
//!
//! - The threshold blends the 90th percentile of the window 50/50 with the
//!   mean of the values above that percentile, so a handful of tall QRS
//!   complexes dominate it rather than the P/T-wave mass.
//! - A candidate must be the maximum of its +/-5 sample neighborhood, exceed
//!   the threshold, and pass a slope gate on the first-difference derivative
//!   (in value per second): rising faster than threshold/15 into the peak,
//!   or falling faster than threshold/15 out of it.
//! - A refractory distance of 400 ms separates accepted peaks. A candidate
//!   inside the refractory of the previous peak replaces it when its
//!   amplitude is more than 10% higher.
//! - Each accepted peak is relocated to the argmax of the unfiltered signal
//!   within +/-20 ms, so the emitted index lands on the true apex rather
//!   than the smoothed one.
//!
//! ```rust
//! use pulseflow_core::r_peak_detector::RPeakDetector;
//!
//! let fs = 130.0;
//! let signal: Vec<f64> = (0..650)
//!     .map(|i| (2.0 * std::f64::consts::PI * i as f64 / fs).sin())
//!     .collect();
//! let detector = RPeakDetector::new(fs);
//! let peaks = detector.detect(&signal, &signal);
//! assert_eq!(peaks.len(), 5, "one peak per second over five seconds");
//! ```

/// Window-based R-peak detector.
#[derive(Debug, Clone)]
pub struct RPeakDetector {
    fs: f64,
    /// Minimum distance between accepted peaks, samples (400 ms).
    refractory: usize,
    /// Half-width of the local-maximum neighborhood, samples.
    neighborhood: usize,
    /// Half-width of the apex refinement window, samples (20 ms).
    refine_radius: usize,
    /// Amplitude gain required to replace a peak within its refractory.
    replace_gain: f64,
}

impl RPeakDetector {
    /// Create a detector for the given sampling rate.
    pub fn new(fs: f64) -> Self {
        Self {
            fs,
            refractory: ((0.400 * fs).round() as usize).max(1),
            neighborhood: 5,
            refine_radius: ((0.020 * fs).round() as usize).max(1),
            replace_gain: 1.10,
        }
    }

    /// Sampling rate.
    pub fn sample_rate(&self) -> f64 {
        self.fs
    }

    /// Refractory distance in samples.
    pub fn refractory_samples(&self) -> usize {
        self.refractory
    }

    /// Detect R-peaks in a conditioned window.
    ///
    /// `conditioned` is the smoothed, baseline-corrected window; `raw` is the
    /// aligned unfiltered window used for apex refinement. Returns ascending
    /// window-local indices. Peak pairs closer than the refractory never
    /// survive, including after refinement.
    pub fn detect(&self, conditioned: &[f64], raw: &[f64]) -> Vec<usize> {
        let n = conditioned.len();
        if n < 2 * self.neighborhood + 1 || raw.len() != n {
            return Vec::new();
        }

        let threshold = dynamic_threshold(conditioned);
        if threshold <= 0.0 {
            return Vec::new();
        }
        let slope_gate = threshold / 15.0;

        let mut accepted: Vec<usize> = Vec::new();
        for i in self.neighborhood..n - self.neighborhood {
            let v = conditioned[i];
            if v <= threshold {
                continue;
            }
            if !is_neighborhood_max(conditioned, i, self.neighborhood) {
                continue;
            }
            // Backward difference into the peak and forward difference out of
            // it, both in value per second.
            let rising = (conditioned[i] - conditioned[i - 1]) * self.fs;
            let falling = (conditioned[i + 1] - conditioned[i]) * self.fs;
            if rising <= slope_gate && falling >= -slope_gate {
                continue;
            }

            match accepted.last().copied() {
                Some(last) if i - last < self.refractory => {
                    if v > self.replace_gain * conditioned[last] {
                        *accepted.last_mut().unwrap() = i;
                    }
                }
                _ => accepted.push(i),
            }
        }

        // Relocate to the unfiltered apex.
        let mut refined: Vec<usize> = accepted
            .into_iter()
            .map(|i| {
                let lo = i.saturating_sub(self.refine_radius);
                let hi = (i + self.refine_radius + 1).min(n);
                argmax(&raw[lo..hi]) + lo
            })
            .collect();
        refined.dedup();

        // Refinement can only move an index by a fraction of the refractory,
        // but the spacing guarantee is absolute: drop the weaker of any pair
        // that ended up too close.
        let mut spaced: Vec<usize> = Vec::with_capacity(refined.len());
        for idx in refined {
            match spaced.last().copied() {
                Some(last) if idx - last < self.refractory => {
                    if raw[idx] > raw[last] {
                        *spaced.last_mut().unwrap() = idx;
                    }
                }
                _ => spaced.push(idx),
            }
        }
        spaced
    }

    /// Mean R-R distance over the detected peaks, in samples.
    ///
    /// Falls back to 800 ms worth of samples when fewer than two peaks are
    /// available; the fiducial search windows need some estimate either way.
    pub fn mean_rr_samples(&self, peaks: &[usize]) -> f64 {
        if peaks.len() < 2 {
            return 0.8 * self.fs;
        }
        let span = (peaks[peaks.len() - 1] - peaks[0]) as f64;
        span / (peaks.len() - 1) as f64
    }
}

/// 50/50 blend of the 90th percentile and the mean of values above it.
fn dynamic_threshold(signal: &[f64]) -> f64 {
    let mut sorted = signal.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() - 1) as f64 * 0.9).round() as usize;
    let p90 = sorted[idx];
    let above = &sorted[idx + 1..];
    let mean_above = if above.is_empty() {
        p90
    } else {
        above.iter().sum::<f64>() / above.len() as f64
    };
    0.5 * p90 + 0.5 * mean_above
}

fn is_neighborhood_max(signal: &[f64], i: usize, half: usize) -> bool {
    let lo = i.saturating_sub(half);
    let hi = (i + half + 1).min(signal.len());
    signal[lo..hi].iter().all(|&v| v <= signal[i])
}

fn argmax(signal: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in signal.iter().enumerate() {
        if v > signal[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 130.0;

    /// Synthetic ECG: a flat floor with narrow triangular QRS pulses at the
    /// given beat interval, amplitude 1000 counts.
    fn synthetic_ecg(n: usize, beat_samples: usize, amplitude: f64) -> Vec<f64> {
        let mut signal = vec![0.0; n];
        let half_width = 3;
        let mut center = beat_samples / 2;
        while center + half_width < n {
            for k in 0..=2 * half_width {
                let idx = center + k - half_width;
                let ramp = 1.0 - (k as f64 - half_width as f64).abs() / half_width as f64;
                signal[idx] += amplitude * ramp;
            }
            center += beat_samples;
        }
        signal
    }

    #[test]
    fn test_sine_one_peak_per_second() {
        let n = (10.0 * FS) as usize;
        let signal: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / FS).sin())
            .collect();
        let detector = RPeakDetector::new(FS);
        let peaks = detector.detect(&signal, &signal);
        assert_eq!(peaks.len(), 10, "expected 10 apexes, got {:?}", peaks);
        for pair in peaks.windows(2) {
            let gap = (pair[1] - pair[0]) as f64;
            assert!(
                (gap - FS).abs() <= 1.0,
                "apex spacing {gap} should be one second"
            );
        }
    }

    #[test]
    fn test_synthetic_beats_detected() {
        let beat = FS as usize; // 60 BPM
        let signal = synthetic_ecg((8.0 * FS) as usize, beat, 1000.0);
        let detector = RPeakDetector::new(FS);
        let peaks = detector.detect(&signal, &signal);
        assert!(
            peaks.len() >= 7,
            "expected about 8 beats, got {}",
            peaks.len()
        );
    }

    #[test]
    fn test_refractory_suppresses_close_peaks() {
        let detector = RPeakDetector::new(FS);
        let mut signal = vec![0.0; 650];
        // Two equal spikes 200 ms apart, well inside the 400 ms refractory.
        for &c in &[300usize, 326] {
            for k in 0..=6 {
                signal[c + k - 3] += 1000.0 * (1.0 - (k as f64 - 3.0).abs() / 3.0);
            }
        }
        let peaks = detector.detect(&signal, &signal);
        assert_eq!(peaks.len(), 1, "refractory should keep one of the pair");
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] >= detector.refractory_samples());
        }
    }

    #[test]
    fn test_replacement_prefers_taller_peak() {
        let detector = RPeakDetector::new(FS);
        let mut signal = vec![0.0; 650];
        // A modest spike followed 200 ms later by one 50% taller.
        for (c, amp) in [(300usize, 800.0), (326, 1200.0)] {
            for k in 0..=6 {
                signal[c + k - 3] += amp * (1.0 - (k as f64 - 3.0).abs() / 3.0);
            }
        }
        let peaks = detector.detect(&signal, &signal);
        assert_eq!(peaks.len(), 1);
        assert!(
            (peaks[0] as i64 - 326).unsigned_abs() <= 3,
            "taller peak should win, got index {}",
            peaks[0]
        );
    }

    #[test]
    fn test_refinement_snaps_to_raw_apex() {
        let detector = RPeakDetector::new(FS);
        let beat = FS as usize;
        let conditioned = synthetic_ecg(650, beat, 1000.0);
        // The raw apex sits one sample later than the conditioned one.
        let mut raw = vec![0.0; 650];
        raw[1..].copy_from_slice(&conditioned[..649]);
        let peaks = detector.detect(&conditioned, &raw);
        assert!(!peaks.is_empty());
        for &p in &peaks {
            assert!(
                raw[p] >= conditioned[p],
                "peak {p} should land on the raw apex"
            );
        }
    }

    #[test]
    fn test_detection_survives_additive_noise() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let beat = FS as usize;
        let mut signal = synthetic_ecg((8.0 * FS) as usize, beat, 1000.0);
        for v in signal.iter_mut() {
            *v += rng.gen_range(-40.0..40.0);
        }
        let detector = RPeakDetector::new(FS);
        let peaks = detector.detect(&signal, &signal);
        assert!(
            (6..=9).contains(&peaks.len()),
            "expected about 8 beats under noise, got {}",
            peaks.len()
        );
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] >= detector.refractory_samples());
        }
    }

    #[test]
    fn test_flat_signal_no_peaks() {
        let detector = RPeakDetector::new(FS);
        let flat = vec![0.0; 650];
        assert!(detector.detect(&flat, &flat).is_empty());
        let flat = vec![5.0; 650];
        // Constant signal: nothing exceeds the threshold blend.
        assert!(detector.detect(&flat, &flat).is_empty());
    }

    #[test]
    fn test_short_window_no_peaks() {
        let detector = RPeakDetector::new(FS);
        let signal = vec![1.0; 8];
        assert!(detector.detect(&signal, &signal).is_empty());
    }

    #[test]
    fn test_mean_rr_samples() {
        let detector = RPeakDetector::new(FS);
        assert!((detector.mean_rr_samples(&[]) - 0.8 * FS).abs() < 1e-9);
        assert!((detector.mean_rr_samples(&[100]) - 0.8 * FS).abs() < 1e-9);
        let peaks = [100usize, 230, 360];
        assert!((detector.mean_rr_samples(&peaks) - 130.0).abs() < 1e-9);
    }
}
