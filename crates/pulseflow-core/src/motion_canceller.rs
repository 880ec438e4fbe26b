//! Motion artifact cancellation for chest-strap ECG.
//!
//! Strap movement couples into the ECG electrodes as low-frequency noise that
//! is strongly correlated with the accelerometer signal. This module removes
//! it with an adaptive filter that uses the acceleration magnitude as a noise
//! reference.
//!
//! # Algorithm
//!
//! For each ECG sample `x` with a reference magnitude `m` available:
//!
//! ```text
//! n_hat = w . taps            (estimated motion noise)
//! e     = x - n_hat           (clean output)
//! w     = w + mu * e * taps   (LMS)
//! w     = w + mu * e * taps / (||taps||^2 + delta)   (NLMS)
//! ```
//!
//! The step size is boosted while the wearer is in motion (motion component
//! above a threshold) so the filter tracks fast posture changes, and kept at
//! its nominal value at rest where stability matters more than speed.
//!
//! # Example
//!
//! ```rust
//! use pulseflow_core::motion_canceller::{MotionCanceller, CancellerSettings};
//!
//! let mut canceller = MotionCanceller::new(CancellerSettings::default());
//!
//! // Noise perfectly correlated with the reference converges toward zero.
//! let mut residual = 0.0;
//! for i in 0..2000 {
//!     let m = (i as f64 * 0.05).sin();
//!     let x = 0.8 * m;
//!     residual = canceller.process(x, m, 0.0);
//! }
//! assert!(residual.abs() < 0.1);
//! ```

use std::collections::VecDeque;

/// Settings for the adaptive motion canceller.
#[derive(Debug, Clone, Copy)]
pub struct CancellerSettings {
    /// Number of reference taps.
    pub filter_order: usize,
    /// Nominal step size.
    pub step_size: f64,
    /// Use the power-normalized (NLMS) update.
    pub normalized: bool,
    /// Regularization added to the reference power in the NLMS update.
    pub regularization: f64,
    /// Motion component (g) above which the step is boosted.
    pub motion_threshold_g: f64,
    /// Step multiplier while in motion.
    pub motion_step_boost: f64,
    /// Length of the residual window used for the convergence report.
    pub convergence_window: usize,
}

impl Default for CancellerSettings {
    fn default() -> Self {
        Self {
            filter_order: 15,
            step_size: 0.005,
            normalized: true,
            regularization: 1e-8,
            motion_threshold_g: 0.15,
            motion_step_boost: 3.0,
            convergence_window: 50,
        }
    }
}

impl From<&crate::config::PipelineConfig> for CancellerSettings {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            filter_order: config.lms.filter_order,
            step_size: config.lms.step_size,
            normalized: config.lms.normalized,
            regularization: config.lms.regularization,
            motion_threshold_g: config.motion_threshold_g,
            ..Default::default()
        }
    }
}

/// Adaptive canceller removing accelerometer-correlated noise from ECG.
#[derive(Debug, Clone)]
pub struct MotionCanceller {
    settings: CancellerSettings,
    /// FIFO of recent reference magnitudes, newest first.
    taps: VecDeque<f64>,
    weights: Vec<f64>,
    /// Rolling window of residual magnitudes for the convergence report.
    residuals: VecDeque<f64>,
    enabled: bool,
    in_motion: bool,
    samples_processed: u64,
}

impl MotionCanceller {
    /// Create a canceller with the given settings.
    pub fn new(settings: CancellerSettings) -> Self {
        let order = settings.filter_order.max(1);
        Self {
            settings: CancellerSettings {
                filter_order: order,
                ..settings
            },
            taps: VecDeque::with_capacity(order),
            weights: vec![0.0; order],
            residuals: VecDeque::with_capacity(settings.convergence_window.max(2)),
            enabled: true,
            in_motion: false,
            samples_processed: 0,
        }
    }

    /// Run one filter step.
    ///
    /// `x` is the ECG sample, `magnitude` the time-aligned reference
    /// magnitude, `motion` the gravity-free motion component. Returns the
    /// cleaned sample. When the canceller is bypassed the input passes
    /// through unchanged and no state is updated.
    pub fn process(&mut self, x: f64, magnitude: f64, motion: f64) -> f64 {
        if !self.enabled {
            return x;
        }

        self.in_motion = motion > self.settings.motion_threshold_g;

        if self.taps.len() == self.settings.filter_order {
            self.taps.pop_back();
        }
        self.taps.push_front(magnitude);

        let mut estimate = 0.0;
        let mut power = 0.0;
        for (w, &m) in self.weights.iter().zip(self.taps.iter()) {
            estimate += w * m;
            power += m * m;
        }

        let error = x - estimate;

        let mut step = self.settings.step_size;
        if self.in_motion {
            step *= self.settings.motion_step_boost;
        }
        if self.settings.normalized {
            step /= power + self.settings.regularization;
        }
        for (w, &m) in self.weights.iter_mut().zip(self.taps.iter()) {
            *w += step * error * m;
        }

        if self.residuals.len() == self.settings.convergence_window.max(2) {
            self.residuals.pop_front();
        }
        self.residuals.push_back(error.abs());
        self.samples_processed += 1;

        error
    }

    /// Pass a sample through untouched, keeping the residual window honest.
    ///
    /// Used when no reference sample lies within the alignment tolerance.
    pub fn passthrough(&mut self, x: f64) -> f64 {
        self.samples_processed += 1;
        x
    }

    /// Convergence report: true when the residual window is full and its
    /// variance has fallen below 10% of its mean. Informational only, the
    /// output is usable either way.
    pub fn is_converged(&self) -> bool {
        let window = self.settings.convergence_window.max(2);
        if self.residuals.len() < window {
            return false;
        }
        let n = self.residuals.len() as f64;
        let mean = self.residuals.iter().sum::<f64>() / n;
        if mean < 1e-12 {
            return true;
        }
        let variance = self
            .residuals
            .iter()
            .map(|&r| (r - mean) * (r - mean))
            .sum::<f64>()
            / n;
        variance < 0.1 * mean
    }

    /// Whether the last processed reference put the wearer in motion.
    pub fn in_motion(&self) -> bool {
        self.in_motion
    }

    /// Whether the canceller is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or bypass the canceller at runtime.
    ///
    /// Re-enabling starts from scratch: taps and weights are cleared so a
    /// stale noise model never corrupts fresh data.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    /// Current weight vector.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Samples seen since the last reset.
    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    /// Clear all adaptive state.
    pub fn reset(&mut self) {
        self.taps.clear();
        self.weights.fill(0.0);
        self.residuals.clear();
        self.in_motion = false;
        self.samples_processed = 0;
    }
}
