//! Pipeline configuration.
//!
//! Provides YAML-based configuration for the pipeline, including:
//!
//! - R-R window sizing and QTc formula selection
//! - Adaptive filter parameters (order, step size, motion gating)
//! - Display window and refresh cadence
//! - Spectral band normalization constants
//! - Logging configuration
//!
//! All limits are clamped to their valid ranges with a logged warning; a bad
//! value in a config file is never fatal.
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via the `PULSEFLOW_CONFIG` environment variable
//! 2. `./pulseflow.yaml` (current directory)
//! 3. `~/.config/pulseflow/config.yaml` (user config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! rr_window_count: 60
//! qtc_formula: fridericia
//! history_seconds: 5.0
//! lms:
//!   filter_order: 15
//!   step_size: 0.005
//!   normalized: true
//! motion_threshold_g: 0.15
//! display_tick_ms: 50
//! ```

use crate::observe::LogConfig;
use crate::types::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bounds for the R-R sliding window capacity.
pub const RR_WINDOW_MIN: usize = 2;
/// Upper bound for the R-R sliding window capacity.
pub const RR_WINDOW_MAX: usize = 1000;

/// Rate-correction formula for the QT interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QtcFormula {
    /// QTc = QT / RR^(1/2), RR in seconds.
    Bazett,
    /// QTc = QT / RR^(1/3), RR in seconds.
    Fridericia,
}

impl Default for QtcFormula {
    fn default() -> Self {
        QtcFormula::Fridericia
    }
}

/// Adaptive noise canceller settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmsConfig {
    /// Number of reference taps.
    pub filter_order: usize,
    /// Nominal step size (learning rate).
    pub step_size: f64,
    /// Normalize the step by reference power (NLMS) instead of plain LMS.
    pub normalized: bool,
    /// Regularization added to the reference power in the NLMS update.
    pub regularization: f64,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self {
            filter_order: 15,
            step_size: 0.005,
            normalized: true,
            regularization: 1e-8,
        }
    }
}

/// Per-band divisors applied to raw spectral power estimates.
///
/// The divisors bring the four band estimates onto a common ms^2 scale.
/// They are deliberately configurable rather than hard constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandNormalization {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    /// Divisor for the single-pass whole-band estimate published as
    /// `total_power_direct`. The headline total power is the sum of the
    /// three band powers and does not use this divisor.
    pub total: f64,
}

impl Default for BandNormalization {
    fn default() -> Self {
        Self {
            vlf: 1.0,
            lf: 4.5,
            hf: 0.87,
            total: 8.0,
        }
    }
}

/// Top-level pipeline configuration.
///
/// Every field has a default; a config file may specify any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the R-R sliding window, clamped to [2, 1000].
    pub rr_window_count: usize,
    /// Rate-correction formula for emitted QTc values.
    pub qtc_formula: QtcFormula,
    /// Display window length in seconds. Also the analysis window for the
    /// fiducial detector.
    pub history_seconds: f64,
    /// Adaptive noise canceller settings.
    pub lms: LmsConfig,
    /// Motion component (g) above which the canceller tracks faster.
    pub motion_threshold_g: f64,
    /// Cadence of the periodic display/fiducial recompute, milliseconds.
    pub display_tick_ms: u64,
    /// Scale factor from accelerometer device units to g.
    pub acc_scale: f64,
    /// Capacity of the ECG sample ring.
    pub ecg_buffer_len: usize,
    /// Capacity of the accelerometer reference ring.
    pub acc_buffer_len: usize,
    /// Spectral band normalization divisors.
    pub band_normalization: BandNormalization,
    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rr_window_count: 60,
            qtc_formula: QtcFormula::default(),
            history_seconds: 5.0,
            lms: LmsConfig::default(),
            motion_threshold_g: 0.15,
            display_tick_ms: 50,
            acc_scale: 0.01,
            ecg_buffer_len: 5000,
            acc_buffer_len: 500,
            band_normalization: BandNormalization::default(),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Clamp every field to its valid range, warning on each adjustment.
    ///
    /// Returns the number of fields that had to be adjusted.
    pub fn sanitize(&mut self) -> usize {
        let mut adjusted = 0;

        if self.rr_window_count < RR_WINDOW_MIN || self.rr_window_count > RR_WINDOW_MAX {
            let clamped = self.rr_window_count.clamp(RR_WINDOW_MIN, RR_WINDOW_MAX);
            tracing::warn!(
                requested = self.rr_window_count,
                clamped,
                "rr_window_count out of range, clamping"
            );
            self.rr_window_count = clamped;
            adjusted += 1;
        }

        if !self.history_seconds.is_finite() || self.history_seconds <= 0.0 {
            tracing::warn!(
                requested = self.history_seconds,
                "history_seconds must be positive, using 5.0"
            );
            self.history_seconds = 5.0;
            adjusted += 1;
        }

        if self.lms.filter_order == 0 {
            tracing::warn!("lms.filter_order must be at least 1, using 1");
            self.lms.filter_order = 1;
            adjusted += 1;
        }

        if !self.lms.step_size.is_finite() || self.lms.step_size <= 0.0 {
            tracing::warn!(
                requested = self.lms.step_size,
                "lms.step_size must be positive, using 0.005"
            );
            self.lms.step_size = 0.005;
            adjusted += 1;
        }

        if !self.motion_threshold_g.is_finite() || self.motion_threshold_g < 0.0 {
            tracing::warn!(
                requested = self.motion_threshold_g,
                "motion_threshold_g must be non-negative, using 0.15"
            );
            self.motion_threshold_g = 0.15;
            adjusted += 1;
        }

        if self.display_tick_ms == 0 {
            tracing::warn!("display_tick_ms must be at least 1, using 50");
            self.display_tick_ms = 50;
            adjusted += 1;
        }

        if self.ecg_buffer_len < 2 {
            tracing::warn!(
                requested = self.ecg_buffer_len,
                "ecg_buffer_len too small, using 5000"
            );
            self.ecg_buffer_len = 5000;
            adjusted += 1;
        }

        if self.acc_buffer_len < 2 {
            tracing::warn!(
                requested = self.acc_buffer_len,
                "acc_buffer_len too small, using 500"
            );
            self.acc_buffer_len = 500;
            adjusted += 1;
        }

        for (name, v) in [
            ("vlf", &mut self.band_normalization.vlf),
            ("lf", &mut self.band_normalization.lf),
            ("hf", &mut self.band_normalization.hf),
            ("total", &mut self.band_normalization.total),
        ] {
            if !v.is_finite() || *v <= 0.0 {
                tracing::warn!(band = name, requested = *v, "band divisor must be positive, using 1.0");
                *v = 1.0;
                adjusted += 1;
            }
        }

        adjusted
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigRead(format!("{}: {}", path.display(), e)))?;
        let mut config: Self = serde_yaml::from_str(&text)
            .map_err(|e| PipelineError::ConfigParse(format!("{}: {}", path.display(), e)))?;
        config.sanitize();
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> PipelineResult<String> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::ConfigParse(e.to_string()))
    }

    /// Load from the standard search path, or defaults when no file exists.
    pub fn load() -> Self {
        for candidate in Self::search_paths() {
            if candidate.exists() {
                match Self::from_file(&candidate) {
                    Ok(config) => {
                        tracing::info!(path = %candidate.display(), "loaded pipeline config");
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!(path = %candidate.display(), error = %e, "ignoring unreadable config");
                    }
                }
            }
        }
        Self::default()
    }

    /// Candidate config file locations, highest priority first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(env_path) = std::env::var("PULSEFLOW_CONFIG") {
            paths.push(PathBuf::from(env_path));
        }
        paths.push(PathBuf::from("./pulseflow.yaml"));
        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("pulseflow")
                    .join("config.yaml"),
            );
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.rr_window_count, 60);
        assert_eq!(config.qtc_formula, QtcFormula::Fridericia);
        assert_eq!(config.lms.filter_order, 15);
        assert!((config.lms.step_size - 0.005).abs() < 1e-12);
        assert!(config.lms.normalized);
        assert!((config.motion_threshold_g - 0.15).abs() < 1e-12);
        assert_eq!(config.display_tick_ms, 50);
        assert_eq!(config.ecg_buffer_len, 5000);
        assert_eq!(config.acc_buffer_len, 500);
        assert!((config.band_normalization.hf - 0.87).abs() < 1e-12);
    }

    #[test]
    fn test_sanitize_clamps_rr_window() {
        let mut config = PipelineConfig {
            rr_window_count: 1,
            ..Default::default()
        };
        let adjusted = config.sanitize();
        assert_eq!(config.rr_window_count, RR_WINDOW_MIN);
        assert_eq!(adjusted, 1);

        let mut config = PipelineConfig {
            rr_window_count: 5000,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.rr_window_count, RR_WINDOW_MAX);
    }

    #[test]
    fn test_sanitize_rejects_bad_floats() {
        let mut config = PipelineConfig::default();
        config.history_seconds = f64::NAN;
        config.lms.step_size = -1.0;
        config.band_normalization.lf = 0.0;
        let adjusted = config.sanitize();
        assert_eq!(adjusted, 3);
        assert!((config.history_seconds - 5.0).abs() < 1e-12);
        assert!((config.lms.step_size - 0.005).abs() < 1e-12);
        assert!((config.band_normalization.lf - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sanitize_clean_config_untouched() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.sanitize(), 0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = PipelineConfig {
            rr_window_count: 120,
            qtc_formula: QtcFormula::Bazett,
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        let parsed: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.rr_window_count, 120);
        assert_eq!(parsed.qtc_formula, QtcFormula::Bazett);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: PipelineConfig =
            serde_yaml::from_str("rr_window_count: 30\nqtc_formula: bazett\n").unwrap();
        assert_eq!(parsed.rr_window_count, 30);
        assert_eq!(parsed.qtc_formula, QtcFormula::Bazett);
        assert_eq!(parsed.display_tick_ms, 50);
        assert_eq!(parsed.lms.filter_order, 15);
    }
}
