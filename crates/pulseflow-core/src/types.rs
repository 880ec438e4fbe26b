//! Core types shared across the pipeline.
//!
//! This module defines the sample, fiducial, and event types that flow
//! between pipeline stages, together with the crate-level error enum.
//!
//! ## Time base
//!
//! Every stream carries timestamps in seconds from session start. Timestamps
//! within a stream are strictly non-decreasing; they are assigned by the
//! ingress adapter from the stream's sampling rate, never taken from wall
//! clock.

use serde::{Deserialize, Serialize};

/// A real-valued signal sample.
pub type Sample = f64;

/// Result type for fallible pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while constructing or configuring the pipeline.
///
/// Event handlers on the hot path never return errors; invalid input is
/// dropped and counted instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid sampling rate: {0} Hz. Must be positive and finite")]
    InvalidSamplingRate(f64),

    #[error("no session attached")]
    NotAttached,

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("failed to read config: {0}")]
    ConfigRead(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),
}

/// Per-stream sampling rates, provided when the streams attach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingRates {
    /// ECG sampling rate in Hz (chest straps commonly deliver ~130 Hz).
    pub fs_ecg: f64,
    /// Accelerometer sampling rate in Hz (commonly ~200 Hz).
    pub fs_acc: f64,
}

impl SamplingRates {
    /// Create a rate pair, validating both rates.
    pub fn new(fs_ecg: f64, fs_acc: f64) -> PipelineResult<Self> {
        for &fs in &[fs_ecg, fs_acc] {
            if !fs.is_finite() || fs <= 0.0 {
                return Err(PipelineError::InvalidSamplingRate(fs));
            }
        }
        Ok(Self { fs_ecg, fs_acc })
    }
}

impl Default for SamplingRates {
    fn default() -> Self {
        Self {
            fs_ecg: 130.0,
            fs_acc: 200.0,
        }
    }
}

/// One timestamped ECG sample in raw sensor counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcgSample {
    /// Seconds from session start.
    pub timestamp_s: f64,
    /// Sign-extended 24-bit sensor reading.
    pub value: f64,
}

/// One timestamped accelerometer sample, scaled to g units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccSample {
    /// Seconds from session start.
    pub timestamp_s: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccSample {
    /// Vector magnitude in g.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Motion component with the 1 g gravity baseline removed.
    pub fn motion_component(&self) -> f64 {
        (self.magnitude() - 1.0).abs()
    }
}

/// Sign-extend a raw 24-bit two's-complement reading into an `i32`.
///
/// ```
/// use pulseflow_core::types::sign_extend_24;
///
/// assert_eq!(sign_extend_24(0x00_0001), 1);
/// assert_eq!(sign_extend_24(0xFF_FFFF), -1);
/// assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
/// ```
pub fn sign_extend_24(raw: u32) -> i32 {
    ((raw as i32) << 8) >> 8
}

/// Kind of a named point in the ECG waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiducialKind {
    /// R wave apex.
    R,
    /// Q onset before the R wave.
    Q,
    /// T wave apex.
    TPeak,
    /// T wave offset.
    TEnd,
}

impl FiducialKind {
    /// Stable stream name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            FiducialKind::R => "r",
            FiducialKind::Q => "q",
            FiducialKind::TPeak => "t_peak",
            FiducialKind::TEnd => "t_end",
        }
    }
}

/// A located fiducial point.
///
/// The `global_index` addresses the session-wide ECG sample stream; once the
/// index falls out of the bounded ECG buffer the point is unreferenced and
/// may be pruned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialPoint {
    pub kind: FiducialKind,
    /// Index into the session-wide ECG sample stream.
    pub global_index: u64,
    /// Seconds from session start.
    pub timestamp_s: f64,
    /// Conditioned sample value at the point.
    pub value: f64,
}

/// One accepted QT measurement.
///
/// Accepted only when the fiducials are ordered `q < t_peak < t_end` and the
/// interval lies in the physiological 230..=660 ms range. Emitted at most
/// once per R peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QtEvent {
    /// Global index of the Q onset.
    pub q_index: u64,
    /// Global index of the R apex this measurement belongs to.
    pub r_index: u64,
    /// Global index of the T offset.
    pub tend_index: u64,
    /// QT interval in milliseconds.
    pub qt_ms: f64,
    /// Rate-corrected QT in milliseconds.
    pub qtc_ms: f64,
    /// Timestamp of the Q onset, seconds.
    pub q_time_s: f64,
    /// Timestamp of the R apex, seconds.
    pub r_time_s: f64,
    /// Timestamp of the T offset, seconds.
    pub tend_time_s: f64,
}

/// Interpretive vulnerability grade derived from the health index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnerabilityLabel {
    Optimal,
    Slight,
    Moderate,
    High,
    Severe,
}

impl VulnerabilityLabel {
    /// Grade a health index on the fixed range boundaries.
    pub fn from_health_index(health: f64) -> Self {
        if health >= 95.0 {
            VulnerabilityLabel::Optimal
        } else if health >= 80.0 {
            VulnerabilityLabel::Slight
        } else if health >= 60.0 {
            VulnerabilityLabel::Moderate
        } else if health >= 40.0 {
            VulnerabilityLabel::High
        } else {
            VulnerabilityLabel::Severe
        }
    }
}

impl std::fmt::Display for VulnerabilityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VulnerabilityLabel::Optimal => "optimal",
            VulnerabilityLabel::Slight => "slight",
            VulnerabilityLabel::Moderate => "moderate",
            VulnerabilityLabel::High => "high",
            VulnerabilityLabel::Severe => "severe",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_rates_validation() {
        assert!(SamplingRates::new(130.0, 200.0).is_ok());
        assert!(SamplingRates::new(0.0, 200.0).is_err());
        assert!(SamplingRates::new(130.0, f64::NAN).is_err());
        assert!(SamplingRates::new(-1.0, 200.0).is_err());
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend_24(0), 0);
        assert_eq!(sign_extend_24(0x7F_FFFF), 8_388_607);
        assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
        assert_eq!(sign_extend_24(0xFF_FFFE), -2);
    }

    #[test]
    fn test_acc_magnitude_and_motion() {
        let at_rest = AccSample {
            timestamp_s: 0.0,
            x: 0.0,
            y: 0.0,
            z: 1.0,
        };
        assert!((at_rest.magnitude() - 1.0).abs() < 1e-12);
        assert!(at_rest.motion_component() < 1e-12);

        let moving = AccSample {
            timestamp_s: 0.0,
            x: 0.6,
            y: 0.8,
            z: 0.0,
        };
        assert!((moving.magnitude() - 1.0).abs() < 1e-12);

        let shaken = AccSample {
            timestamp_s: 0.0,
            x: 3.0,
            y: 0.0,
            z: 4.0,
        };
        assert!((shaken.magnitude() - 5.0).abs() < 1e-12);
        assert!((shaken.motion_component() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_vulnerability_boundaries() {
        assert_eq!(
            VulnerabilityLabel::from_health_index(100.0),
            VulnerabilityLabel::Optimal
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(95.0),
            VulnerabilityLabel::Optimal
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(94.9),
            VulnerabilityLabel::Slight
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(80.0),
            VulnerabilityLabel::Slight
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(60.0),
            VulnerabilityLabel::Moderate
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(40.0),
            VulnerabilityLabel::High
        );
        assert_eq!(
            VulnerabilityLabel::from_health_index(39.9),
            VulnerabilityLabel::Severe
        );
    }

    #[test]
    fn test_fiducial_kind_names() {
        assert_eq!(FiducialKind::R.name(), "r");
        assert_eq!(FiducialKind::TEnd.name(), "t_end");
    }
}
