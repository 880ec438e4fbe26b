//! Ingress adapter: normalizes inbound sensor events onto the pipeline's
//! time base.
//!
//! Three streams come in: ECG sample batches, accelerometer frames, and the
//! sensor's own R-R intervals. The adapter assigns timestamps from the
//! declared sampling rates (never from wall clock), scales device units,
//! validates R-R intervals against the physiological 300..=2000 ms gate, and
//! maintains the bounded raw buffers. Invalid input is dropped silently with
//! a counter; a malformed frame never halts a stream.

use crate::sample_ring::{MotionRing, SampleRing};
use crate::types::{AccSample, EcgSample, SamplingRates};

/// Lower bound of an acceptable R-R interval, milliseconds.
pub const RR_MIN_MS: f64 = 300.0;
/// Upper bound of an acceptable R-R interval, milliseconds.
pub const RR_MAX_MS: f64 = 2000.0;

/// Drop and acceptance counters per inbound stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub ecg_samples_accepted: u64,
    pub acc_samples_accepted: u64,
    pub acc_frames_dropped: u64,
    pub rr_accepted: u64,
    pub rr_rejected: u64,
}

/// Normalizes inbound events and owns the raw bounded buffers.
#[derive(Debug, Clone)]
pub struct IngressAdapter {
    rates: SamplingRates,
    acc_scale: f64,
    ecg: SampleRing,
    acc: MotionRing,
    last_ecg_time: Option<f64>,
    last_acc_time: Option<f64>,
    stats: IngressStats,
}

impl IngressAdapter {
    /// Create an adapter for the given rates and buffer capacities.
    pub fn new(
        rates: SamplingRates,
        acc_scale: f64,
        ecg_buffer_len: usize,
        acc_buffer_len: usize,
    ) -> Self {
        Self {
            rates,
            acc_scale,
            ecg: SampleRing::new(ecg_buffer_len),
            acc: MotionRing::new(acc_buffer_len),
            last_ecg_time: None,
            last_acc_time: None,
            stats: IngressStats::default(),
        }
    }

    /// The sampling rates this session attached with.
    pub fn rates(&self) -> SamplingRates {
        self.rates
    }

    /// Accept a batch of raw ECG counts in arrival order.
    ///
    /// Each sample is stamped one ECG period after the previously accepted
    /// sample; the very first sample of the session is stamped 0. The batch
    /// is appended to the bounded ECG ring and returned with its timestamps
    /// so the caller can run the sample-synchronous stages.
    pub fn accept_ecg_batch(&mut self, counts: &[i32]) -> Vec<EcgSample> {
        let period = 1.0 / self.rates.fs_ecg;
        let mut out = Vec::with_capacity(counts.len());
        for &count in counts {
            let t = match self.last_ecg_time {
                None => 0.0,
                Some(prev) => prev + period,
            };
            self.last_ecg_time = Some(t);
            let sample = EcgSample {
                timestamp_s: t,
                value: count as f64,
            };
            self.ecg.push(t, sample.value);
            out.push(sample);
        }
        self.stats.ecg_samples_accepted += out.len() as u64;
        out
    }

    /// Accept an accelerometer frame as parallel x/y/z arrays in device
    /// units.
    ///
    /// A frame whose arrays disagree in length is malformed and dropped
    /// whole. Returns the number of samples accepted.
    pub fn accept_acc_frame(&mut self, x: &[i16], y: &[i16], z: &[i16]) -> usize {
        if x.len() != y.len() || y.len() != z.len() {
            self.stats.acc_frames_dropped += 1;
            tracing::debug!(
                x = x.len(),
                y = y.len(),
                z = z.len(),
                "dropping accelerometer frame with mismatched axis lengths"
            );
            return 0;
        }
        let period = 1.0 / self.rates.fs_acc;
        for i in 0..x.len() {
            let t = match self.last_acc_time {
                None => 0.0,
                Some(prev) => prev + period,
            };
            self.last_acc_time = Some(t);
            let sample = AccSample {
                timestamp_s: t,
                x: x[i] as f64 * self.acc_scale,
                y: y[i] as f64 * self.acc_scale,
                z: z[i] as f64 * self.acc_scale,
            };
            self.acc
                .push(t, sample.magnitude(), sample.motion_component());
        }
        self.stats.acc_samples_accepted += x.len() as u64;
        x.len()
    }

    /// Validate one sensor-reported R-R interval.
    ///
    /// Values outside 300..=2000 ms are ectopic beats or artifacts and are
    /// rejected. Returns the accepted value.
    pub fn accept_rr(&mut self, rr_ms: f64) -> Option<f64> {
        if !rr_ms.is_finite() || !(RR_MIN_MS..=RR_MAX_MS).contains(&rr_ms) {
            self.stats.rr_rejected += 1;
            tracing::debug!(rr_ms, "rejecting out-of-range r-r interval");
            return None;
        }
        self.stats.rr_accepted += 1;
        Some(rr_ms)
    }

    /// The raw ECG ring.
    pub fn ecg(&self) -> &SampleRing {
        &self.ecg
    }

    /// The motion reference ring.
    pub fn acc(&self) -> &MotionRing {
        &self.acc
    }

    /// Latest timestamp seen on any stream; the session clock.
    pub fn session_time(&self) -> f64 {
        match (self.last_ecg_time, self.last_acc_time) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 0.0,
        }
    }

    /// Stream counters.
    pub fn stats(&self) -> IngressStats {
        self.stats
    }
}
