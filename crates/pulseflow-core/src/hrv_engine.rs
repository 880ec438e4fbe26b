//! HRV engine: the R-R window owner and metric dispatcher.
//!
//! Every accepted R-R interval triggers a recompute of all metrics whose
//! window requirement is met. The time-domain metrics come first (cheap,
//! always wanted), the spectral metrics after. Each metric is identified by
//! a [`MetricKind`]; `compute` is a pure function of the window so there is
//! no hidden state to keep consistent between metrics.
//!
//! ```rust
//! use pulseflow_core::hrv_engine::{HrvEngine, MetricKind};
//! use pulseflow_core::config::BandNormalization;
//!
//! let mut engine = HrvEngine::new(60, BandNormalization::default());
//! let mut last = Vec::new();
//! for rr in [1000.0, 990.0, 1010.0, 1005.0, 995.0, 1000.0] {
//!     last = engine.push_rr(rr);
//! }
//! let sdnn = last.iter().find(|(k, _)| *k == MetricKind::Sdnn).unwrap().1;
//! assert!(sdnn > 0.0);
//! ```

use crate::config::BandNormalization;
use crate::hrv_freq::{self, BandPowers};
use crate::hrv_time;
use crate::metric_store::{MetricValue, Unit};
use crate::rr_window::RrWindow;

/// Identity of a published HRV metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    MeanRr,
    HeartRate,
    Sdnn,
    Rmssd,
    Pnn50,
    MxDMn,
    Amo50,
    Cv,
    VlfPower,
    LfPower,
    HfPower,
    TotalPower,
    /// Single-pass whole-band estimate, published as a cross-check beside
    /// the summed total.
    TotalPowerDirect,
    LfHfRatio,
}

impl MetricKind {
    /// Emission order: time domain first, then spectral.
    pub const ALL: [MetricKind; 14] = [
        MetricKind::MeanRr,
        MetricKind::HeartRate,
        MetricKind::Sdnn,
        MetricKind::Rmssd,
        MetricKind::Pnn50,
        MetricKind::MxDMn,
        MetricKind::Amo50,
        MetricKind::Cv,
        MetricKind::VlfPower,
        MetricKind::LfPower,
        MetricKind::HfPower,
        MetricKind::TotalPower,
        MetricKind::TotalPowerDirect,
        MetricKind::LfHfRatio,
    ];

    /// Stable stream/store name.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::MeanRr => "mean_rr",
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Sdnn => "sdnn",
            MetricKind::Rmssd => "rmssd",
            MetricKind::Pnn50 => "pnn50",
            MetricKind::MxDMn => "mxdmn",
            MetricKind::Amo50 => "amo50",
            MetricKind::Cv => "cv",
            MetricKind::VlfPower => "vlf_power",
            MetricKind::LfPower => "lf_power",
            MetricKind::HfPower => "hf_power",
            MetricKind::TotalPower => "total_power",
            MetricKind::TotalPowerDirect => "total_power_direct",
            MetricKind::LfHfRatio => "lf_hf",
        }
    }

    /// Unit carried on the metric stream.
    pub fn unit(&self) -> Unit {
        match self {
            MetricKind::MeanRr
            | MetricKind::Sdnn
            | MetricKind::Rmssd
            | MetricKind::MxDMn => Unit::Milliseconds,
            MetricKind::HeartRate => Unit::BeatsPerMinute,
            MetricKind::Pnn50 | MetricKind::Amo50 | MetricKind::Cv => Unit::Percent,
            MetricKind::VlfPower
            | MetricKind::LfPower
            | MetricKind::HfPower
            | MetricKind::TotalPower
            | MetricKind::TotalPowerDirect => Unit::MillisecondsSquared,
            MetricKind::LfHfRatio => Unit::Ratio,
        }
    }

    /// Decimal places a consumer should display.
    pub fn precision(&self) -> u8 {
        match self {
            MetricKind::HeartRate => 0,
            MetricKind::Cv | MetricKind::LfHfRatio => 2,
            _ => 1,
        }
    }

    /// True for the spectral metrics.
    pub fn is_frequency_domain(&self) -> bool {
        matches!(
            self,
            MetricKind::VlfPower
                | MetricKind::LfPower
                | MetricKind::HfPower
                | MetricKind::TotalPower
                | MetricKind::TotalPowerDirect
                | MetricKind::LfHfRatio
        )
    }
}

/// Pure metric evaluation over an R-R window.
///
/// Spectral kinds are recomputed from scratch here; when all of them are
/// wanted at once, [`HrvEngine::push_rr`] shares one [`BandPowers`] pass
/// instead.
pub fn compute(kind: MetricKind, rr: &[f64], norms: &BandNormalization) -> f64 {
    match kind {
        MetricKind::MeanRr => hrv_time::mean(rr),
        MetricKind::HeartRate => hrv_time::heart_rate_bpm(rr),
        MetricKind::Sdnn => hrv_time::sdnn(rr),
        MetricKind::Rmssd => hrv_time::rmssd(rr),
        MetricKind::Pnn50 => hrv_time::pnn50(rr),
        MetricKind::MxDMn => hrv_time::mxdmn(rr),
        MetricKind::Amo50 => hrv_time::amo50(rr),
        MetricKind::Cv => hrv_time::cv(rr),
        MetricKind::VlfPower => hrv_freq::band_power(rr, hrv_freq::VLF, norms.vlf),
        MetricKind::LfPower => hrv_freq::band_power(rr, hrv_freq::LF, norms.lf),
        MetricKind::HfPower => hrv_freq::band_power(rr, hrv_freq::HF, norms.hf),
        MetricKind::TotalPower => {
            let powers = BandPowers::compute(rr, norms);
            powers.total
        }
        MetricKind::TotalPowerDirect => hrv_freq::direct_total_power(rr, norms),
        MetricKind::LfHfRatio => {
            let powers = BandPowers::compute(rr, norms);
            powers.lf_hf_ratio()
        }
    }
}

/// Window owner and per-beat recompute driver.
#[derive(Debug, Clone)]
pub struct HrvEngine {
    window: RrWindow,
    norms: BandNormalization,
    beats_accepted: u64,
}

impl HrvEngine {
    /// Create an engine with the given window capacity and band divisors.
    pub fn new(window_capacity: usize, norms: BandNormalization) -> Self {
        Self {
            window: RrWindow::new(window_capacity),
            norms,
            beats_accepted: 0,
        }
    }

    /// Accept one R-R interval and recompute every metric.
    ///
    /// Returns `(kind, value)` pairs in emission order: time domain first,
    /// then frequency domain. Metrics whose window requirement is unmet come
    /// back as 0.
    pub fn push_rr(&mut self, rr_ms: f64) -> Vec<(MetricKind, f64)> {
        self.window.push(rr_ms);
        self.beats_accepted += 1;
        let rr = self.window.to_vec();

        let mut out = Vec::with_capacity(MetricKind::ALL.len());
        for kind in MetricKind::ALL.iter().filter(|k| !k.is_frequency_domain()) {
            out.push((*kind, compute(*kind, &rr, &self.norms)));
        }

        // One autocovariance pass serves the per-band outputs; the direct
        // whole-band cross-check runs its own.
        let powers = BandPowers::compute(&rr, &self.norms);
        out.push((MetricKind::VlfPower, powers.vlf));
        out.push((MetricKind::LfPower, powers.lf));
        out.push((MetricKind::HfPower, powers.hf));
        out.push((MetricKind::TotalPower, powers.total));
        out.push((
            MetricKind::TotalPowerDirect,
            hrv_freq::direct_total_power(&rr, &self.norms),
        ));
        out.push((MetricKind::LfHfRatio, powers.lf_hf_ratio()));
        out
    }

    /// Wrap a metric value with its unit and precision for publication.
    pub fn metric_value(kind: MetricKind, value: f64) -> MetricValue {
        MetricValue::new(value, kind.unit(), kind.precision())
    }

    /// Number of intervals currently in the window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Intervals accepted over the session.
    pub fn beats_accepted(&self) -> u64 {
        self.beats_accepted
    }

    /// Copy of the current window, oldest first.
    pub fn window(&self) -> Vec<f64> {
        self.window.to_vec()
    }

    /// Drop all window state.
    pub fn reset(&mut self) {
        self.window.clear();
        self.beats_accepted = 0;
    }
}
