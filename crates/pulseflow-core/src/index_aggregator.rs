//! Composite physiological indices.
//!
//! Takes the per-beat HRV values (LF/HF, SDNN, RMSSD, total power) and folds
//! them into interpretive 0..=100 indices: autonomic activity scores (SNS,
//! PSNS), stress, energy, and health with a derived vulnerability grade.
//!
//! Each physiological input is first mapped onto a 0..=100 "stress
//! contribution" scale by a piecewise-linear curve (higher means more
//! stress; good HRV maps low). The composite formulas then mix the
//! normalized values with fixed weights, and each emitted index is smoothed
//! with an adaptive exponential blend: big jumps get a higher blend weight
//! so the index tracks real change quickly, while small fluctuations are
//! damped hard.
//!
//! Indices only start moving once the R-R window holds at least 5
//! intervals; before that the previous emission (0 on cold start) is held.

use crate::types::VulnerabilityLabel;
use std::collections::VecDeque;

/// Number of past emissions kept per index.
const HISTORY_LEN: usize = 20;
/// Minimum R-R window fill before the indices react.
pub const MIN_WINDOW_LEN: usize = 5;

/// Store/stream name of the stress index.
pub const STRESS_INDEX: &str = "stress_index";
/// Store/stream name of the energy index.
pub const ENERGY_INDEX: &str = "energy_index";
/// Store/stream name of the health index.
pub const HEALTH_INDEX: &str = "health_index";
/// Store/stream name of the sympathetic activity score.
pub const SNS_SCORE: &str = "sns_score";
/// Store/stream name of the parasympathetic activity score.
pub const PSNS_SCORE: &str = "psns_score";

// ---------------------------------------------------------------------------
// Normalization curves
// ---------------------------------------------------------------------------

fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

/// Sympathovagal ratio onto the stress scale.
pub fn normalize_lf_hf(x: f64) -> f64 {
    if x <= 0.5 {
        10.0
    } else if x <= 1.0 {
        lerp(x, 0.5, 1.0, 20.0, 30.0)
    } else if x <= 2.0 {
        lerp(x, 1.0, 2.0, 30.0, 50.0)
    } else if x <= 3.0 {
        lerp(x, 2.0, 3.0, 50.0, 70.0)
    } else {
        (70.0 + (x - 3.0) * 20.0).min(100.0)
    }
}

/// SDNN (ms) onto the stress scale. Good variability means low stress.
pub fn normalize_sdnn(x: f64) -> f64 {
    if x <= 20.0 {
        100.0
    } else if x <= 50.0 {
        lerp(x, 20.0, 50.0, 80.0, 40.0)
    } else if x <= 100.0 {
        lerp(x, 50.0, 100.0, 40.0, 10.0)
    } else {
        0.0
    }
}

/// RMSSD (ms) onto the stress scale.
pub fn normalize_rmssd(x: f64) -> f64 {
    if x <= 10.0 {
        100.0
    } else if x <= 30.0 {
        lerp(x, 10.0, 30.0, 80.0, 40.0)
    } else if x <= 50.0 {
        lerp(x, 30.0, 50.0, 40.0, 15.0)
    } else {
        0.0
    }
}

/// Total spectral power (ms^2) onto the stress scale.
pub fn normalize_total_power(x: f64) -> f64 {
    if x <= 500.0 {
        90.0
    } else if x <= 1000.0 {
        lerp(x, 500.0, 1000.0, 70.0, 50.0)
    } else if x <= 2000.0 {
        lerp(x, 1000.0, 2000.0, 50.0, 30.0)
    } else {
        30.0 * (-(x - 2000.0) / 2000.0).exp()
    }
}

// ---------------------------------------------------------------------------
// Composite formulas
// ---------------------------------------------------------------------------

/// Per-beat HRV values feeding the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndexInputs {
    pub lf_hf: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub total_power_ms2: f64,
    /// Current fill of the R-R window; gates emission.
    pub window_len: usize,
}

/// One emission of the composite indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexReport {
    pub sns: f64,
    pub psns: f64,
    pub stress: f64,
    pub energy: f64,
    pub health: f64,
    pub vulnerability: VulnerabilityLabel,
    /// False while the window is too small and the report is held.
    pub fresh: bool,
}

impl Default for IndexReport {
    fn default() -> Self {
        Self {
            sns: 0.0,
            psns: 0.0,
            stress: 0.0,
            energy: 0.0,
            health: 0.0,
            vulnerability: VulnerabilityLabel::Severe,
            fresh: false,
        }
    }
}

fn clamp_index(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

/// Sympathetic activity score from the normalized inputs.
pub fn sns_score(n_lf_hf: f64, n_sdnn: f64, n_rmssd: f64) -> f64 {
    clamp_index(0.5 * n_lf_hf + 0.25 * n_sdnn + 0.25 * n_rmssd)
}

/// Parasympathetic activity score from the normalized inputs.
pub fn psns_score(n_lf_hf: f64, n_sdnn: f64, n_rmssd: f64, n_tp: f64) -> f64 {
    clamp_index(
        0.4 * (100.0 - n_lf_hf)
            + 0.2 * (100.0 - n_sdnn)
            + 0.2 * (100.0 - n_rmssd)
            + 0.2 * (100.0 - n_tp),
    )
}

/// Raw stress index from the autonomic scores.
pub fn stress_index(sns: f64, psns: f64) -> f64 {
    let imbalance = (sns - psns).abs() / 25.0 * 10.0;
    clamp_index(0.7 * sns + 0.2 * (100.0 - psns) + 0.1 * imbalance)
}

/// Raw energy index.
pub fn energy_index(psns: f64, n_sdnn: f64, n_rmssd: f64, n_tp: f64) -> f64 {
    clamp_index(
        0.5 * psns
            + 0.2 * (100.0 - n_sdnn)
            + 0.2 * (100.0 - n_rmssd)
            + 0.1 * (100.0 - n_tp),
    )
}

/// Raw health index with its sub-scores.
///
/// Immunity and recovery lean on long- and short-term variability
/// respectively, reinforced by the energy level; balance rewards a small
/// gap between the autonomic branches.
pub fn health_index(n_sdnn: f64, n_rmssd: f64, sns: f64, psns: f64, stress: f64, energy: f64) -> f64 {
    let immunity = 0.6 * (100.0 - n_sdnn) + 0.4 * energy;
    let recovery = 0.6 * (100.0 - n_rmssd) + 0.4 * energy;
    let balance = 100.0 - (sns - psns).abs().min(100.0);
    clamp_index(
        0.3 * immunity + 0.3 * recovery + 0.2 * balance + 0.1 * (100.0 - stress) + 0.1 * energy,
    )
}

// ---------------------------------------------------------------------------
// Adaptive smoothing
// ---------------------------------------------------------------------------

/// Exponential smoother whose blend weight adapts to the jump size.
///
/// `alpha = clamp(0.5 + |raw - prev| / 200, 0.5, 0.8)`; the output is the
/// convex combination `alpha * raw + (1 - alpha) * prev`, so it always lies
/// between the previous emission and the new raw value. The first emission
/// passes through unsmoothed.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveSmoother {
    history: VecDeque<f64>,
    last: Option<f64>,
}

impl AdaptiveSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blend `raw` against the previous emission and record it.
    pub fn update(&mut self, raw: f64) -> f64 {
        let smoothed = match self.last {
            None => raw,
            Some(prev) => {
                let alpha = (0.5 + (raw - prev).abs() / 200.0).clamp(0.5, 0.8);
                alpha * raw + (1.0 - alpha) * prev
            }
        };
        self.last = Some(smoothed);
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(smoothed);
        smoothed
    }

    /// Previous emission, if any.
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Recent emissions, oldest first, bounded to 20.
    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last = None;
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Stateful aggregator producing smoothed composite indices per beat.
#[derive(Debug, Clone, Default)]
pub struct IndexAggregator {
    stress: AdaptiveSmoother,
    energy: AdaptiveSmoother,
    health: AdaptiveSmoother,
    last_report: IndexReport,
}

impl IndexAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one beat's HRV values into the indices.
    ///
    /// With fewer than [`MIN_WINDOW_LEN`] intervals in the window the last
    /// report is returned unchanged (all zeros on cold start) and marked not
    /// fresh.
    pub fn update(&mut self, inputs: IndexInputs) -> IndexReport {
        if inputs.window_len < MIN_WINDOW_LEN {
            let mut held = self.last_report;
            held.fresh = false;
            return held;
        }

        let n_lf_hf = normalize_lf_hf(inputs.lf_hf);
        let n_sdnn = normalize_sdnn(inputs.sdnn_ms);
        let n_rmssd = normalize_rmssd(inputs.rmssd_ms);
        let n_tp = normalize_total_power(inputs.total_power_ms2);

        let sns = sns_score(n_lf_hf, n_sdnn, n_rmssd);
        let psns = psns_score(n_lf_hf, n_sdnn, n_rmssd, n_tp);

        let stress = self.stress.update(stress_index(sns, psns));
        let energy = self
            .energy
            .update(energy_index(psns, n_sdnn, n_rmssd, n_tp));
        let health = self
            .health
            .update(health_index(n_sdnn, n_rmssd, sns, psns, stress, energy));

        let report = IndexReport {
            sns,
            psns,
            stress: clamp_index(stress),
            energy: clamp_index(energy),
            health: clamp_index(health),
            vulnerability: VulnerabilityLabel::from_health_index(health),
            fresh: true,
        };
        self.last_report = report;
        report
    }

    /// Most recent report (held values before any fresh emission).
    pub fn last_report(&self) -> IndexReport {
        self.last_report
    }

    /// Recent stress emissions, oldest first.
    pub fn stress_history(&self) -> Vec<f64> {
        self.stress.history().collect()
    }

    /// Drop all smoothing state.
    pub fn reset(&mut self) {
        self.stress.reset();
        self.energy.reset();
        self.health.reset();
        self.last_report = IndexReport::default();
    }
}
