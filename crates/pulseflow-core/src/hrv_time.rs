//! Time-domain heart-rate-variability metrics.
//!
//! All metrics operate on a window of R-R intervals in milliseconds and
//! return 0 when the window is too small (fewer than 2 intervals, or fewer
//! than 5 for the distribution-shaped metrics AMo50 and CV). Returning 0 for
//! insufficient data is part of the contract: downstream consumers treat 0
//! as "not yet available", never as an error.
//!
//! - **SDNN**: population standard deviation (divisor N).
//! - **RMSSD**: root mean square of successive differences.
//! - **pNN50**: percentage of successive differences exceeding 50 ms.
//! - **MxDMn**: max minus min.
//! - **AMo50**: percentage of intervals within +/-50 ms of the mean (the
//!   mode-amplitude approximation over a 100 ms class width).
//! - **CV**: coefficient of variation, SDNN / mean * 100.

/// Minimum window length for the basic metrics.
pub const MIN_SAMPLES: usize = 2;
/// Minimum window length for the distribution-shaped metrics.
pub const MIN_SAMPLES_DISTRIBUTION: usize = 5;

/// Arithmetic mean, or 0 for an empty slice.
pub fn mean(rr: &[f64]) -> f64 {
    if rr.is_empty() {
        return 0.0;
    }
    rr.iter().sum::<f64>() / rr.len() as f64
}

/// Population standard deviation of the intervals (divisor N).
pub fn sdnn(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES {
        return 0.0;
    }
    let mu = mean(rr);
    let variance = rr.iter().map(|&x| (x - mu) * (x - mu)).sum::<f64>() / rr.len() as f64;
    variance.sqrt()
}

/// Root mean square of successive differences.
pub fn rmssd(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES {
        return 0.0;
    }
    let sum_sq: f64 = rr.windows(2).map(|w| (w[1] - w[0]) * (w[1] - w[0])).sum();
    (sum_sq / (rr.len() - 1) as f64).sqrt()
}

/// Percentage of successive differences whose magnitude exceeds 50 ms.
pub fn pnn50(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES {
        return 0.0;
    }
    let over = rr
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > 50.0)
        .count();
    over as f64 / (rr.len() - 1) as f64 * 100.0
}

/// Spread of the window: max minus min.
pub fn mxdmn(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES {
        return 0.0;
    }
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &x in rr {
        lo = lo.min(x);
        hi = hi.max(x);
    }
    hi - lo
}

/// Percentage of intervals within +/-50 ms of the mean.
pub fn amo50(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES_DISTRIBUTION {
        return 0.0;
    }
    let mu = mean(rr);
    let within = rr.iter().filter(|&&x| (x - mu).abs() <= 50.0).count();
    within as f64 / rr.len() as f64 * 100.0
}

/// Coefficient of variation in percent.
pub fn cv(rr: &[f64]) -> f64 {
    if rr.len() < MIN_SAMPLES_DISTRIBUTION {
        return 0.0;
    }
    let mu = mean(rr);
    if mu.abs() < f64::EPSILON {
        return 0.0;
    }
    sdnn(rr) / mu * 100.0
}

/// Heart rate in BPM from the mean interval, 0 when unavailable.
pub fn heart_rate_bpm(rr: &[f64]) -> f64 {
    let mu = mean(rr);
    if mu <= 0.0 {
        return 0.0;
    }
    60_000.0 / mu
}
