//! Frequency-domain heart-rate-variability estimation.
//!
//! Band power is estimated directly from the R-R window with a lag-windowed
//! autocovariance method rather than an FFT: the windows are short (tens of
//! intervals) and irregularly sampled in time, so a coarse cosine-transform
//! evaluation of the smoothed autocovariance on the band's frequency grid is
//! both adequate and cheap.
//!
//! Procedure for a window `W` of R-R intervals in milliseconds:
//!
//! 1. Fewer than 5 intervals: return 0.
//! 2. Detrend and normalize: `y_i = (W_i - mu) / mu`.
//! 3. Biased autocovariance `r[k]` for lags up to `min(|W|-1, 20)`.
//! 4. Hamming lag window `r[k] *= 0.54 - 0.46 cos(2 pi k / K)`.
//! 5. Evaluate `S(f) = r[0] + 2 sum r[k] cos(2 pi f k mu / 1000)` on the
//!    grid from `f_lo` to `f_hi` at step `1 / (2 K)`, accumulating
//!    `max(0, S(f))`. The mean interval `mu/1000` converts lag counts into
//!    seconds.
//! 6. Scale by `mu^2` (back to ms^2) and divide by the band's normalization
//!    divisor.
//!
//! The headline total power is the sum of the three band powers. A
//! single-pass estimate over the whole analysis band, with its own divisor,
//! is published beside it (see [`direct_total_power`]) so a consumer can
//! cross-check the summed definition against the direct one.

use crate::config::BandNormalization;

/// Maximum autocovariance lag.
pub const MAX_LAG: usize = 20;
/// Minimum window length for any spectral estimate.
pub const MIN_SAMPLES: usize = 5;
/// Guard for ratio denominators.
pub const EPSILON: f64 = 1e-10;

/// A frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lo_hz: f64,
    pub hi_hz: f64,
}

/// Very low frequency band.
pub const VLF: Band = Band {
    lo_hz: 0.003,
    hi_hz: 0.04,
};
/// Low frequency band.
pub const LF: Band = Band {
    lo_hz: 0.04,
    hi_hz: 0.15,
};
/// High frequency band.
pub const HF: Band = Band {
    lo_hz: 0.15,
    hi_hz: 0.4,
};
/// Whole analysis band.
pub const TOTAL: Band = Band {
    lo_hz: 0.003,
    hi_hz: 0.4,
};

/// Power of one band in ms^2, already divided by `norm_divisor`.
pub fn band_power(rr: &[f64], band: Band, norm_divisor: f64) -> f64 {
    if rr.len() < MIN_SAMPLES {
        return 0.0;
    }
    let n = rr.len();
    let mu = rr.iter().sum::<f64>() / n as f64;
    if mu.abs() < EPSILON {
        return 0.0;
    }

    let y: Vec<f64> = rr.iter().map(|&x| (x - mu) / mu).collect();

    let max_lag = MAX_LAG.min(n - 1);
    let mut acov = vec![0.0; max_lag + 1];
    for (k, slot) in acov.iter_mut().enumerate() {
        let mut sum = 0.0;
        for i in 0..n - k {
            sum += y[i] * y[i + k];
        }
        *slot = sum / (n - k) as f64;
    }

    let k_max = max_lag as f64;
    for (k, slot) in acov.iter_mut().enumerate() {
        let w = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * k as f64 / k_max).cos();
        *slot *= w;
    }

    let step = 1.0 / (2.0 * k_max);
    let mut accumulated = 0.0;
    let mut f = band.lo_hz;
    while f <= band.hi_hz + 1e-12 {
        let mut s = acov[0];
        for (k, &r) in acov.iter().enumerate().skip(1) {
            s += 2.0 * r * (2.0 * std::f64::consts::PI * f * k as f64 * mu / 1000.0).cos();
        }
        accumulated += s.max(0.0);
        f += step;
    }

    accumulated * mu * mu / norm_divisor.max(EPSILON)
}

/// The three band powers plus their sum, computed in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandPowers {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    /// Sum of the three band powers.
    pub total: f64,
}

impl BandPowers {
    /// Evaluate every band on the window with the configured divisors.
    pub fn compute(rr: &[f64], norms: &BandNormalization) -> Self {
        let vlf = band_power(rr, VLF, norms.vlf);
        let lf = band_power(rr, LF, norms.lf);
        let hf = band_power(rr, HF, norms.hf);
        Self {
            vlf,
            lf,
            hf,
            total: vlf + lf + hf,
        }
    }

    /// LF/HF sympathovagal balance ratio, 0 when HF is negligible.
    pub fn lf_hf_ratio(&self) -> f64 {
        if self.hf <= EPSILON {
            return 0.0;
        }
        self.lf / self.hf
    }
}

/// Single-pass power estimate over the whole analysis band.
///
/// Uses the `total` divisor from the normalization table. The composite
/// indices consume the summed total from [`BandPowers`]; this estimate is
/// published beside it as a cross-check, since the two differ by the
/// band-edge handling of the frequency grid.
pub fn direct_total_power(rr: &[f64], norms: &BandNormalization) -> f64 {
    band_power(rr, TOTAL, norms.total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_norms() -> BandNormalization {
        BandNormalization::default()
    }

    #[test]
    fn test_insufficient_window_returns_zero() {
        let rr = [800.0, 820.0, 790.0, 810.0];
        assert_eq!(band_power(&rr, LF, 1.0), 0.0);
        let powers = BandPowers::compute(&rr, &default_norms());
        assert_eq!(powers.total, 0.0);
        assert_eq!(powers.lf_hf_ratio(), 0.0);
    }

    #[test]
    fn test_constant_series_zero_power() {
        let rr = [1000.0; 30];
        let powers = BandPowers::compute(&rr, &default_norms());
        assert_eq!(powers.vlf, 0.0);
        assert_eq!(powers.lf, 0.0);
        assert_eq!(powers.hf, 0.0);
        assert_eq!(powers.total, 0.0);
        assert_eq!(powers.lf_hf_ratio(), 0.0);
    }

    #[test]
    fn test_powers_non_negative() {
        let rr: Vec<f64> = (0..40)
            .map(|i| 900.0 + 80.0 * ((i as f64) * 1.3).sin() + 30.0 * ((i as f64) * 0.4).cos())
            .collect();
        let powers = BandPowers::compute(&rr, &default_norms());
        assert!(powers.vlf >= 0.0);
        assert!(powers.lf >= 0.0);
        assert!(powers.hf >= 0.0);
        assert!(powers.total >= 0.0);
    }

    #[test]
    fn test_total_is_sum_of_bands() {
        let rr: Vec<f64> = (0..60)
            .map(|i| 850.0 + 120.0 * ((i as f64) * 0.7).sin())
            .collect();
        let powers = BandPowers::compute(&rr, &default_norms());
        let sum = powers.vlf + powers.lf + powers.hf;
        assert!(
            (powers.total - sum).abs() < 1e-9,
            "total {} should equal band sum {}",
            powers.total,
            sum
        );
    }

    #[test]
    fn test_slow_oscillation_favors_low_band() {
        // A slow modulation of the beat period concentrates power below the
        // HF band. Period: 20 beats at ~1 s each is a 0.05 Hz oscillation.
        let rr: Vec<f64> = (0..60)
            .map(|i| 1000.0 + 100.0 * (2.0 * std::f64::consts::PI * i as f64 / 20.0).sin())
            .collect();
        // Equal divisors so the comparison is between raw band estimates.
        let lf = band_power(&rr, LF, 1.0);
        let hf = band_power(&rr, HF, 1.0);
        assert!(
            lf > hf,
            "slow modulation should put more power in LF ({lf}) than HF ({hf})"
        );
    }

    #[test]
    fn test_fast_alternation_favors_high_band() {
        // Alternating beat periods flip at the highest observable frequency,
        // 0.5 cycles per beat, roughly 0.5 Hz at 1000 ms beats. Aliased
        // energy lands in the upper part of the analysis range.
        let rr: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 900.0 } else { 1100.0 })
            .collect();
        let lf = band_power(&rr, LF, 1.0);
        let hf = band_power(&rr, HF, 1.0);
        assert!(
            hf > lf,
            "fast alternation should put more power in HF ({hf}) than LF ({lf})"
        );
    }

    #[test]
    fn test_normalization_divisor_scales_linearly() {
        let rr: Vec<f64> = (0..30)
            .map(|i| 950.0 + 60.0 * ((i as f64) * 0.9).sin())
            .collect();
        let base = band_power(&rr, HF, 1.0);
        let halved = band_power(&rr, HF, 2.0);
        assert!(base > 0.0);
        assert!((halved - base / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_direct_total_tracks_band_sum() {
        let rr: Vec<f64> = (0..50)
            .map(|i| 900.0 + 90.0 * ((i as f64) * 0.8).sin())
            .collect();
        let norms = default_norms();
        let summed = BandPowers::compute(&rr, &norms).total;
        let direct = direct_total_power(&rr, &norms);
        assert!(direct > 0.0);
        // Different divisors and grid edges, same order of magnitude.
        assert!(
            direct < 20.0 * summed && summed < 20.0 * direct,
            "direct {direct} and summed {summed} should be comparable"
        );
        // Both definitions agree that a constant series has no power.
        assert_eq!(direct_total_power(&[1000.0; 30], &norms), 0.0);
    }

    #[test]
    fn test_direct_total_uses_its_own_divisor() {
        let rr: Vec<f64> = (0..30)
            .map(|i| 950.0 + 70.0 * ((i as f64) * 1.1).sin())
            .collect();
        let base = direct_total_power(
            &rr,
            &BandNormalization {
                total: 1.0,
                ..default_norms()
            },
        );
        let halved = direct_total_power(
            &rr,
            &BandNormalization {
                total: 2.0,
                ..default_norms()
            },
        );
        assert!(base > 0.0);
        assert!((halved - base / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_guard() {
        let powers = BandPowers {
            vlf: 0.0,
            lf: 5.0,
            hf: 0.0,
            total: 5.0,
        };
        assert_eq!(powers.lf_hf_ratio(), 0.0);
        let powers = BandPowers {
            vlf: 0.0,
            lf: 6.0,
            hf: 3.0,
            total: 9.0,
        };
        assert!((powers.lf_hf_ratio() - 2.0).abs() < 1e-12);
    }
}
