//! Q, T-peak, and T-end localization around a detected R apex.
//!
//! All searches run on the smoothed, baseline-corrected window, so "zero"
//! means the iso-electric line. The search spans scale with the heart-rate
//! estimate (mean R-R over the peaks in the window):
//!
//! - **Q onset**: look back up to min(120 ms, 12% of R-R). Prefer the
//!   steepest negative slope (below -0.5 per sample), refined to the minimum
//!   in the following 10 ms; fall back to the second-derivative inflection
//!   (negative to positive), then to the plain argmin of the 40 ms window
//!   before R.
//! - **T peak**: among the local maxima between R + 100 ms and the next R,
//!   take the two tallest and keep the earlier one. With no local maxima,
//!   fall back to a proximity-weighted argmax around the expected T location
//!   (300 ms after R).
//! - **T end** (trapezium's-area method): anchor at the steepest descent
//!   `xm` within 200 ms after the T peak and at the quietest point `xr` of
//!   the iso-electric region 200..400 ms after it, then pick the `xi`
//!   maximizing the triangle area `0.5 * (s[xm] - s[xi]) * (xr - xi)`.
//!   Fallback: the first return to within 15% of the T amplitude.
//!
//! A QT measurement is kept only when the fiducials are ordered
//! `q < t_peak < t_end` and the interval lies in 230..=660 ms.

use crate::config::QtcFormula;

/// Lower bound of an acceptable QT interval, milliseconds.
pub const QT_MIN_MS: f64 = 230.0;
/// Upper bound of an acceptable QT interval, milliseconds.
pub const QT_MAX_MS: f64 = 660.0;

/// Slope magnitude (per sample) below which a descent does not count as the
/// Q downstroke.
const Q_SLOPE_MIN: f64 = 0.5;

/// Locate the Q onset before the R apex at `r`.
///
/// `rr_samples` is the heart-rate estimate in samples per beat.
pub fn find_q(s: &[f64], fs: f64, r: usize, rr_samples: f64) -> Option<usize> {
    if r == 0 || r >= s.len() {
        return None;
    }
    let back = ((0.120 * fs).min(0.12 * rr_samples).round() as usize).max(2);
    let start = r.saturating_sub(back);
    if start + 1 >= r {
        return None;
    }

    // Steepest descent in the lookback span.
    let mut steepest: Option<(usize, f64)> = None;
    for i in start + 1..r {
        let slope = s[i] - s[i - 1];
        if slope < 0.0 && slope.abs() > Q_SLOPE_MIN {
            let better = match steepest {
                None => true,
                Some((_, best)) => slope < best,
            };
            if better {
                steepest = Some((i, slope));
            }
        }
    }
    if let Some((m, _)) = steepest {
        // The onset bottoms out shortly after the steepest descent.
        let refine_end = (m + ((0.010 * fs).round() as usize).max(1)).min(r - 1);
        let mut q = m;
        for i in m..=refine_end {
            if s[i] < s[q] {
                q = i;
            }
        }
        return Some(q);
    }

    // Inflection of the second derivative, latest transition wins.
    let mut inflection = None;
    for i in (start + 1..r.saturating_sub(1)).rev() {
        let d2_prev = second_diff(s, i - 1);
        let d2_here = second_diff(s, i);
        if let (Some(prev), Some(here)) = (d2_prev, d2_here) {
            if prev < 0.0 && here >= 0.0 {
                inflection = Some(i);
                break;
            }
        }
    }
    if inflection.is_some() {
        return inflection;
    }

    // Plain argmin over at least the 40 ms before R.
    let width = back.max(((0.040 * fs).round() as usize).max(1));
    let lo = r.saturating_sub(width);
    let mut q = lo;
    for i in lo..r {
        if s[i] < s[q] {
            q = i;
        }
    }
    Some(q)
}

fn second_diff(s: &[f64], i: usize) -> Option<f64> {
    if i == 0 || i + 1 >= s.len() {
        return None;
    }
    Some(s[i + 1] - 2.0 * s[i] + s[i - 1])
}

/// Locate the T apex in the interval following the R at `r`.
///
/// `region_end` is the exclusive end of the search region, normally the next
/// R apex or the window end.
pub fn find_t_peak(s: &[f64], fs: f64, r: usize, region_end: usize) -> Option<usize> {
    let start = r + ((0.100 * fs).round() as usize).max(1);
    let end = region_end.min(s.len());
    if start + 2 >= end {
        return None;
    }

    // Local maxima in (start, end). Ripples far below the tallest maximum
    // are baseline residue, not wave candidates.
    let mut maxima: Vec<usize> = Vec::new();
    for i in start + 1..end - 1 {
        if s[i] >= s[i - 1] && s[i] >= s[i + 1] && (s[i] > s[i - 1] || s[i] > s[i + 1]) {
            maxima.push(i);
        }
    }
    let tallest = maxima
        .iter()
        .map(|&i| s[i])
        .fold(f64::NEG_INFINITY, f64::max);
    if tallest > 0.0 {
        maxima.retain(|&i| s[i] >= 0.25 * tallest);
    }

    if !maxima.is_empty() {
        maxima.sort_by(|&a, &b| {
            s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal)
        });
        let top = &maxima[..maxima.len().min(2)];
        return top.iter().min().copied();
    }

    // No local maxima (monotone or saturated segment): proximity-weighted
    // argmax around the expected T location.
    let expected = r + ((0.300 * fs).round() as usize).max(1);
    let floor = s[start..end]
        .iter()
        .fold(f64::INFINITY, |acc, &v| acc.min(v));
    let scale = (0.150 * fs).max(1.0);
    let mut best = start;
    let mut best_score = f64::NEG_INFINITY;
    for i in start..end {
        let w = 1.0 / (1.0 + (i as f64 - expected as f64).abs() / scale);
        let score = (s[i] - floor) * w;
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    Some(best)
}

/// Locate the T offset after the T apex using the trapezium's-area method.
pub fn find_t_end(s: &[f64], fs: f64, t_peak: usize) -> Option<usize> {
    let n = s.len();
    if t_peak + 2 >= n {
        return None;
    }
    let w02 = ((0.2 * fs).round() as usize).max(2);
    let w04 = ((0.4 * fs).round() as usize).max(4);

    // Steepest point of the T downstroke.
    let descent_end = (t_peak + w02).min(n - 1);
    let mut xm = t_peak + 1;
    let mut xm_slope = 0.0;
    for i in t_peak + 1..=descent_end {
        let slope = (s[i] - s[i - 1]).abs();
        if slope > xm_slope {
            xm_slope = slope;
            xm = i;
        }
    }

    // Quiescent point of the iso-electric region after the wave.
    let quiet_start = (t_peak + w02).min(n - 1);
    let quiet_end = (t_peak + w04).min(n - 1);
    if quiet_start >= quiet_end {
        return t_end_fallback(s, fs, t_peak);
    }
    let mut xr = quiet_start;
    let mut xr_slope = f64::INFINITY;
    for i in quiet_start..=quiet_end {
        if i == 0 {
            continue;
        }
        let slope = (s[i] - s[i - 1]).abs();
        if slope < xr_slope {
            xr_slope = slope;
            xr = i;
        }
    }
    if xr <= xm {
        return t_end_fallback(s, fs, t_peak);
    }

    // Triangle anchored at the steepest descent, swept toward the quiet
    // region; the area peaks where the waveform bends onto the baseline.
    let mut best = xm;
    let mut best_area = f64::NEG_INFINITY;
    for xi in xm..=xr {
        let area = 0.5 * (s[xm] - s[xi]) * (xr - xi) as f64;
        if area > best_area {
            best_area = area;
            best = xi;
        }
    }
    if best <= t_peak {
        return t_end_fallback(s, fs, t_peak);
    }
    Some(best)
}

/// Fallback T offset: first return to within 15% of the T amplitude.
fn t_end_fallback(s: &[f64], fs: f64, t_peak: usize) -> Option<usize> {
    let n = s.len();
    let limit = (t_peak + ((0.4 * fs).round() as usize).max(4)).min(n - 1);
    let amplitude = s[t_peak];
    if amplitude <= 0.0 {
        return None;
    }
    (t_peak + 1..=limit).find(|&i| s[i] <= 0.15 * amplitude)
}

/// QT interval in milliseconds between the Q onset and T offset indices.
pub fn qt_interval_ms(q: usize, t_end: usize, fs: f64) -> f64 {
    (t_end.saturating_sub(q)) as f64 / fs * 1000.0
}

/// Validate fiducial ordering and QT range; returns the QT in ms when valid.
pub fn validate_qt(q: usize, t_peak: usize, t_end: usize, fs: f64) -> Option<f64> {
    if !(q < t_peak && t_peak < t_end) {
        return None;
    }
    let qt = qt_interval_ms(q, t_end, fs);
    if (QT_MIN_MS..=QT_MAX_MS).contains(&qt) {
        Some(qt)
    } else {
        None
    }
}

/// Rate-corrected QT in milliseconds. `rr_s` is the beat period in seconds.
pub fn qtc_ms(qt_ms: f64, rr_s: f64, formula: QtcFormula) -> f64 {
    if rr_s <= 0.0 {
        return 0.0;
    }
    match formula {
        QtcFormula::Bazett => qt_ms / rr_s.sqrt(),
        QtcFormula::Fridericia => qt_ms / rr_s.cbrt(),
    }
}
