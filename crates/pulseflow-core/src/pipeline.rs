//! Pipeline orchestration.
//!
//! Wires the five stages together on a single cooperative timeline:
//!
//! ```text
//! ECG batches  -> ingress -> motion canceller -> filtered ring
//! ACC frames   -> ingress -> motion reference ring
//! R-R events   -> ingress -> HRV engine -> index aggregator -> store
//! tick (50 ms) -> conditioner -> R-peak detector -> delineator
//!                 -> display frame, fiducial, QT, fallback R-R
//! ```
//!
//! Inbound handlers run to completion before the next event is accepted;
//! there are no suspension points and no locks. The metric store is the only
//! shared structure and has exactly one writer, this pipeline.
//!
//! Consumers subscribe with a callback and an explicit unsubscribe handle.
//! Computed values are published into the central [`MetricStore`], so a late
//! subscriber can read the current state without any recomputation.
//!
//! # Example
//!
//! ```rust
//! use pulseflow_core::config::PipelineConfig;
//! use pulseflow_core::pipeline::Pipeline;
//! use pulseflow_core::types::SamplingRates;
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! pipeline.attach(SamplingRates::default()).unwrap();
//!
//! for rr in [1000.0, 990.0, 1010.0, 1000.0, 995.0, 1005.0] {
//!     pipeline.accept_rr(rr);
//! }
//! let hr = pipeline.store().value("heart_rate").unwrap();
//! assert!((hr - 60.0).abs() < 2.0);
//! pipeline.detach();
//! ```

use crate::config::PipelineConfig;
use crate::ecg_conditioner::EcgConditioner;
use crate::hrv_engine::HrvEngine;
use crate::index_aggregator::{
    IndexAggregator, IndexInputs, ENERGY_INDEX, HEALTH_INDEX, PSNS_SCORE, SNS_SCORE, STRESS_INDEX,
};
use crate::ingress::{IngressAdapter, IngressStats, RR_MAX_MS, RR_MIN_MS};
use crate::metric_store::{MetricStore, MetricValue, Unit};
use crate::motion_canceller::{CancellerSettings, MotionCanceller};
use crate::r_peak_detector::RPeakDetector;
use crate::sample_ring::SampleRing;
use crate::types::{
    EcgSample, FiducialKind, FiducialPoint, PipelineResult, QtEvent, SamplingRates,
    VulnerabilityLabel,
};
use crate::wave_delineator;
use crate::hrv_engine::MetricKind;
use std::collections::BTreeSet;

/// Maximum ECG-to-reference time skew the canceller tolerates, seconds.
const ACC_ALIGN_TOLERANCE_S: f64 = 0.050;
/// Sensor R-R silence after which detector-derived intervals take over,
/// seconds.
const SENSOR_RR_SILENCE_S: f64 = 5.0;
/// Post-peak context required before a peak is delineated, seconds.
const DELINEATION_MARGIN_S: f64 = 0.75;

/// Handle returned by [`Pipeline::subscribe`].
pub type SubscriberId = u64;

/// One refresh of the chart-facing display series.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    /// Conditioned samples of the display window as (seconds, value).
    pub series: Vec<(f64, f64)>,
    /// R markers currently visible in the window.
    pub fiducials: Vec<FiducialPoint>,
}

/// Everything the pipeline can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A raw ECG batch was accepted, with assigned timestamps.
    EcgBatch(Vec<EcgSample>),
    /// The periodic display refresh.
    Display(DisplayFrame),
    /// A newly located fiducial point.
    Fiducial(FiducialPoint),
    /// A validated QT measurement.
    Qt(QtEvent),
    /// A metric was recomputed and published to the store.
    Metric {
        name: &'static str,
        value: MetricValue,
    },
    /// The vulnerability grade moved with a fresh health index.
    Vulnerability(VulnerabilityLabel),
    /// The session ended; all outbound streams are complete.
    SessionEnded,
}

/// State that lives exactly as long as one sensor session.
struct SessionState {
    rates: SamplingRates,
    ingress: IngressAdapter,
    /// Motion-cancelled ECG, index-aligned with the raw ring.
    filtered: SampleRing,
    canceller: MotionCanceller,
    conditioner: EcgConditioner,
    detector: RPeakDetector,
    hrv: HrvEngine,
    aggregator: IndexAggregator,
    /// Global indices of R peaks already delineated.
    processed_r: BTreeSet<u64>,
    /// Last delineated R (global index, time), for fallback R-R derivation.
    last_r: Option<(u64, f64)>,
    /// Session time of the last accepted sensor R-R.
    last_sensor_rr_at: Option<f64>,
}

impl SessionState {
    fn new(rates: SamplingRates, config: &PipelineConfig) -> Self {
        Self {
            rates,
            ingress: IngressAdapter::new(
                rates,
                config.acc_scale,
                config.ecg_buffer_len,
                config.acc_buffer_len,
            ),
            filtered: SampleRing::new(config.ecg_buffer_len),
            canceller: MotionCanceller::new(CancellerSettings::from(config)),
            conditioner: EcgConditioner::new(rates.fs_ecg),
            detector: RPeakDetector::new(rates.fs_ecg),
            hrv: HrvEngine::new(config.rr_window_count, config.band_normalization),
            aggregator: IndexAggregator::new(),
            processed_r: BTreeSet::new(),
            last_r: None,
            last_sensor_rr_at: None,
        }
    }

    /// True while the sensor's own R-R channel has gone quiet long enough
    /// for detector-derived intervals to take over.
    fn sensor_rr_silent(&self) -> bool {
        match self.last_sensor_rr_at {
            None => true,
            Some(t0) => self.ingress.session_time() - t0 > SENSOR_RR_SILENCE_S,
        }
    }

    /// Run the HRV and index stages for one accepted R-R interval.
    fn process_rr(
        &mut self,
        rr_ms: f64,
        store: &mut MetricStore,
        events: &mut Vec<PipelineEvent>,
    ) {
        let metrics = self.hrv.push_rr(rr_ms);
        for &(kind, value) in &metrics {
            let wrapped = HrvEngine::metric_value(kind, value);
            store.publish(kind.name(), wrapped);
            events.push(PipelineEvent::Metric {
                name: kind.name(),
                value: wrapped,
            });
        }

        let find = |kind: MetricKind| {
            metrics
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, v)| *v)
                .unwrap_or(0.0)
        };
        let report = self.aggregator.update(IndexInputs {
            lf_hf: find(MetricKind::LfHfRatio),
            sdnn_ms: find(MetricKind::Sdnn),
            rmssd_ms: find(MetricKind::Rmssd),
            total_power_ms2: find(MetricKind::TotalPower),
            window_len: self.hrv.window_len(),
        });

        for (name, value) in [
            (STRESS_INDEX, report.stress),
            (ENERGY_INDEX, report.energy),
            (HEALTH_INDEX, report.health),
            (SNS_SCORE, report.sns),
            (PSNS_SCORE, report.psns),
        ] {
            let wrapped = MetricValue::new(value, Unit::Score, 0);
            store.publish(name, wrapped);
            if report.fresh {
                events.push(PipelineEvent::Metric {
                    name,
                    value: wrapped,
                });
            }
        }
        if report.fresh {
            events.push(PipelineEvent::Vulnerability(report.vulnerability));
        }
    }
}

/// The embeddable streaming pipeline.
///
/// Single-threaded by construction: every method takes `&mut self` and runs
/// to completion. Hosts on parallel runtimes must funnel calls through one
/// owner (a channel task or an actor), which is exactly the discipline the
/// `&mut` receiver enforces at compile time.
pub struct Pipeline {
    config: PipelineConfig,
    session: Option<SessionState>,
    store: MetricStore,
    subscribers: Vec<(SubscriberId, Box<dyn FnMut(&PipelineEvent)>)>,
    next_subscriber: SubscriberId,
}

impl Pipeline {
    /// Create a pipeline; the configuration is sanitized on the way in.
    pub fn new(mut config: PipelineConfig) -> Self {
        config.sanitize();
        Self {
            config,
            session: None,
            store: MetricStore::new(),
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The central metric store.
    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// True while a session is attached.
    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Ingress drop/acceptance counters for the active session.
    pub fn ingress_stats(&self) -> Option<IngressStats> {
        self.session.as_ref().map(|s| s.ingress.stats())
    }

    /// Begin a session. An already-attached session is ended first.
    pub fn attach(&mut self, rates: SamplingRates) -> PipelineResult<()> {
        let rates = SamplingRates::new(rates.fs_ecg, rates.fs_acc)?;
        if self.session.is_some() {
            tracing::warn!("attach while attached, restarting session");
            self.detach();
        }
        tracing::info!(fs_ecg = rates.fs_ecg, fs_acc = rates.fs_acc, "session attached");
        self.session = Some(SessionState::new(rates, &self.config));
        Ok(())
    }

    /// End the session: complete all outbound streams, drop subscriptions,
    /// and discard every buffer, cache, and filter state. Idempotent.
    pub fn detach(&mut self) {
        if self.session.take().is_none() {
            return;
        }
        self.store.clear();
        tracing::info!("session detached");
        self.emit_all(vec![PipelineEvent::SessionEnded]);
        self.subscribers.clear();
    }

    /// Register an event callback. Returns the handle for unsubscribing.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&PipelineEvent) + 'static,
    {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns false for an unknown handle.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Enable or bypass the motion canceller at runtime.
    pub fn set_canceller_enabled(&mut self, enabled: bool) {
        if let Some(session) = self.session.as_mut() {
            session.canceller.set_enabled(enabled);
        }
    }

    /// Whether the canceller currently reports convergence.
    pub fn canceller_converged(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.canceller.is_converged())
            .unwrap_or(false)
    }

    /// Accept a batch of raw ECG counts.
    pub fn accept_ecg_batch(&mut self, counts: &[i32]) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("ecg batch before attach, ignoring");
            return;
        };
        let batch = session.ingress.accept_ecg_batch(counts);
        for sample in &batch {
            let reference = session.ingress.acc().nearest(sample.timestamp_s);
            let value = match reference {
                Some(r) if r.gap_s <= ACC_ALIGN_TOLERANCE_S => {
                    session.canceller.process(sample.value, r.magnitude, r.motion)
                }
                _ => session.canceller.passthrough(sample.value),
            };
            session.filtered.push(sample.timestamp_s, value);
        }
        if !batch.is_empty() {
            self.emit_all(vec![PipelineEvent::EcgBatch(batch)]);
        }
    }

    /// Accept an accelerometer frame as parallel device-unit axis arrays.
    pub fn accept_acc_frame(&mut self, x: &[i16], y: &[i16], z: &[i16]) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("acc frame before attach, ignoring");
            return;
        };
        session.ingress.accept_acc_frame(x, y, z);
    }

    /// Accept one sensor-reported R-R interval in milliseconds.
    pub fn accept_rr(&mut self, rr_ms: f64) {
        let mut events = Vec::new();
        {
            let Some(session) = self.session.as_mut() else {
                tracing::debug!("r-r before attach, ignoring");
                return;
            };
            let Some(rr) = session.ingress.accept_rr(rr_ms) else {
                return;
            };
            session.last_sensor_rr_at = Some(session.ingress.session_time());
            session.process_rr(rr, &mut self.store, &mut events);
        }
        self.emit_all(events);
    }

    /// The periodic slow path: recompute the display window and fiducial
    /// set on the current buffers. Hosts call this on the configured
    /// `display_tick_ms` cadence.
    pub fn tick(&mut self) {
        let mut events = Vec::new();
        {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            let fs = session.rates.fs_ecg;
            let window_len = (self.config.history_seconds * fs).round() as usize;
            let prefix_len = session.conditioner.smooth_len().saturating_sub(1);

            let (tail_start, times, values) = session.filtered.tail(window_len + prefix_len);
            if values.is_empty() {
                return;
            }
            let split = values.len().saturating_sub(window_len);
            let (prefix, window) = values.split_at(split);
            let window_times = &times[split..];
            let window_start_global = tail_start + split as u64;

            let conditioned = session.conditioner.condition(window, prefix);

            // The aligned unfiltered window for apex refinement.
            let (raw_start, _, raw_values) = session.ingress.ecg().tail(window_len + prefix_len);
            debug_assert_eq!(raw_start, tail_start);
            let raw_window = &raw_values[split..];

            let peaks = session.detector.detect(&conditioned, raw_window);
            let rr_est_samples = session.detector.mean_rr_samples(&peaks);
            let refractory = session.detector.refractory_samples() as u64;
            let margin = (DELINEATION_MARGIN_S * fs).round() as usize;
            let sensor_silent = session.sensor_rr_silent();

            let mut r_markers = Vec::with_capacity(peaks.len());
            for (pi, &p) in peaks.iter().enumerate() {
                let global = window_start_global + p as u64;
                let timestamp_s = window_times[p];
                r_markers.push(FiducialPoint {
                    kind: FiducialKind::R,
                    global_index: global,
                    timestamp_s,
                    value: conditioned[p],
                });

                // One delineation per physical peak: skip anything within a
                // refractory distance of an already-processed index.
                let lo = global.saturating_sub(refractory.saturating_sub(1));
                let hi = global + refractory - 1;
                if session.processed_r.range(lo..=hi).next().is_some() {
                    continue;
                }
                // Defer peaks whose T wave may not be buffered yet.
                if p + margin > conditioned.len() {
                    continue;
                }

                session.processed_r.insert(global);
                events.push(PipelineEvent::Fiducial(r_markers[r_markers.len() - 1]));

                // Fallback R-R from consecutive delineated peaks while the
                // sensor channel is quiet.
                if let Some((_, prev_time)) = session.last_r {
                    if sensor_silent {
                        let rr_ms = (timestamp_s - prev_time) * 1000.0;
                        if (RR_MIN_MS..=RR_MAX_MS).contains(&rr_ms) {
                            session.process_rr(rr_ms, &mut self.store, &mut events);
                        }
                    }
                }
                session.last_r = Some((global, timestamp_s));

                let next_r = peaks.get(pi + 1).copied().unwrap_or(conditioned.len());
                let q = wave_delineator::find_q(&conditioned, fs, p, rr_est_samples);
                let t_peak = wave_delineator::find_t_peak(&conditioned, fs, p, next_r);
                let t_end = match t_peak {
                    Some(tp) => wave_delineator::find_t_end(&conditioned, fs, tp),
                    None => None,
                };
                if let (Some(q), Some(tp), Some(te)) = (q, t_peak, t_end) {
                    if let Some(qt_ms) = wave_delineator::validate_qt(q, tp, te, fs) {
                        let rr_s = rr_est_samples / fs;
                        let qtc_ms =
                            wave_delineator::qtc_ms(qt_ms, rr_s, self.config.qtc_formula);
                        for (kind, idx) in [
                            (FiducialKind::Q, q),
                            (FiducialKind::TPeak, tp),
                            (FiducialKind::TEnd, te),
                        ] {
                            events.push(PipelineEvent::Fiducial(FiducialPoint {
                                kind,
                                global_index: window_start_global + idx as u64,
                                timestamp_s: window_times[idx],
                                value: conditioned[idx],
                            }));
                        }
                        events.push(PipelineEvent::Qt(QtEvent {
                            q_index: window_start_global + q as u64,
                            r_index: global,
                            tend_index: window_start_global + te as u64,
                            qt_ms,
                            qtc_ms,
                            q_time_s: window_times[q],
                            r_time_s: timestamp_s,
                            tend_time_s: window_times[te],
                        }));
                    }
                }
            }

            // Indices that fell off the ring are unreferenced: prune them.
            let ring_start = session.filtered.start_index();
            session.processed_r = session.processed_r.split_off(&ring_start);

            let series: Vec<(f64, f64)> = window_times
                .iter()
                .copied()
                .zip(conditioned.iter().copied())
                .collect();
            events.push(PipelineEvent::Display(DisplayFrame {
                series,
                fiducials: r_markers,
            }));
        }
        self.emit_all(events);
    }

    fn emit_all(&mut self, events: Vec<PipelineEvent>) {
        for event in &events {
            for (_, callback) in self.subscribers.iter_mut() {
                callback(event);
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("attached", &self.is_attached())
            .field("metrics", &self.store.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const FS_ECG: f64 = 130.0;

    fn pipeline() -> Pipeline {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.attach(SamplingRates::default()).unwrap();
        p
    }

    fn collect_events(p: &mut Pipeline) -> Rc<RefCell<Vec<PipelineEvent>>> {
        let sink: Rc<RefCell<Vec<PipelineEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let clone = sink.clone();
        p.subscribe(move |e| clone.borrow_mut().push(e.clone()));
        sink
    }

    /// Synthetic ECG stream: one beat per second with a Q dip, a tall R
    /// spike, and a modest T hump, all in raw counts.
    fn beat_train(seconds: usize) -> Vec<i32> {
        let n = seconds * FS_ECG as usize;
        let mut signal = vec![0.0_f64; n];
        let beat = FS_ECG as usize;
        let mut r = beat / 2;
        while r + 60 < n {
            signal[r - 6] += -10.0;
            signal[r - 5] += -45.0;
            signal[r - 4] += -80.0;
            signal[r - 3] += -30.0;
            signal[r - 2] += 150.0;
            signal[r - 1] += 600.0;
            signal[r] += 1000.0;
            signal[r + 1] += 500.0;
            signal[r + 2] += 100.0;
            let t_center = r + 39; // 300 ms after R
            for (i, slot) in signal.iter_mut().enumerate() {
                let d = i as f64 - t_center as f64;
                if d.abs() < 25.0 {
                    *slot += 60.0 * (-0.5 * (d / 6.0) * (d / 6.0)).exp();
                }
            }
            r += beat;
        }
        signal.iter().map(|&v| v as i32).collect()
    }

    /// Feed a count stream in one-second batches with a tick after each.
    fn stream_with_ticks(p: &mut Pipeline, counts: &[i32]) {
        for chunk in counts.chunks(FS_ECG as usize) {
            p.accept_ecg_batch(chunk);
            // Resting accelerometer, 200 Hz.
            let zeros = vec![0i16; 200];
            p.accept_acc_frame(&zeros, &zeros, &zeros);
            p.tick();
        }
    }

    #[test]
    fn test_attach_validates_rates() {
        let mut p = Pipeline::new(PipelineConfig::default());
        assert!(p
            .attach(SamplingRates {
                fs_ecg: 0.0,
                fs_acc: 200.0
            })
            .is_err());
        assert!(!p.is_attached());
        assert!(p.attach(SamplingRates::default()).is_ok());
        assert!(p.is_attached());
    }

    #[test]
    fn test_events_ignored_before_attach() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.accept_ecg_batch(&[1, 2, 3]);
        p.accept_rr(1000.0);
        p.tick();
        assert!(p.store().is_empty());
    }

    #[test]
    fn test_rr_flow_publishes_metrics() {
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        for rr in [1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 1000.0] {
            p.accept_rr(rr);
        }
        assert!((p.store().value("heart_rate").unwrap() - 60.0).abs() < 1e-9);
        assert_eq!(p.store().value("sdnn").unwrap(), 0.0);
        assert_eq!(p.store().value("lf_hf").unwrap(), 0.0);
        // Rigid rhythm: high stress, low energy.
        assert!(p.store().value(STRESS_INDEX).unwrap() > 50.0);
        assert!(p.store().value(ENERGY_INDEX).unwrap() < 30.0);

        let events = sink.borrow();
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Metric { name: "sdnn", .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Vulnerability(_))));
    }

    #[test]
    fn test_rr_boundaries_dropped() {
        let mut p = pipeline();
        p.accept_rr(299.0);
        p.accept_rr(2001.0);
        assert!(p.store().is_empty());
        let stats = p.ingress_stats().unwrap();
        assert_eq!(stats.rr_rejected, 2);
        p.accept_rr(300.0);
        assert_eq!(p.ingress_stats().unwrap().rr_accepted, 1);
        assert!((p.store().value("mean_rr").unwrap() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_metric_emission_order_time_before_frequency() {
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        p.accept_rr(1000.0);
        let events = sink.borrow();
        let sdnn_pos = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::Metric { name: "sdnn", .. }))
            .unwrap();
        let hf_pos = events
            .iter()
            .position(|e| matches!(e, PipelineEvent::Metric { name: "hf_power", .. }))
            .unwrap();
        assert!(sdnn_pos < hf_pos);
    }

    #[test]
    fn test_sine_ecg_r_per_second_with_resting_acc() {
        // A pure 1 Hz sine with a silent accelerometer: the canceller is an
        // identity and the detector finds one R per second.
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        let n = 10 * FS_ECG as usize;
        let counts: Vec<i32> = (0..n)
            .map(|i| {
                (1000.0 * (2.0 * std::f64::consts::PI * i as f64 / FS_ECG).sin()) as i32
            })
            .collect();
        stream_with_ticks(&mut p, &counts);

        let events = sink.borrow();
        let r_events: Vec<&FiducialPoint> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Fiducial(f) if f.kind == FiducialKind::R => Some(f),
                _ => None,
            })
            .collect();
        assert!(
            (7..=10).contains(&r_events.len()),
            "expected roughly one R per second, got {}",
            r_events.len()
        );
        // Refractory holds globally across ticks.
        for pair in r_events.windows(2) {
            assert!(
                pair[1].timestamp_s - pair[0].timestamp_s >= 0.4,
                "r peaks too close: {} then {}",
                pair[0].timestamp_s,
                pair[1].timestamp_s
            );
        }
    }

    #[test]
    fn test_qt_emitted_once_per_beat() {
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        stream_with_ticks(&mut p, &beat_train(10));

        let events = sink.borrow();
        let qt_events: Vec<&QtEvent> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Qt(q) => Some(q),
                _ => None,
            })
            .collect();
        assert!(
            qt_events.len() >= 5,
            "expected qt measurements, got {}",
            qt_events.len()
        );
        // Duplicate suppression: every QT belongs to a distinct R index.
        let mut r_indices: Vec<u64> = qt_events.iter().map(|q| q.r_index).collect();
        r_indices.sort_unstable();
        let unique = r_indices.len();
        r_indices.dedup();
        assert_eq!(unique, r_indices.len(), "an R produced two qt events");

        for q in &qt_events {
            assert!(q.q_index < q.tend_index);
            assert!((230.0..=660.0).contains(&q.qt_ms), "qt {}", q.qt_ms);
            assert!(q.qtc_ms > 0.0);
        }
    }

    #[test]
    fn test_detected_rr_fallback_feeds_hrv() {
        // No sensor R-R at all: the detector-derived intervals populate the
        // HRV engine instead.
        let mut p = pipeline();
        stream_with_ticks(&mut p, &beat_train(12));
        let mean_rr = p.store().value("mean_rr").expect("fallback r-r expected");
        assert!(
            (mean_rr - 1000.0).abs() < 30.0,
            "mean rr {mean_rr} should be near 1000 ms"
        );
    }

    #[test]
    fn test_sensor_rr_suppresses_fallback() {
        let mut p = pipeline();
        // A steady sensor R-R stream at 700 ms.
        for _ in 0..10 {
            p.accept_rr(700.0);
        }
        // Beats arrive at 1000 ms spacing, but the sensor channel is live,
        // so the fallback must not dilute the window.
        stream_with_ticks(&mut p, &beat_train(4));
        let mean_rr = p.store().value("mean_rr").unwrap();
        assert!(
            (mean_rr - 700.0).abs() < 1e-9,
            "sensor r-r should win, got {mean_rr}"
        );
    }

    #[test]
    fn test_correlated_motion_noise_cancelled() {
        // The whole ECG channel is a 1 Hz tone that also rides on the
        // accelerometer magnitude; after convergence the filtered ring
        // carries a small fraction of the input energy.
        let mut p = pipeline();
        let seconds = 15;
        let mut acc_index = 0u64;
        for second in 0..seconds {
            let counts: Vec<i32> = (0..130)
                .map(|i| {
                    let k = (second * 130 + i) as f64;
                    (800.0 * (2.0 * std::f64::consts::PI * k / FS_ECG).sin()) as i32
                })
                .collect();
            let z: Vec<i16> = (0..200)
                .map(|_| {
                    let t = acc_index as f64 / 200.0;
                    acc_index += 1;
                    (100.0 + 50.0 * (2.0 * std::f64::consts::PI * t).sin()) as i16
                })
                .collect();
            let rest = vec![0i16; 200];
            p.accept_acc_frame(&rest, &rest, &z);
            p.accept_ecg_batch(&counts);
        }

        let rms = |values: &[f64]| {
            (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
        };
        let session = p.session.as_ref().unwrap();
        let (_, _, filtered) = session.filtered.tail(260);
        let (_, _, raw) = session.ingress.ecg().tail(260);
        let residual = rms(&filtered);
        let input = rms(&raw);
        assert!(
            residual < 0.2 * input,
            "residual rms {residual} should be under 20% of input rms {input}"
        );
    }

    #[test]
    fn test_out_of_range_qt_suppressed() {
        // Beats whose T wave sits right behind the R: the delineated QT is
        // far below 230 ms, so R fiducials flow but no QT event does.
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        let n = 10 * FS_ECG as usize;
        let mut signal = vec![0.0_f64; n];
        let beat = FS_ECG as usize;
        let mut r = beat / 2;
        while r + 60 < n {
            signal[r - 6] += -10.0;
            signal[r - 5] += -45.0;
            signal[r - 4] += -80.0;
            signal[r - 3] += -30.0;
            signal[r - 2] += 150.0;
            signal[r - 1] += 600.0;
            signal[r] += 1000.0;
            signal[r + 1] += 500.0;
            signal[r + 2] += 100.0;
            // Narrow T hump only ~110 ms after R.
            let t_center = r + 14;
            for i in r + 5..r + 30 {
                let d = i as f64 - t_center as f64;
                signal[i] += 60.0 * (-0.5 * (d / 2.0) * (d / 2.0)).exp();
            }
            r += beat;
        }
        let counts: Vec<i32> = signal.iter().map(|&v| v as i32).collect();
        stream_with_ticks(&mut p, &counts);

        let events = sink.borrow();
        let r_count = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Fiducial(f) if f.kind == FiducialKind::R))
            .count();
        let qt_count = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Qt(_)))
            .count();
        assert!(r_count >= 5, "beats should still be detected, got {r_count}");
        assert_eq!(qt_count, 0, "sub-230 ms intervals must not emit qt events");
    }

    #[test]
    fn test_display_frame_emitted() {
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        stream_with_ticks(&mut p, &beat_train(6));
        let events = sink.borrow();
        let frame = events
            .iter()
            .rev()
            .find_map(|e| match e {
                PipelineEvent::Display(f) => Some(f),
                _ => None,
            })
            .expect("display frame expected");
        // Trimmed to the five-second history window.
        assert!(frame.series.len() <= (5.0 * FS_ECG) as usize + 1);
        assert!(!frame.fiducials.is_empty());
        // Timestamps ascend.
        for pair in frame.series.windows(2) {
            assert!(pair[1].0 > pair[0].0);
        }
    }

    #[test]
    fn test_detach_clears_and_completes() {
        let mut p = pipeline();
        let sink = collect_events(&mut p);
        p.accept_rr(800.0);
        assert!(!p.store().is_empty());
        p.detach();
        assert!(!p.is_attached());
        assert!(p.store().is_empty());
        assert!(matches!(
            sink.borrow().last(),
            Some(PipelineEvent::SessionEnded)
        ));
        // Idempotent: a second detach emits nothing further.
        let count = sink.borrow().len();
        p.detach();
        assert_eq!(sink.borrow().len(), count);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut p = pipeline();
        let sink: Rc<RefCell<Vec<PipelineEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let clone = sink.clone();
        let id = p.subscribe(move |e| clone.borrow_mut().push(e.clone()));
        p.accept_rr(1000.0);
        let delivered = sink.borrow().len();
        assert!(delivered > 0);
        assert!(p.unsubscribe(id));
        assert!(!p.unsubscribe(id), "second unsubscribe reports unknown id");
        p.accept_rr(1000.0);
        assert_eq!(sink.borrow().len(), delivered);
    }

    #[test]
    fn test_canceller_bypass_toggle() {
        let mut p = pipeline();
        p.set_canceller_enabled(false);
        p.accept_ecg_batch(&beat_train(2));
        p.set_canceller_enabled(true);
        assert!(!p.canceller_converged(), "fresh state after re-enable");
    }

    #[test]
    fn test_bounded_memory_over_long_session() {
        let mut p = pipeline();
        for _ in 0..30 {
            p.accept_ecg_batch(&beat_train(2));
            let zeros = vec![0i16; 400];
            p.accept_acc_frame(&zeros, &zeros, &zeros);
            p.tick();
        }
        let stats = p.ingress_stats().unwrap();
        assert!(stats.ecg_samples_accepted > 5000);
        // Rings stay at their caps regardless of input volume.
        let session = p.session.as_ref().unwrap();
        assert_eq!(session.ingress.ecg().len(), 5000);
        assert_eq!(session.filtered.len(), 5000);
        assert!(session.processed_r.len() < 64);
    }
}
