//! # pulseflow-core
//!
//! Streaming signal-processing and metrics pipeline for chest-strap heart
//! sensors. The crate ingests three synchronized streams, an ECG at roughly
//! 130 Hz, a tri-axial accelerometer at roughly 200 Hz, and the sensor's own
//! R-R intervals, and produces in real time:
//!
//! - a clean ECG display signal with annotated fiducial points
//!   (Q, R, T-peak, T-end) and validated QT/QTc measurements
//! - a continuously updated panel of heart-rate-variability metrics in the
//!   time domain (SDNN, RMSSD, pNN50, MxDMn, AMo50, CV) and the frequency
//!   domain (VLF, LF, HF, total band power, LF/HF)
//! - composite stress, energy, and health indices with autonomic-balance
//!   scores and a vulnerability grade
//!
//! ## Signal Flow
//!
//! ```text
//! ECG batches ─> ingress ─> motion canceller ─> conditioner ─> fiducials ─┐
//! ACC frames  ─> ingress ─> motion reference ──────^                      │
//! R-R stream  ─> ingress ──────────────┬──────<─ fallback R-R ────────────┘
//!                                      v
//!                           HRV engine ─> index aggregator ─> metric store
//! ```
//!
//! Everything runs on one cooperative timeline: inbound events are handled
//! to completion, a periodic host-driven tick refreshes the display window,
//! and every buffer is bounded, so memory stays constant regardless of
//! session length. The crate is an embeddable pipeline; transport, pairing,
//! rendering, and UI live with the host.
//!
//! ## Example
//!
//! ```rust
//! use pulseflow_core::prelude::*;
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! pipeline.attach(SamplingRates { fs_ecg: 130.0, fs_acc: 200.0 }).unwrap();
//!
//! let id = pipeline.subscribe(|event| {
//!     if let PipelineEvent::Qt(qt) = event {
//!         println!("qt {:.0} ms (qtc {:.0})", qt.qt_ms, qt.qtc_ms);
//!     }
//! });
//!
//! // Feed sensor data as it arrives, tick on the display cadence.
//! pipeline.accept_rr(812.0);
//! pipeline.accept_ecg_batch(&[12, 48, 96, 40, -8]);
//! pipeline.tick();
//!
//! pipeline.unsubscribe(id);
//! pipeline.detach();
//! ```

pub mod config;
pub mod ecg_conditioner;
pub mod hrv_engine;
pub mod hrv_freq;
pub mod hrv_time;
pub mod index_aggregator;
pub mod ingress;
pub mod metric_store;
pub mod motion_canceller;
pub mod observe;
pub mod pipeline;
pub mod r_peak_detector;
pub mod rr_window;
pub mod sample_ring;
pub mod types;
pub mod wave_delineator;

// Re-export the main types.
pub use config::{BandNormalization, LmsConfig, PipelineConfig, QtcFormula};
pub use hrv_engine::{HrvEngine, MetricKind};
pub use index_aggregator::{IndexAggregator, IndexInputs, IndexReport};
pub use ingress::IngressStats;
pub use metric_store::{MetricStore, MetricValue, Unit};
pub use motion_canceller::{CancellerSettings, MotionCanceller};
pub use pipeline::{DisplayFrame, Pipeline, PipelineEvent, SubscriberId};
pub use types::{
    EcgSample, FiducialKind, FiducialPoint, PipelineError, PipelineResult, QtEvent, SamplingRates,
    VulnerabilityLabel,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{PipelineConfig, QtcFormula};
    pub use crate::metric_store::{MetricValue, Unit};
    pub use crate::pipeline::{DisplayFrame, Pipeline, PipelineEvent};
    pub use crate::types::{
        FiducialKind, FiducialPoint, QtEvent, SamplingRates, VulnerabilityLabel,
    };
}
