//! Run a short synthetic sensor session through the pipeline.
//!
//! Run with: cargo run --example synthetic_session -p pulseflow-core

use pulseflow_core::observe::{init_logging, LogConfig};
use pulseflow_core::prelude::*;

fn main() {
    init_logging(&LogConfig::default());

    let mut pipeline = Pipeline::new(PipelineConfig::default());
    pipeline
        .attach(SamplingRates {
            fs_ecg: 130.0,
            fs_acc: 200.0,
        })
        .expect("valid rates");

    pipeline.subscribe(|event| match event {
        PipelineEvent::Qt(qt) => {
            println!("qt {:6.1} ms  qtc {:6.1} ms  at {:7.3} s", qt.qt_ms, qt.qtc_ms, qt.r_time_s)
        }
        PipelineEvent::Vulnerability(label) => println!("vulnerability: {label}"),
        _ => {}
    });

    // Twenty seconds of a 72 bpm synthetic ECG with a resting accelerometer.
    let fs = 130.0;
    let beat_samples = (fs * 60.0 / 72.0) as usize;
    let total = 20 * fs as usize;
    let mut signal = vec![0.0f64; total];
    let mut r = beat_samples / 2;
    while r + 60 < total {
        signal[r - 1] += 600.0;
        signal[r] += 1000.0;
        signal[r + 1] += 500.0;
        let t_center = r + 36;
        for i in r + 15..r + 60 {
            let d = i as f64 - t_center as f64;
            signal[i] += 60.0 * (-0.5 * (d / 6.0) * (d / 6.0)).exp();
        }
        r += beat_samples;
    }

    let counts: Vec<i32> = signal.iter().map(|&v| v as i32).collect();
    let acc_rest = vec![0i16; 200];
    for (second, chunk) in counts.chunks(fs as usize).enumerate() {
        pipeline.accept_ecg_batch(chunk);
        pipeline.accept_acc_frame(&acc_rest, &acc_rest, &acc_rest);
        // Sensor-reported beat periods with mild respiratory variation.
        let rr = 833.0 + 40.0 * (second as f64 * 0.9).sin();
        pipeline.accept_rr(rr);
        pipeline.tick();
    }

    println!("\nfinal metric snapshot:");
    for (name, value) in pipeline.store().snapshot() {
        println!("  {name:<14} {:10.2}", value.rounded());
    }

    pipeline.detach();
}
