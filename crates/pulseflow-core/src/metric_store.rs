//! Central metric store.
//!
//! A single name-to-value mapping shared by every downstream consumer, so
//! derived values are computed once and read many times. Replacement is
//! atomic per key; there is no multi-key transaction. The pipeline is the
//! only writer, which on the single cooperative timeline makes every write
//! trivially serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit attached to a published metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Milliseconds,
    MillisecondsSquared,
    Percent,
    BeatsPerMinute,
    /// Composite index on the 0..=100 scale.
    Score,
    /// Dimensionless ratio.
    Ratio,
}

/// One published scalar with its unit and display precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub unit: Unit,
    /// Decimal places a consumer should display.
    pub precision: u8,
}

impl MetricValue {
    pub fn new(value: f64, unit: Unit, precision: u8) -> Self {
        Self {
            value,
            unit,
            precision,
        }
    }

    /// The value rounded to the declared precision.
    pub fn rounded(&self) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (self.value * scale).round() / scale
    }
}

/// Name-keyed store of the latest value of every published metric.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    values: BTreeMap<String, MetricValue>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value under `name`. Returns the previous value, if any.
    pub fn publish(&mut self, name: &str, value: MetricValue) -> Option<MetricValue> {
        self.values.insert(name.to_string(), value)
    }

    /// Latest value under `name`.
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.values.get(name).copied()
    }

    /// Latest raw scalar under `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| v.value)
    }

    /// Number of published metrics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the whole mapping, deterministically ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.values.clone()
    }

    /// Drop every published value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
