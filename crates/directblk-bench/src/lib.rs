//! # directblk-bench: Block-device throughput benchmarks
//!
//! This crate drives [`directblk_io::DeviceHandle`] the way a throughput
//! benchmark does: many single-block transfers at random addresses, timed one
//! by one.

// Benchmark code intentionally uses patterns that trigger some clippy lints
#![allow(clippy::cast_precision_loss)] // Latency stats use f64 for percentile calculations
#![allow(clippy::cast_sign_loss)] // Benchmark counts and sizes use unsigned arithmetic
#![allow(clippy::cast_possible_truncation)] // Benchmark conversions between numeric types
//!
//! ## Layout
//!
//! - [`BlockBench`]: one open handle, one block buffer, `read(n)` / `write(n)`
//! - [`BenchSuite`]: every operation × block count × run, reopening the
//!   device for each run
//! - [`LatencyTracker`]: per-transfer latency percentiles
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Criterion micro-benchmarks (temp file + simulated device)
//! cargo bench -p directblk-bench
//!
//! # Full suite against a real device
//! directblk bench --device /dev/raw1
//! ```

mod harness;
mod suite;

pub use harness::{BenchError, BlockBench, Operation, RunReport};
pub use suite::{BenchPlan, BenchSuite, Measurement, RunFailure, SuiteReport};

use std::io::Write;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Tracks latency percentiles for operations.
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    histogram: Histogram<u64>,
}

impl LatencyTracker {
    /// Creates a new latency tracker.
    ///
    /// Auto-resizing histogram with 3 significant digits.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("valid histogram config"),
        }
    }

    /// Records a latency measurement in nanoseconds.
    pub fn record(&mut self, latency_ns: u64) {
        self.histogram.record(latency_ns).ok();
    }

    /// Returns the total number of recorded samples.
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    /// Returns the p50 (median) latency in nanoseconds.
    pub fn p50(&self) -> u64 {
        self.histogram.value_at_quantile(0.50)
    }

    /// Returns the p95 latency in nanoseconds.
    pub fn p95(&self) -> u64 {
        self.histogram.value_at_quantile(0.95)
    }

    /// Returns the p99 latency in nanoseconds.
    pub fn p99(&self) -> u64 {
        self.histogram.value_at_quantile(0.99)
    }

    /// Returns the p99.9 latency in nanoseconds.
    pub fn p999(&self) -> u64 {
        self.histogram.value_at_quantile(0.999)
    }

    /// Returns the maximum latency in nanoseconds.
    pub fn max(&self) -> u64 {
        self.histogram.max()
    }

    /// Returns the mean latency in nanoseconds.
    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    /// Returns the minimum latency in nanoseconds.
    pub fn min(&self) -> u64 {
        self.histogram.min()
    }

    /// Snapshot of the distribution for reports.
    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.count(),
            min_ns: self.min(),
            p50_ns: self.p50(),
            p95_ns: self.p95(),
            p99_ns: self.p99(),
            p999_ns: self.p999(),
            max_ns: self.max(),
            mean_ns: self.mean(),
        }
    }

    /// Exports the latency distribution as eCDF CSV.
    ///
    /// Format: `latency_ns,percentile`
    pub fn export_ecdf_csv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "latency_ns,percentile")?;
        for v in self.histogram.iter_quantiles(1) {
            writeln!(
                writer,
                "{},{}",
                v.value_iterated_to(),
                v.percentile() / 100.0
            )?;
        }
        Ok(())
    }

    /// Exports latency statistics as JSON.
    pub fn to_json(&self, operation: &str) -> String {
        let mut value = serde_json::to_value(self.summary()).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("operation".to_string(), operation.into());
        }
        value.to_string()
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency percentiles of one run, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub p999_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
}
