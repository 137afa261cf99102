//! Multi-run benchmark suite.
//!
//! Each run opens the device, performs one `read(n)` or `write(n)`, and closes
//! it again, so no run inherits another's cache or position state. Open and
//! close failures abort the whole suite; a failed transfer only loses its run.

use directblk_io::{DeviceHandle, IoError, RawDevice};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;

use crate::harness::{BenchError, BlockBench, Operation, RunReport};

/// What to measure.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchPlan {
    pub operations: Vec<Operation>,
    /// One measurement per entry, each transferring that many blocks.
    pub block_counts: Vec<u32>,
    pub runs: u32,
    /// Addresses are drawn from `[0, block_span)`.
    pub block_span: u64,
    /// Copy read data back into the block buffer.
    pub copy_out: bool,
    pub seed: Option<u64>,
}

impl Default for BenchPlan {
    fn default() -> Self {
        Self {
            operations: vec![Operation::Read, Operation::Write],
            block_counts: (1..=10).map(|i| i * 100).collect(),
            runs: 10,
            block_span: 1024,
            copy_out: true,
            seed: None,
        }
    }
}

impl BenchPlan {
    pub fn validate(&self) -> Result<(), BenchError> {
        let invalid = |msg: &str| Err(BenchError::InvalidPlan(msg.to_string()));
        if self.operations.is_empty() {
            return invalid("no operations selected");
        }
        if self.block_counts.is_empty() || self.block_counts.contains(&0) {
            return invalid("block counts must be a non-empty list of positive values");
        }
        if self.runs == 0 {
            return invalid("runs must be at least 1");
        }
        if self.block_span == 0 {
            return invalid("block span must be at least 1");
        }
        Ok(())
    }
}

/// A run that ended in a transfer failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub run: u32,
    pub error: String,
}

/// All runs of one operation at one block count.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub operation: Operation,
    pub blocks: u32,
    pub runs: Vec<RunReport>,
    pub failures: Vec<RunFailure>,
}

impl Measurement {
    /// Mean wall time of the successful runs, in nanoseconds.
    pub fn mean_elapsed_ns(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(|r| r.elapsed_ns as f64).sum::<f64>() / self.runs.len() as f64
    }

    /// Mean throughput of the successful runs, in MiB/s.
    pub fn mean_throughput_mib_s(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        self.runs.iter().map(RunReport::throughput_mib_s).sum::<f64>() / self.runs.len() as f64
    }

    pub fn short_transfers(&self) -> u32 {
        self.runs.iter().map(|r| r.short_transfers).sum()
    }
}

/// Everything a suite measured.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub measurements: Vec<Measurement>,
}

impl SuiteReport {
    pub fn failed_runs(&self) -> usize {
        self.measurements.iter().map(|m| m.failures.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs a [`BenchPlan`] against devices produced by an opener.
#[derive(Debug, Clone)]
pub struct BenchSuite {
    plan: BenchPlan,
}

impl BenchSuite {
    pub fn new(plan: BenchPlan) -> Result<Self, BenchError> {
        plan.validate()?;
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &BenchPlan {
        &self.plan
    }

    /// Executes every operation × block count × run.
    ///
    /// `open` is called once per run and must return a fresh open handle.
    pub fn run<D, F>(&self, mut open: F) -> Result<SuiteReport, BenchError>
    where
        D: RawDevice,
        F: FnMut() -> Result<DeviceHandle<D>, IoError>,
    {
        let mut seeds = match self.plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut report = SuiteReport::default();

        for &operation in &self.plan.operations {
            for &blocks in &self.plan.block_counts {
                let mut measurement = Measurement {
                    operation,
                    blocks,
                    runs: Vec::with_capacity(self.plan.runs as usize),
                    failures: Vec::new(),
                };

                for run in 0..self.plan.runs {
                    let handle = open().map_err(BenchError::Open)?;
                    let rng = StdRng::seed_from_u64(seeds.next_u64());
                    let mut bench =
                        BlockBench::new(handle, self.plan.block_span, self.plan.copy_out, rng);

                    let outcome = bench.run(operation, blocks);
                    bench.into_handle().close().map_err(BenchError::Close)?;

                    match outcome {
                        Ok(run_report) => measurement.runs.push(run_report),
                        Err(e) => {
                            tracing::warn!(%operation, blocks, run, error = %e, "run failed");
                            measurement.failures.push(RunFailure {
                                run,
                                error: e.to_string(),
                            });
                        }
                    }
                }

                tracing::info!(
                    %operation,
                    blocks,
                    runs = measurement.runs.len(),
                    failures = measurement.failures.len(),
                    mib_s = measurement.mean_throughput_mib_s(),
                    "measurement complete"
                );
                report.measurements.push(measurement);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directblk_io::{BlockGeometry, MemDevice, OpenMode};

    const BLOCK: usize = 4096;

    fn geometry() -> BlockGeometry {
        BlockGeometry::new(BLOCK, 512).unwrap()
    }

    fn plan() -> BenchPlan {
        BenchPlan {
            operations: vec![Operation::Write, Operation::Read],
            block_counts: vec![5, 10],
            runs: 3,
            block_span: 8,
            copy_out: true,
            seed: Some(1),
        }
    }

    #[test]
    fn suite_covers_every_measurement() {
        let suite = BenchSuite::new(plan()).unwrap();
        let mut opens = 0;
        let report = suite
            .run(|| {
                opens += 1;
                Ok(DeviceHandle::from_device(
                    MemDevice::new(8 * BLOCK),
                    OpenMode::Direct,
                    geometry(),
                ))
            })
            .unwrap();

        assert_eq!(opens, 2 * 2 * 3);
        assert_eq!(report.measurements.len(), 4);
        assert_eq!(report.failed_runs(), 0);

        let first = &report.measurements[0];
        assert_eq!(first.operation, Operation::Write);
        assert_eq!(first.blocks, 5);
        assert_eq!(first.runs.len(), 3);
        assert!(first.runs.iter().all(|r| r.bytes == 5 * BLOCK as u64));
    }

    #[test]
    fn failed_runs_are_recorded_and_suite_continues() {
        let suite = BenchSuite::new(BenchPlan {
            operations: vec![Operation::Read],
            ..plan()
        })
        .unwrap();

        let report = suite
            .run(|| {
                Ok(DeviceHandle::from_device(
                    MemDevice::new(8 * BLOCK).failing_reads(),
                    OpenMode::Direct,
                    geometry(),
                ))
            })
            .unwrap();

        assert_eq!(report.measurements.len(), 2);
        assert_eq!(report.failed_runs(), 6);
        assert!(report.measurements.iter().all(|m| m.runs.is_empty()));
        assert_eq!(report.measurements[0].mean_throughput_mib_s(), 0.0);
    }

    #[test]
    fn open_failure_aborts_suite() {
        let suite = BenchSuite::new(plan()).unwrap();
        let result = suite.run(|| -> Result<DeviceHandle<MemDevice>, IoError> {
            Err(IoError::NotOpen)
        });
        assert!(matches!(result, Err(BenchError::Open(_))));
    }

    #[test]
    fn close_failure_aborts_suite() {
        let suite = BenchSuite::new(plan()).unwrap();
        let result = suite.run(|| {
            Ok(DeviceHandle::from_device(
                MemDevice::new(8 * BLOCK).failing_close(),
                OpenMode::Direct,
                geometry(),
            ))
        });
        assert!(matches!(result, Err(BenchError::Close(_))));
    }

    #[test]
    fn invalid_plans_are_rejected() {
        for bad in [
            BenchPlan {
                operations: vec![],
                ..plan()
            },
            BenchPlan {
                block_counts: vec![],
                ..plan()
            },
            BenchPlan {
                block_counts: vec![10, 0],
                ..plan()
            },
            BenchPlan { runs: 0, ..plan() },
            BenchPlan {
                block_span: 0,
                ..plan()
            },
        ] {
            assert!(matches!(
                BenchSuite::new(bad),
                Err(BenchError::InvalidPlan(_))
            ));
        }
    }

    #[test]
    fn report_serializes_to_json() {
        let suite = BenchSuite::new(BenchPlan {
            operations: vec![Operation::Write],
            block_counts: vec![2],
            runs: 1,
            ..plan()
        })
        .unwrap();
        let report = suite
            .run(|| {
                Ok(DeviceHandle::from_device(
                    MemDevice::new(8 * BLOCK),
                    OpenMode::Direct,
                    geometry(),
                ))
            })
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["measurements"][0]["operation"], "write");
        assert_eq!(json["measurements"][0]["blocks"], 2);
        assert_eq!(json["measurements"][0]["runs"][0]["bytes"], 2 * BLOCK as u64);
    }
}
