//! Bench command: run the read/write suite against one device.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directblk_bench::{BenchPlan, BenchSuite, Measurement, Operation, SuiteReport};
use directblk_config::{ConfigLoader, DirectblkConfig, Paths};
use directblk_io::{BlockGeometry, DeviceHandle, OpenMode};

use crate::style::{
    colors::SemanticStyle, print_header, print_labeled, print_results_table, print_spacer,
    print_success, print_warn,
};

pub struct BenchArgs {
    pub device: Option<PathBuf>,
    pub buffered: bool,
    pub runs: Option<u32>,
    pub blocks: Option<Vec<u32>>,
    pub span: Option<u64>,
    pub operations: Vec<Operation>,
    pub seed: Option<u64>,
    pub json: Option<PathBuf>,
    pub save: bool,
    pub project_dir: PathBuf,
}

impl BenchArgs {
    /// Command-line flags take precedence over every configuration source.
    fn apply(&self, config: &mut DirectblkConfig) {
        if let Some(device) = &self.device {
            config.device.path.clone_from(device);
        }
        if self.buffered {
            config.device.direct = false;
        }
        if let Some(runs) = self.runs {
            config.bench.runs = runs;
        }
        if let Some(blocks) = &self.blocks {
            config.bench.block_counts.clone_from(blocks);
        }
        if let Some(span) = self.span {
            config.bench.block_span = span;
        }
        if self.seed.is_some() {
            config.bench.seed = self.seed;
        }
    }

    fn report_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.json {
            return Ok(Some(path.clone()));
        }
        if !self.save {
            return Ok(None);
        }
        let dir = Paths::reports_dir(&self.project_dir);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(Some(dir.join(format!("bench-{stamp}.json"))))
    }
}

pub fn run(args: BenchArgs) -> Result<()> {
    let mut config = ConfigLoader::new()
        .with_project_dir(&args.project_dir)
        .load()
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate()?;

    let geometry = BlockGeometry::new(config.geometry.block_size, config.geometry.alignment)?;
    let mode = OpenMode::from_direct(config.device.direct);
    let plan = BenchPlan {
        operations: args.operations.clone(),
        block_counts: config.bench.block_counts.clone(),
        runs: config.bench.runs,
        block_span: config.bench.block_span,
        copy_out: config.bench.verify,
        seed: config.bench.seed,
    };
    let suite = BenchSuite::new(plan)?;

    print_header("Benchmark");
    print_labeled("Device", &config.device.path.display().path());
    print_labeled("Mode", &mode.to_string());
    print_labeled("Geometry", &geometry.to_string());
    print_labeled("Runs", &config.bench.runs.to_string());
    print_labeled("Block span", &config.bench.block_span.to_string());
    print_spacer();

    let path = config.device.path.clone();
    let report = suite.run(|| DeviceHandle::open(&path, mode, geometry))?;

    print_report(&report);

    if let Some(json_path) = args.report_path()? {
        fs::write(&json_path, report.to_json()?)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        print_success(&format!("Report written to {}", json_path.display().path()));
    }

    Ok(())
}

fn print_report(report: &SuiteReport) {
    let rows: Vec<Vec<String>> = report.measurements.iter().map(row).collect();
    print_results_table(
        &[
            "Operation", "Blocks", "Runs", "Failed", "Mean ms", "MiB/s", "p50 µs", "p99 µs",
            "Short",
        ],
        &rows,
    );

    let failed = report.failed_runs();
    if failed > 0 {
        print_warn(&format!("{failed} run(s) failed"));
        for measurement in &report.measurements {
            for failure in &measurement.failures {
                println!(
                    "  {} {} run {}: {}",
                    measurement.operation,
                    measurement.blocks,
                    failure.run,
                    failure.error.error()
                );
            }
        }
    }
}

fn row(m: &Measurement) -> Vec<String> {
    let (p50, p99) = mean_percentiles(m);
    vec![
        m.operation.to_string(),
        m.blocks.to_string(),
        m.runs.len().to_string(),
        m.failures.len().to_string(),
        format!("{:.2}", m.mean_elapsed_ns() / 1e6),
        format!("{:.1}", m.mean_throughput_mib_s()),
        format!("{p50:.1}"),
        format!("{p99:.1}"),
        m.short_transfers().to_string(),
    ]
}

/// Mean per-run p50 and p99 latency, in microseconds.
fn mean_percentiles(m: &Measurement) -> (f64, f64) {
    if m.runs.is_empty() {
        return (0.0, 0.0);
    }
    let n = m.runs.len() as f64;
    let p50 = m.runs.iter().map(|r| r.latency.p50_ns as f64).sum::<f64>() / n;
    let p99 = m.runs.iter().map(|r| r.latency.p99_ns as f64).sum::<f64>() / n;
    (p50 / 1000.0, p99 / 1000.0)
}
