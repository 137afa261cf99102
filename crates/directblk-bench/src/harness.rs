//! Single-handle benchmark runner.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::{Duration, Instant};

use directblk_io::{BlockAddress, DeviceHandle, IoError, RawDevice};
use rand::rngs::StdRng;
use rand::{Rng, RngCore};
use serde::Serialize;

use crate::{LatencySummary, LatencyTracker};

/// Direction of a measured transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(format!("unknown operation '{other}' (expected read or write)")),
        }
    }
}

/// Errors that end a benchmark run or suite.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Opening the device failed; the suite cannot continue.
    #[error("failed to open device: {0}")]
    Open(#[source] IoError),

    /// Closing the device failed; the suite cannot continue.
    #[error("failed to close device: {0}")]
    Close(#[source] IoError),

    /// A transfer failed; only the current run is lost.
    #[error("{operation} #{index} at block {address} failed: {source}")]
    Transfer {
        operation: Operation,
        index: u32,
        address: u64,
        #[source]
        source: IoError,
    },

    #[error("invalid benchmark plan: {0}")]
    InvalidPlan(String),
}

/// Outcome of one `read(n)` or `write(n)` run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub operation: Operation,
    pub blocks: u32,
    /// Bytes the device actually moved.
    pub bytes: u64,
    pub short_transfers: u32,
    pub elapsed_ns: u64,
    pub latency: LatencySummary,
}

impl RunReport {
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns)
    }

    /// Throughput in MiB/s.
    pub fn throughput_mib_s(&self) -> f64 {
        if self.elapsed_ns == 0 {
            return 0.0;
        }
        let secs = self.elapsed_ns as f64 / 1e9;
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

/// Drives block transfers at random addresses through one open handle.
///
/// The block buffer is filled with random bytes up front and refreshed after
/// every write, so consecutive writes never carry identical payloads.
pub struct BlockBench<D: RawDevice> {
    handle: DeviceHandle<D>,
    buffer: Vec<u8>,
    rng: StdRng,
    block_span: u64,
    copy_out: bool,
}

impl<D: RawDevice> BlockBench<D> {
    /// Creates a runner addressing blocks in `[0, block_span)`.
    ///
    /// `copy_out` controls whether reads copy data back into the block buffer
    /// or only time the transfer.
    pub fn new(handle: DeviceHandle<D>, block_span: u64, copy_out: bool, mut rng: StdRng) -> Self {
        let mut buffer = vec![0u8; handle.geometry().block_size()];
        rng.fill_bytes(&mut buffer);
        Self {
            handle,
            buffer,
            rng,
            block_span: block_span.max(1),
            copy_out,
        }
    }

    pub fn handle(&self) -> &DeviceHandle<D> {
        &self.handle
    }

    /// The block buffer: the last payload written, or the last data read.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns the handle, still open.
    pub fn into_handle(self) -> DeviceHandle<D> {
        self.handle
    }

    pub fn run(&mut self, operation: Operation, blocks: u32) -> Result<RunReport, BenchError> {
        match operation {
            Operation::Read => self.read(blocks),
            Operation::Write => self.write(blocks),
        }
    }

    /// Reads `blocks` blocks, each at a fresh random address.
    pub fn read(&mut self, blocks: u32) -> Result<RunReport, BenchError> {
        self.measure(Operation::Read, blocks)
    }

    /// Writes `blocks` blocks, each at a fresh random address.
    pub fn write(&mut self, blocks: u32) -> Result<RunReport, BenchError> {
        self.measure(Operation::Write, blocks)
    }

    fn measure(&mut self, operation: Operation, blocks: u32) -> Result<RunReport, BenchError> {
        let mut latency = LatencyTracker::new();
        let mut bytes = 0u64;
        let mut short_transfers = 0u32;
        let len = self.buffer.len();

        let started = Instant::now();
        for index in 0..blocks {
            let address = self.next_address();

            let op_start = Instant::now();
            let moved = match operation {
                Operation::Read => {
                    self.handle
                        .read_block(address, &mut self.buffer, self.copy_out)
                }
                Operation::Write => self.handle.write_block(address, &self.buffer),
            }
            .map_err(|source| BenchError::Transfer {
                operation,
                index,
                address: address.as_u64(),
                source,
            })?;
            latency.record(op_start.elapsed().as_nanos() as u64);

            bytes += moved as u64;
            if moved < len {
                short_transfers += 1;
            }
            if operation == Operation::Write {
                self.rng.fill_bytes(&mut self.buffer);
            }
        }
        let elapsed_ns = started.elapsed().as_nanos() as u64;

        if short_transfers > 0 {
            tracing::warn!(%operation, blocks, short_transfers, "run had short transfers");
        }
        tracing::debug!(%operation, blocks, bytes, elapsed_ns, "run complete");

        Ok(RunReport {
            operation,
            blocks,
            bytes,
            short_transfers,
            elapsed_ns,
            latency: latency.summary(),
        })
    }

    fn next_address(&mut self) -> BlockAddress {
        BlockAddress::new(self.rng.gen_range(0..self.block_span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directblk_io::{BlockGeometry, MemDevice, OpenMode};
    use rand::SeedableRng;

    const BLOCK: usize = 4096;

    fn bench(device: MemDevice, span: u64) -> BlockBench<MemDevice> {
        let geometry = BlockGeometry::new(BLOCK, 512).unwrap();
        let handle = DeviceHandle::from_device(device, OpenMode::Direct, geometry);
        BlockBench::new(handle, span, true, StdRng::seed_from_u64(7))
    }

    #[test]
    fn write_run_moves_every_block() {
        let mut bench = bench(MemDevice::new(16 * BLOCK), 16);
        let report = bench.write(50).unwrap();

        assert_eq!(report.operation, Operation::Write);
        assert_eq!(report.blocks, 50);
        assert_eq!(report.bytes, 50 * BLOCK as u64);
        assert_eq!(report.short_transfers, 0);
        assert_eq!(report.latency.count, 50);
        assert_eq!(bench.handle().device().unwrap().stats().writes, 50);
    }

    #[test]
    fn read_run_moves_every_block() {
        let mut bench = bench(MemDevice::from_data(vec![0x3C; 8 * BLOCK]), 8);
        let report = bench.read(20).unwrap();

        assert_eq!(report.bytes, 20 * BLOCK as u64);
        assert!(bench.buffer().iter().all(|&b| b == 0x3C));
    }

    #[test]
    fn addresses_stay_within_span() {
        // Any address >= 4 would land past the end and fail the run.
        let mut bench = bench(MemDevice::new(4 * BLOCK), 4);
        bench.write(200).unwrap();
        bench.read(200).unwrap();
    }

    #[test]
    fn writes_refresh_payload() {
        let mut bench = bench(MemDevice::new(4 * BLOCK), 4);
        let before = bench.buffer().to_vec();
        bench.write(1).unwrap();
        assert_ne!(bench.buffer(), &before[..]);
    }

    #[test]
    fn short_transfers_are_counted() {
        let mut bench = bench(MemDevice::new(8 * BLOCK).with_read_limit(100), 8);
        let report = bench.read(10).unwrap();
        assert_eq!(report.short_transfers, 10);
        assert_eq!(report.bytes, 1000);
    }

    #[test]
    fn failed_transfer_aborts_run_but_keeps_handle() {
        let mut bench = bench(MemDevice::new(8 * BLOCK).failing_reads(), 8);
        let err = bench.read(5).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Transfer {
                operation: Operation::Read,
                index: 0,
                ..
            }
        ));
        assert!(bench.handle().is_open());
        bench.write(1).unwrap();
    }

    #[test]
    fn span_past_device_end_reports_mismatch() {
        let mut bench = bench(MemDevice::new(BLOCK), 1_000_000);
        let err = bench.write(100).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Transfer {
                source: IoError::OffsetMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn same_seed_writes_same_image() {
        let image = || {
            let mut bench = bench(MemDevice::new(8 * BLOCK), 8);
            bench.write(12).unwrap();
            bench.handle().device().unwrap().contents().to_vec()
        };
        assert_eq!(image(), image());
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("READ".parse::<Operation>().unwrap(), Operation::Read);
        assert_eq!("write".parse::<Operation>().unwrap(), Operation::Write);
        assert!("trim".parse::<Operation>().is_err());
    }

    #[test]
    fn throughput_is_bytes_over_time() {
        let report = RunReport {
            operation: Operation::Read,
            blocks: 1,
            bytes: 1024 * 1024,
            short_transfers: 0,
            elapsed_ns: 500_000_000,
            latency: LatencySummary::default(),
        };
        assert!((report.throughput_mib_s() - 2.0).abs() < f64::EPSILON);
        assert_eq!(report.elapsed(), Duration::from_millis(500));
    }
}
