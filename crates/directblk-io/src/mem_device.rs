//! In-memory simulated device.
//!
//! [`MemDevice`] behaves like a block device of fixed size: positioning past
//! its end stops at the end, and transfers never extend it. It can be told to
//! service only part of each transfer, to fail transfers or close outright, and
//! it counts every call so tests can assert that invalid input never reached
//! the device.

use std::io;

use crate::backend::RawDevice;

/// Number of calls a [`MemDevice`] has serviced, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub positions: u64,
    pub reads: u64,
    pub writes: u64,
}

impl DeviceStats {
    /// Total calls that would have been syscalls on a real device.
    pub fn total(&self) -> u64 {
        self.positions + self.reads + self.writes
    }
}

/// A fixed-size device backed by a `Vec<u8>`.
#[derive(Debug, Clone, Default)]
pub struct MemDevice {
    data: Vec<u8>,
    pos: usize,
    read_limit: Option<usize>,
    write_limit: Option<usize>,
    fail_reads: bool,
    fail_writes: bool,
    fail_close: bool,
    /// Kind of every injected failure; `Other` when unset.
    failure_kind: Option<io::ErrorKind>,
    stats: DeviceStats,
}

impl MemDevice {
    /// Creates a zero-filled device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            ..Self::default()
        }
    }

    /// Creates a device holding `data`.
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Services at most `limit` bytes per read.
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit);
        self
    }

    /// Services at most `limit` bytes per write.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fails every read with an I/O error.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Fails every write with an I/O error.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Fails the close call.
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Reports injected failures with `kind`, e.g. `Interrupted` to stand in
    /// for a signal landing mid-syscall.
    pub fn with_failure_kind(mut self, kind: io::ErrorKind) -> Self {
        self.failure_kind = Some(kind);
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Current position, in bytes.
    pub fn current_offset(&self) -> u64 {
        self.pos as u64
    }

    fn failure(&self, msg: &str) -> io::Error {
        io::Error::new(self.failure_kind.unwrap_or(io::ErrorKind::Other), msg.to_string())
    }

    fn transfer_len(&self, requested: usize, limit: Option<usize>) -> usize {
        let remaining = self.data.len().saturating_sub(self.pos);
        requested.min(remaining).min(limit.unwrap_or(usize::MAX))
    }
}

impl RawDevice for MemDevice {
    fn position(&mut self, offset: u64) -> io::Result<u64> {
        self.stats.positions += 1;
        let end = self.data.len();
        self.pos = usize::try_from(offset).map_or(end, |offset| offset.min(end));
        Ok(self.pos as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stats.reads += 1;
        if self.fail_reads {
            return Err(self.failure("simulated read failure"));
        }
        let n = self.transfer_len(buf.len(), self.read_limit);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stats.writes += 1;
        if self.fail_writes {
            return Err(self.failure("simulated write failure"));
        }
        let n = self.transfer_len(buf.len(), self.write_limit);
        self.data[self.pos..self.pos + n].copy_from_slice(&buf[..n]);
        self.pos += n;
        Ok(n)
    }

    fn close(self) -> io::Result<()> {
        if self.fail_close {
            return Err(self.failure("simulated close failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_stops_at_end() {
        let mut device = MemDevice::new(1024);
        assert_eq!(device.position(512).unwrap(), 512);
        assert_eq!(device.position(4096).unwrap(), 1024);
        assert_eq!(device.stats().positions, 2);
    }

    #[test]
    fn read_limit_shortens_reads() {
        let mut device = MemDevice::from_data((0..=255).collect()).with_read_limit(10);
        let mut buf = [0u8; 64];
        assert_eq!(device.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(device.current_offset(), 10);
    }

    #[test]
    fn write_never_extends_device() {
        let mut device = MemDevice::new(16);
        device.position(10).unwrap();
        assert_eq!(device.write(&[0xFF; 32]).unwrap(), 6);
        assert_eq!(device.size(), 16);
        assert!(device.contents()[10..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let mut device = MemDevice::new(64).failing_reads().failing_writes();
        assert!(device.read(&mut [0u8; 8]).is_err());
        assert!(device.write(&[0u8; 8]).is_err());
        assert_eq!(device.stats().total(), 2);
        assert!(MemDevice::new(1).failing_close().close().is_err());
    }
}
