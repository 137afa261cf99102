//! Raw device trait.
//!
//! [`RawDevice`] is the seam between the transfer logic in
//! [`DeviceHandle`](crate::DeviceHandle) and the descriptor that actually
//! moves bytes. [`FileDevice`](crate::FileDevice) talks to the OS;
//! [`MemDevice`](crate::MemDevice) simulates a fixed-size device so addressing,
//! short transfers, and failure paths can be exercised without hardware.

use std::fmt::{self, Display};
use std::io;

/// How the device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpenMode {
    /// Bypass the OS page cache (`O_DIRECT` on Linux, `F_NOCACHE` on macOS).
    /// Transfer buffers must be aligned.
    #[default]
    Direct,
    /// Regular cached I/O.
    Buffered,
}

impl OpenMode {
    pub fn from_direct(direct: bool) -> Self {
        if direct { Self::Direct } else { Self::Buffered }
    }

    pub fn is_direct(self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Buffered => f.write_str("buffered"),
        }
    }
}

/// A positioned, synchronous byte device.
///
/// Each method maps to a single syscall. Implementations must not retry short
/// transfers or interrupted calls; the count or error they return is what the
/// caller sees, `ErrorKind::Interrupted` included.
pub trait RawDevice: Send {
    /// Moves the device position to `offset` and returns the offset the device
    /// actually applied.
    ///
    /// A device with a fixed extent positions at its end when `offset` lies
    /// past it, so the caller can detect the difference.
    fn position(&mut self, offset: u64) -> io::Result<u64>;

    /// Reads up to `buf.len()` bytes at the current position.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes up to `buf.len()` bytes at the current position.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Releases the device, reporting a failing close.
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}
