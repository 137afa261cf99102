//! # directblk-io: Direct Block-Device I/O
//!
//! A synchronous, single-request shim for moving whole blocks to and from a
//! raw device with the page cache bypassed, built for throughput benchmarking.
//!
//! - **Addressing**: callers name a [`BlockAddress`]; the handle's
//!   [`BlockGeometry`] turns it into `address × block_size` and verifies the
//!   device landed there.
//! - **Alignment**: every transfer is staged through an [`AlignedBuffer`]
//!   whose start address satisfies the direct-I/O boundary, whatever the
//!   alignment of the caller's buffer.
//! - **Reporting**: syscall failures become typed [`IoError`]s; short
//!   transfers are returned as reduced byte counts and never retried.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ directblk-bench / -ffi / -cli│
//! └──────────────┬───────────────┘
//!                │
//! ┌──────────────┴───────────────┐
//! │         DeviceHandle         │
//! │  geometry · staging · checks │
//! └──────────────┬───────────────┘
//!                │ RawDevice
//!        ┌───────┴────────┐
//!   ┌────┴─────┐    ┌─────┴─────┐
//!   │FileDevice│    │ MemDevice │
//!   └──────────┘    └───────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use directblk_io::{BlockAddress, BlockGeometry, DeviceHandle, OpenMode};
//!
//! # fn main() -> Result<(), directblk_io::IoError> {
//! let mut handle = DeviceHandle::open("/dev/raw1", OpenMode::Direct, BlockGeometry::default())?;
//! let block = vec![0xAA; handle.geometry().block_size()];
//! handle.write_block(BlockAddress::new(3), &block)?;
//!
//! let mut dest = vec![0; block.len()];
//! let read = handle.read_block(BlockAddress::new(3), &mut dest, true)?;
//! assert_eq!(read, block.len());
//! handle.close()?;
//! # Ok(())
//! # }
//! ```

mod aligned;
mod backend;
mod error;
mod file_device;
mod geometry;
mod handle;
mod mem_device;

pub use aligned::AlignedBuffer;
pub use backend::{OpenMode, RawDevice};
pub use error::IoError;
pub use file_device::FileDevice;
pub use geometry::{BlockAddress, BlockGeometry, DEFAULT_ALIGNMENT, DEFAULT_BLOCK_SIZE, MAX_OFFSET};
pub use handle::DeviceHandle;
pub use mem_device::{DeviceStats, MemDevice};
