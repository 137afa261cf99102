//! Device handle: open/close, block positioning, and staged transfers.
//!
//! A [`DeviceHandle`] owns one open device for its whole session. Every
//! transfer follows the same shape:
//!
//! ```text
//!   caller buffer ──► validate ──► stage AlignedBuffer ──► position(address × block_size)
//!                                                                 │
//!   caller buffer ◄── copy back (reads, on request) ◄── read/write syscall
//! ```
//!
//! The handle takes `&mut self` for every positioned operation, so a seek can
//! never be interleaved with another caller's transfer unless the handle is
//! shared behind a lock that is held across both.

use std::path::Path;

use crate::aligned::AlignedBuffer;
use crate::backend::{OpenMode, RawDevice};
use crate::file_device::FileDevice;
use crate::geometry::{BlockAddress, BlockGeometry};
use crate::IoError;

/// An open (or closed) session on a single device.
#[derive(Debug)]
pub struct DeviceHandle<D: RawDevice = FileDevice> {
    /// `None` once the handle has been closed.
    device: Option<D>,
    mode: OpenMode,
    geometry: BlockGeometry,
}

impl DeviceHandle<FileDevice> {
    /// Opens `path` read-write in the given mode.
    pub fn open(
        path: impl AsRef<Path>,
        mode: OpenMode,
        geometry: BlockGeometry,
    ) -> Result<Self, IoError> {
        let path = path.as_ref();
        let device = FileDevice::open(path, mode).map_err(|source| IoError::Open {
            path: path.to_path_buf(),
            mode,
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            mode = %mode,
            geometry = %geometry,
            extent = ?device.extent(),
            "opened device"
        );
        Ok(Self::from_device(device, mode, geometry))
    }
}

impl<D: RawDevice> DeviceHandle<D> {
    /// Wraps an already-open device.
    pub fn from_device(device: D, mode: OpenMode, geometry: BlockGeometry) -> Self {
        Self {
            device: Some(device),
            mode,
            geometry,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    /// Returns the underlying device while the handle is open.
    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    fn device_mut(&mut self) -> Result<&mut D, IoError> {
        self.device.as_mut().ok_or(IoError::NotOpen)
    }

    /// Closes the device.
    ///
    /// Closing twice is a usage error and reports [`IoError::AlreadyClosed`].
    /// A failing close still leaves the handle closed.
    pub fn close(&mut self) -> Result<(), IoError> {
        let device = self.device.take().ok_or(IoError::AlreadyClosed)?;
        device.close().map_err(|source| IoError::Close { source })?;
        tracing::debug!(mode = %self.mode, "closed device");
        Ok(())
    }

    /// Positions the device at the start of `address` and returns the applied
    /// byte offset.
    ///
    /// Fails with [`IoError::OffsetMismatch`] if the device lands anywhere
    /// other than `address × block_size`, e.g. because it is shorter than that.
    pub fn seek_to_block(&mut self, address: BlockAddress) -> Result<u64, IoError> {
        let requested = self.geometry.offset_of(address)?;
        let device = self.device_mut()?;

        let applied = device.position(requested).map_err(|source| IoError::Seek {
            offset: requested,
            source,
        })?;

        if applied != requested {
            tracing::debug!(
                address = %address,
                requested,
                applied,
                "device positioned at a different offset"
            );
            return Err(IoError::OffsetMismatch { requested, applied });
        }
        Ok(applied)
    }

    /// Reads `dest.len()` bytes starting at block `address`.
    ///
    /// Returns the number of bytes the device delivered, which is less than
    /// `dest.len()` on a short read. When `copy_out` is false the data is
    /// discarded and `dest` is left untouched; when true, only the first
    /// `bytes_read` bytes of `dest` are overwritten.
    pub fn read_block(
        &mut self,
        address: BlockAddress,
        dest: &mut [u8],
        copy_out: bool,
    ) -> Result<usize, IoError> {
        let len = dest.len();
        let mut staged = self.stage(len)?;
        self.seek_to_block(address)?;

        let device = self.device_mut()?;
        let read = device
            .read(staged.as_mut_slice())
            .map_err(|source| IoError::Read {
                address: address.as_u64(),
                len,
                source,
            })?
            .min(len);

        if read < len {
            tracing::debug!(address = %address, requested = len, read, "short read");
        } else {
            tracing::trace!(address = %address, len, "read block");
        }

        if copy_out {
            dest[..read].copy_from_slice(&staged.as_slice()[..read]);
        }
        Ok(read)
    }

    /// Writes all of `src` starting at block `address`.
    ///
    /// Returns the number of bytes the device accepted. A short write is
    /// reported, never retried; callers that need the full length must check.
    pub fn write_block(&mut self, address: BlockAddress, src: &[u8]) -> Result<usize, IoError> {
        let len = src.len();
        let mut staged = self.stage(len)?;
        staged.as_mut_slice().copy_from_slice(src);
        self.seek_to_block(address)?;

        let device = self.device_mut()?;
        let written = device
            .write(staged.as_slice())
            .map_err(|source| IoError::Write {
                address: address.as_u64(),
                len,
                source,
            })?
            .min(len);

        if written < len {
            tracing::debug!(address = %address, requested = len, written, "short write");
        } else {
            tracing::trace!(address = %address, len, "wrote block");
        }
        Ok(written)
    }

    /// Validates the handle and length, then stages the scratch region. No
    /// device call happens before this succeeds.
    fn stage(&self, len: usize) -> Result<AlignedBuffer, IoError> {
        if self.device.is_none() {
            return Err(IoError::NotOpen);
        }
        AlignedBuffer::stage(len, self.geometry.alignment())
    }
}
