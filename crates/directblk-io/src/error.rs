//! Device I/O error types.

use std::path::PathBuf;

use crate::OpenMode;

/// Errors from opening, addressing, and transferring on a block device.
///
/// Every syscall-level failure carries the underlying [`std::io::Error`] as its
/// source. Short transfers are not errors; they surface as a reduced byte count.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The device could not be opened (bad path, permissions, direct mode
    /// unsupported by the filesystem).
    #[error("failed to open {} in {mode} mode: {source}", path.display())]
    Open {
        path: PathBuf,
        mode: OpenMode,
        #[source]
        source: std::io::Error,
    },

    /// The close syscall failed.
    #[error("failed to close device: {source}")]
    Close {
        #[source]
        source: std::io::Error,
    },

    /// `close` was called on a handle that is already closed.
    #[error("device handle already closed")]
    AlreadyClosed,

    /// Addressing or transfer attempted on a closed handle.
    #[error("device handle is not open")]
    NotOpen,

    /// The block address is negative or its byte offset is not representable.
    #[error("invalid block address {address}: {reason}")]
    InvalidAddress { address: i128, reason: &'static str },

    /// Positioning succeeded but landed somewhere other than requested.
    #[error("device positioned at offset {applied}, requested {requested}")]
    OffsetMismatch { requested: u64, applied: u64 },

    /// The positioning syscall failed.
    #[error("failed to position device at offset {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The read syscall failed.
    #[error("failed to read {len} bytes at block {address}: {source}")]
    Read {
        address: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    /// The write syscall failed.
    #[error("failed to write {len} bytes at block {address}: {source}")]
    Write {
        address: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    /// The caller buffer is empty or too large to stage.
    #[error("invalid transfer length: {len} bytes")]
    InvalidLength { len: usize },

    /// A staging alignment that is not a power of two.
    #[error("invalid buffer alignment {alignment}: must be a power of two")]
    InvalidAlignment { alignment: usize },

    /// Block size and alignment do not form a usable geometry.
    #[error("invalid geometry (block size {block_size}, alignment {alignment}): {reason}")]
    InvalidGeometry {
        block_size: usize,
        alignment: usize,
        reason: &'static str,
    },
}
