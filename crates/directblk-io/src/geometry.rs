//! Block addressing.
//!
//! Callers never hand the device a raw byte offset. They name a
//! [`BlockAddress`], and the [`BlockGeometry`] of the handle turns it into
//! `address × block_size`, rejecting anything the OS positioning call could
//! not represent.

use std::fmt::{self, Display};

use crate::IoError;

/// Default unit of a block address, in bytes (32 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Default start-address boundary for direct I/O buffers, in bytes.
pub const DEFAULT_ALIGNMENT: usize = 512;

/// Largest byte offset accepted by the positioning syscall (`off_t` is signed).
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Logical index of a fixed-size unit of storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockAddress(u64);

impl BlockAddress {
    pub const ZERO: BlockAddress = BlockAddress(0);

    pub fn new(address: u64) -> Self {
        Self(address)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockAddress {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockAddress> for u64 {
    fn from(address: BlockAddress) -> Self {
        address.0
    }
}

/// Signed addresses arrive from managed callers whose integers are signed.
impl TryFrom<i64> for BlockAddress {
    type Error = IoError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| IoError::InvalidAddress {
                address: i128::from(value),
                reason: "block address is negative",
            })
    }
}

/// Block size and buffer alignment shared by addressing and staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockGeometry {
    block_size: usize,
    alignment: usize,
}

impl BlockGeometry {
    /// Creates a geometry.
    ///
    /// The alignment must be a non-zero power of two and the block size a
    /// non-zero multiple of it, so every block offset is itself aligned.
    pub fn new(block_size: usize, alignment: usize) -> Result<Self, IoError> {
        let invalid = |reason| IoError::InvalidGeometry {
            block_size,
            alignment,
            reason,
        };

        if !alignment.is_power_of_two() {
            return Err(invalid("alignment must be a power of two"));
        }
        if block_size == 0 {
            return Err(invalid("block size must be positive"));
        }
        if block_size % alignment != 0 {
            return Err(invalid("block size must be a multiple of the alignment"));
        }

        Ok(Self {
            block_size,
            alignment,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Returns the byte offset of `address`.
    ///
    /// Fails with [`IoError::InvalidAddress`] when the product overflows or
    /// exceeds [`MAX_OFFSET`].
    pub fn offset_of(&self, address: BlockAddress) -> Result<u64, IoError> {
        let invalid = |reason| IoError::InvalidAddress {
            address: i128::from(address.as_u64()),
            reason,
        };

        let offset = address
            .as_u64()
            .checked_mul(self.block_size as u64)
            .ok_or_else(|| invalid("byte offset overflows u64"))?;

        if offset > MAX_OFFSET {
            return Err(invalid("byte offset exceeds the largest device offset"));
        }
        Ok(offset)
    }

    /// Returns how many whole blocks fit in `bytes`.
    pub fn blocks_in(&self, bytes: u64) -> u64 {
        bytes / self.block_size as u64
    }
}

impl Default for BlockGeometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl Display for BlockGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B blocks, {}B aligned", self.block_size, self.alignment)
    }
}
