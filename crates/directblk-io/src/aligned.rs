//! Aligned staging buffer for Direct I/O.
//!
//! When a device is opened with `O_DIRECT`, the kernel rejects (or on some
//! platforms silently mangles) transfers whose buffer does not start on the
//! device's alignment boundary. Caller buffers carry no such guarantee, so every
//! transfer is staged through an [`AlignedBuffer`] allocated with an explicit
//! alignment in its [`Layout`].

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::slice;

use crate::IoError;

/// A zero-filled scratch region whose start address is a multiple of its
/// alignment.
///
/// Owned by a single transfer and released on drop, on every exit path.
#[derive(Debug)]
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl AlignedBuffer {
    /// Stages a region of `len` usable bytes aligned to `alignment`.
    ///
    /// The allocation is rounded up to the next multiple of `alignment`.
    pub fn stage(len: usize, alignment: usize) -> Result<Self, IoError> {
        if !alignment.is_power_of_two() {
            return Err(IoError::InvalidAlignment { alignment });
        }
        if len == 0 {
            return Err(IoError::InvalidLength { len });
        }

        let layout = round_up(len, alignment)
            .and_then(|capacity| Layout::from_size_align(capacity, alignment).ok())
            .ok_or(IoError::InvalidLength { len })?;

        // SAFETY: `layout` has a non-zero size (`len > 0` rounds up to at least
        // `alignment`) and a power-of-two alignment, as checked above.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        Ok(Self { ptr, len, layout })
    }

    /// Returns the start address of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns the number of usable bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a staged region holds at least one byte.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the allocated size, including alignment padding.
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` points to `layout.size() >= len` initialized (zeroed)
        // bytes owned by `self`; the borrow ties the slice to `&self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl AsRef<[u8]> for AlignedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for AlignedBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with exactly this layout
        // and is freed only here.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Rounds `value` up to the nearest multiple of `alignment`, or `None` on overflow.
fn round_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(
        alignment.is_power_of_two(),
        "alignment must be a power of two"
    );
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
}
