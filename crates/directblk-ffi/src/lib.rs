//! # directblk FFI
//!
//! C-compatible Foreign Function Interface for direct block-device I/O.
//!
//! This crate is the boundary a managed benchmark runtime (JNI, P/Invoke,
//! ctypes, ...) links against. All functions use C-compatible types and follow
//! these conventions:
//!
//! - Return `DblkError` (error code)
//! - Use out-parameters for results (e.g., `bytes_out`)
//! - NULL-check all pointers
//! - UTF-8 validate all strings
//!
//! ## Session Model
//!
//! The library tracks a single process-wide device session:
//! `dblk_open` → any number of `dblk_read_block` / `dblk_write_block` →
//! `dblk_close`. A second `dblk_open` before `dblk_close` is rejected with
//! `DblkErrAlreadyOpen` rather than leaking the first descriptor.
//!
//! ## Thread Safety
//!
//! Every call takes the session lock for its whole duration, so the
//! seek + transfer pair of one call is never interleaved with another
//! thread's. Ordering between calls from different threads is up to the caller.
//!
//! ## Memory Management
//!
//! Caller buffers are borrowed for the duration of one call and never retained.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

use directblk_io::{BlockAddress, BlockGeometry, DeviceHandle, IoError, OpenMode};

/// Error codes returned by all FFI functions.
///
/// Error code 0 (`DBLK_OK`) indicates success.
/// All other codes indicate various failure modes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DblkError {
    /// Success (no error)
    DblkOk = 0,
    /// NULL pointer passed where non-NULL required
    DblkErrNullPointer = 1,
    /// String is not valid UTF-8
    DblkErrInvalidUtf8 = 2,
    /// Device could not be opened
    DblkErrOpenFailed = 3,
    /// Close syscall failed
    DblkErrCloseFailed = 4,
    /// No session to close
    DblkErrAlreadyClosed = 5,
    /// Transfer attempted without an open session
    DblkErrNotOpen = 6,
    /// A session is already open
    DblkErrAlreadyOpen = 7,
    /// Block address is negative or out of range
    DblkErrInvalidAddress = 8,
    /// Device positioned at a different offset than requested
    DblkErrOffsetMismatch = 9,
    /// Positioning syscall failed
    DblkErrSeekFailed = 10,
    /// Read syscall failed
    DblkErrReadFailed = 11,
    /// Write syscall failed
    DblkErrWriteFailed = 12,
    /// Buffer length is zero or too large
    DblkErrInvalidLength = 13,
    /// Block size / alignment rejected
    DblkErrInvalidGeometry = 14,
}

impl From<&IoError> for DblkError {
    fn from(err: &IoError) -> Self {
        match err {
            IoError::Open { .. } => DblkError::DblkErrOpenFailed,
            IoError::Close { .. } => DblkError::DblkErrCloseFailed,
            IoError::AlreadyClosed => DblkError::DblkErrAlreadyClosed,
            IoError::NotOpen => DblkError::DblkErrNotOpen,
            IoError::InvalidAddress { .. } => DblkError::DblkErrInvalidAddress,
            IoError::OffsetMismatch { .. } => DblkError::DblkErrOffsetMismatch,
            IoError::Seek { .. } => DblkError::DblkErrSeekFailed,
            IoError::Read { .. } => DblkError::DblkErrReadFailed,
            IoError::Write { .. } => DblkError::DblkErrWriteFailed,
            IoError::InvalidLength { .. } => DblkError::DblkErrInvalidLength,
            IoError::InvalidGeometry { .. } | IoError::InvalidAlignment { .. } => {
                DblkError::DblkErrInvalidGeometry
            }
        }
    }
}

struct Session {
    handle: Option<DeviceHandle>,
    /// `None` means the default geometry.
    geometry: Option<BlockGeometry>,
    /// `(requested, applied)` of the most recent offset mismatch.
    last_mismatch: Option<(u64, u64)>,
}

static SESSION: Mutex<Session> = Mutex::new(Session {
    handle: None,
    geometry: None,
    last_mismatch: None,
});

fn session() -> MutexGuard<'static, Session> {
    // A panic while holding the lock cannot leave the session half-updated in a
    // way later calls would misread, so keep going with the inner value.
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    fn record(&mut self, err: &IoError) -> DblkError {
        if let IoError::OffsetMismatch { requested, applied } = err {
            self.last_mismatch = Some((*requested, *applied));
        }
        tracing::debug!(error = %err, "directblk call failed");
        DblkError::from(err)
    }
}

/// Set the block size and buffer alignment used by the next `dblk_open`.
///
/// # Arguments
/// - `block_size`: Bytes per block address (default 32768)
/// - `alignment`: Direct-I/O buffer alignment, a power of two (default 512)
///
/// # Returns
/// - `DBLK_OK` on success
/// - `DBLK_ERR_ALREADY_OPEN` while a session is open
/// - `DBLK_ERR_INVALID_GEOMETRY` if the values are rejected
#[no_mangle]
pub extern "C" fn dblk_configure(block_size: usize, alignment: usize) -> DblkError {
    let mut session = session();
    if session.handle.is_some() {
        return DblkError::DblkErrAlreadyOpen;
    }
    match BlockGeometry::new(block_size, alignment) {
        Ok(geometry) => {
            session.geometry = Some(geometry);
            DblkError::DblkOk
        }
        Err(e) => session.record(&e),
    }
}

/// Open a device for reading and writing.
///
/// # Arguments
/// - `path`: Device path (NULL-terminated UTF-8)
/// - `direct`: Bypass the OS page cache
///
/// # Returns
/// - `DBLK_OK` on success
/// - Error code on failure
///
/// # Safety
/// - `path` must be a valid NULL-terminated C string
/// - Caller must call `dblk_close()` to release the device
#[no_mangle]
pub unsafe extern "C" fn dblk_open(path: *const c_char, direct: bool) -> DblkError {
    if path.is_null() {
        return DblkError::DblkErrNullPointer;
    }

    // Validate UTF-8
    let path = match CStr::from_ptr(path).to_str() {
        Ok(s) => s,
        Err(_) => return DblkError::DblkErrInvalidUtf8,
    };

    let mut session = session();
    if session.handle.is_some() {
        return DblkError::DblkErrAlreadyOpen;
    }

    let geometry = session.geometry.unwrap_or_default();
    match DeviceHandle::open(path, OpenMode::from_direct(direct), geometry) {
        Ok(handle) => {
            session.handle = Some(handle);
            session.last_mismatch = None;
            DblkError::DblkOk
        }
        Err(e) => session.record(&e),
    }
}

/// Close the open device.
///
/// # Returns
/// - `DBLK_OK` on success
/// - `DBLK_ERR_ALREADY_CLOSED` if no session is open
/// - `DBLK_ERR_CLOSE_FAILED` if the close syscall failed (the session is
///   released regardless)
#[no_mangle]
pub extern "C" fn dblk_close() -> DblkError {
    let mut session = session();
    let Some(mut handle) = session.handle.take() else {
        return DblkError::DblkErrAlreadyClosed;
    };
    match handle.close() {
        Ok(()) => DblkError::DblkOk,
        Err(e) => session.record(&e),
    }
}

/// Read one transfer starting at a block address.
///
/// # Arguments
/// - `address`: Logical block address (must be non-negative)
/// - `data`: Destination buffer
/// - `len`: Length of `data` in bytes
/// - `copy_out`: Copy the data into `data`; if false, `data` is untouched and
///   only the transfer is performed
/// - `bytes_out`: Output parameter for the number of bytes read (may be less
///   than `len` on a short read)
///
/// # Returns
/// - `DBLK_OK` on success, including short reads
/// - Error code on failure
///
/// # Safety
/// - `data` must be valid for writes of `len` bytes
/// - `bytes_out` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn dblk_read_block(
    address: i64,
    data: *mut u8,
    len: usize,
    copy_out: bool,
    bytes_out: *mut usize,
) -> DblkError {
    if data.is_null() || bytes_out.is_null() {
        return DblkError::DblkErrNullPointer;
    }
    let dest = slice::from_raw_parts_mut(data, len);

    let mut session = session();
    let result = BlockAddress::try_from(address).and_then(|address| {
        session
            .handle
            .as_mut()
            .ok_or(IoError::NotOpen)?
            .read_block(address, dest, copy_out)
    });

    match result {
        Ok(n) => {
            *bytes_out = n;
            DblkError::DblkOk
        }
        Err(e) => session.record(&e),
    }
}

/// Write one transfer starting at a block address.
///
/// # Arguments
/// - `address`: Logical block address (must be non-negative)
/// - `data`: Source buffer
/// - `len`: Length of `data` in bytes
/// - `bytes_out`: Output parameter for the number of bytes written (may be
///   less than `len` on a short write; the write is not retried)
///
/// # Returns
/// - `DBLK_OK` on success, including short writes
/// - Error code on failure
///
/// # Safety
/// - `data` must be valid for reads of `len` bytes
/// - `bytes_out` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn dblk_write_block(
    address: i64,
    data: *const u8,
    len: usize,
    bytes_out: *mut usize,
) -> DblkError {
    if data.is_null() || bytes_out.is_null() {
        return DblkError::DblkErrNullPointer;
    }
    let src = slice::from_raw_parts(data, len);

    let mut session = session();
    let result = BlockAddress::try_from(address).and_then(|address| {
        session
            .handle
            .as_mut()
            .ok_or(IoError::NotOpen)?
            .write_block(address, src)
    });

    match result {
        Ok(n) => {
            *bytes_out = n;
            DblkError::DblkOk
        }
        Err(e) => session.record(&e),
    }
}

/// Get the offsets of the most recent `DBLK_ERR_OFFSET_MISMATCH` in this
/// session.
///
/// # Returns
/// - `true` and fills both outputs if a mismatch was recorded
/// - `false` otherwise, or if either pointer is NULL
///
/// # Safety
/// - `requested_out` and `applied_out` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn dblk_last_offset_mismatch(
    requested_out: *mut u64,
    applied_out: *mut u64,
) -> bool {
    if requested_out.is_null() || applied_out.is_null() {
        return false;
    }
    match session().last_mismatch {
        Some((requested, applied)) => {
            *requested_out = requested;
            *applied_out = applied;
            true
        }
        None => false,
    }
}

/// Get human-readable error message for error code.
///
/// # Returns
/// - Static NULL-terminated string (do not free)
#[no_mangle]
pub extern "C" fn dblk_error_message(error: DblkError) -> *const c_char {
    let msg: &'static [u8] = match error {
        DblkError::DblkOk => b"Success\0",
        DblkError::DblkErrNullPointer => b"NULL pointer argument\0",
        DblkError::DblkErrInvalidUtf8 => b"String is not valid UTF-8\0",
        DblkError::DblkErrOpenFailed => b"Device could not be opened\0",
        DblkError::DblkErrCloseFailed => b"Device close failed\0",
        DblkError::DblkErrAlreadyClosed => b"Device is already closed\0",
        DblkError::DblkErrNotOpen => b"Device is not open\0",
        DblkError::DblkErrAlreadyOpen => b"A device is already open\0",
        DblkError::DblkErrInvalidAddress => b"Block address is negative or out of range\0",
        DblkError::DblkErrOffsetMismatch => b"Device positioned at a different offset\0",
        DblkError::DblkErrSeekFailed => b"Device positioning failed\0",
        DblkError::DblkErrReadFailed => b"Device read failed\0",
        DblkError::DblkErrWriteFailed => b"Device write failed\0",
        DblkError::DblkErrInvalidLength => b"Buffer length is zero or too large\0",
        DblkError::DblkErrInvalidGeometry => b"Block size or alignment rejected\0",
    };
    msg.as_ptr().cast::<c_char>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::path::Path;

    // The session is process-wide; tests touching it run one at a time.
    static SERIAL: Mutex<()> = Mutex::new(());

    const BLOCK: usize = 4096;

    fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset() {
        let _ = dblk_close();
        let mut session = session();
        session.geometry = None;
        session.last_mismatch = None;
    }

    fn image(dir: &Path, blocks: usize) -> CString {
        let path = dir.join("device.img");
        std::fs::write(&path, vec![0u8; blocks * BLOCK]).unwrap();
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn open_write_read_close() {
        let _guard = serial();
        reset();
        let dir = tempfile::tempdir().unwrap();
        let path = image(dir.path(), 8);

        assert_eq!(dblk_configure(BLOCK, 512), DblkError::DblkOk);
        assert_eq!(unsafe { dblk_open(path.as_ptr(), false) }, DblkError::DblkOk);

        let src = vec![0xAAu8; BLOCK];
        let mut n = 0usize;
        assert_eq!(
            unsafe { dblk_write_block(3, src.as_ptr(), src.len(), &mut n) },
            DblkError::DblkOk
        );
        assert_eq!(n, BLOCK);

        let mut dest = vec![0u8; BLOCK];
        assert_eq!(
            unsafe { dblk_read_block(3, dest.as_mut_ptr(), dest.len(), true, &mut n) },
            DblkError::DblkOk
        );
        assert_eq!(n, BLOCK);
        assert_eq!(dest, src);

        assert_eq!(dblk_close(), DblkError::DblkOk);
        assert_eq!(dblk_close(), DblkError::DblkErrAlreadyClosed);
    }

    #[test]
    fn second_open_is_rejected() {
        let _guard = serial();
        reset();
        let dir = tempfile::tempdir().unwrap();
        let path = image(dir.path(), 1);

        assert_eq!(unsafe { dblk_open(path.as_ptr(), false) }, DblkError::DblkOk);
        assert_eq!(
            unsafe { dblk_open(path.as_ptr(), false) },
            DblkError::DblkErrAlreadyOpen
        );
        assert_eq!(dblk_configure(BLOCK, 512), DblkError::DblkErrAlreadyOpen);
        assert_eq!(dblk_close(), DblkError::DblkOk);
    }

    #[test]
    fn transfers_without_session_are_rejected() {
        let _guard = serial();
        reset();
        let mut buf = [0u8; 512];
        let mut n = 0usize;
        assert_eq!(
            unsafe { dblk_read_block(0, buf.as_mut_ptr(), buf.len(), true, &mut n) },
            DblkError::DblkErrNotOpen
        );
        assert_eq!(
            unsafe { dblk_write_block(0, buf.as_ptr(), buf.len(), &mut n) },
            DblkError::DblkErrNotOpen
        );
    }

    #[test]
    fn negative_address_is_rejected() {
        let _guard = serial();
        reset();
        let dir = tempfile::tempdir().unwrap();
        let path = image(dir.path(), 1);
        assert_eq!(unsafe { dblk_open(path.as_ptr(), false) }, DblkError::DblkOk);

        let mut buf = [0u8; 512];
        let mut n = 0usize;
        assert_eq!(
            unsafe { dblk_read_block(-1, buf.as_mut_ptr(), buf.len(), true, &mut n) },
            DblkError::DblkErrInvalidAddress
        );
        assert_eq!(
            unsafe { dblk_write_block(i64::MIN, buf.as_ptr(), buf.len(), &mut n) },
            DblkError::DblkErrInvalidAddress
        );
        assert_eq!(dblk_close(), DblkError::DblkOk);
    }

    #[test]
    fn null_pointers_are_rejected() {
        let _guard = serial();
        reset();
        let mut n = 0usize;
        assert_eq!(
            unsafe { dblk_open(std::ptr::null(), true) },
            DblkError::DblkErrNullPointer
        );
        assert_eq!(
            unsafe { dblk_read_block(0, std::ptr::null_mut(), 512, true, &mut n) },
            DblkError::DblkErrNullPointer
        );
        assert_eq!(
            unsafe { dblk_write_block(0, [0u8; 1].as_ptr(), 1, std::ptr::null_mut()) },
            DblkError::DblkErrNullPointer
        );
    }

    #[test]
    fn open_missing_device_fails() {
        let _guard = serial();
        reset();
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("absent").to_str().unwrap()).unwrap();
        assert_eq!(
            unsafe { dblk_open(path.as_ptr(), false) },
            DblkError::DblkErrOpenFailed
        );
        assert_eq!(dblk_close(), DblkError::DblkErrAlreadyClosed);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let _guard = serial();
        reset();
        assert_eq!(dblk_configure(1000, 512), DblkError::DblkErrInvalidGeometry);
        assert_eq!(dblk_configure(4096, 0), DblkError::DblkErrInvalidGeometry);
    }

    #[test]
    fn offset_mismatch_diagnostics_start_empty() {
        let _guard = serial();
        reset();
        let (mut requested, mut applied) = (0u64, 0u64);
        assert!(!unsafe { dblk_last_offset_mismatch(&mut requested, &mut applied) });
        assert!(!unsafe { dblk_last_offset_mismatch(std::ptr::null_mut(), &mut applied) });
    }

    #[test]
    fn offset_mismatch_is_recorded_with_both_offsets() {
        let _guard = serial();
        reset();

        // A fixed-extent device shorter than the requested block, as a real
        // block device reports it.
        let geometry = BlockGeometry::new(BLOCK, 512).unwrap();
        let mut handle = DeviceHandle::from_device(
            directblk_io::MemDevice::new(2 * BLOCK),
            OpenMode::Direct,
            geometry,
        );
        let err = handle.seek_to_block(BlockAddress::new(5)).unwrap_err();

        let code = session().record(&err);
        assert_eq!(code, DblkError::DblkErrOffsetMismatch);

        let (mut requested, mut applied) = (0u64, 0u64);
        assert!(unsafe { dblk_last_offset_mismatch(&mut requested, &mut applied) });
        assert_eq!(requested, 5 * BLOCK as u64);
        assert_eq!(applied, 2 * BLOCK as u64);
        assert!(requested > applied);

        // Other failures leave the last mismatch in place.
        assert_eq!(session().record(&IoError::NotOpen), DblkError::DblkErrNotOpen);
        assert!(unsafe { dblk_last_offset_mismatch(&mut requested, &mut applied) });
        assert_eq!((requested, applied), (5 * BLOCK as u64, 2 * BLOCK as u64));

        // A new session starts without diagnostics.
        let dir = tempfile::tempdir().unwrap();
        let path = image(dir.path(), 1);
        assert_eq!(unsafe { dblk_open(path.as_ptr(), false) }, DblkError::DblkOk);
        assert!(!unsafe { dblk_last_offset_mismatch(&mut requested, &mut applied) });
        assert_eq!(dblk_close(), DblkError::DblkOk);
        reset();
    }

    #[test]
    fn misaligned_geometry_maps_to_geometry_code() {
        assert_eq!(
            DblkError::from(&IoError::InvalidAlignment { alignment: 500 }),
            DblkError::DblkErrInvalidGeometry
        );
    }

    #[test]
    fn error_messages_are_terminated() {
        for code in [
            DblkError::DblkOk,
            DblkError::DblkErrOffsetMismatch,
            DblkError::DblkErrInvalidGeometry,
        ] {
            let msg = unsafe { CStr::from_ptr(dblk_error_message(code)) };
            assert!(!msg.to_str().unwrap().is_empty());
        }
    }
}
