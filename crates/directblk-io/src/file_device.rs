//! OS-backed device using `std::fs::File`.
//!
//! Files opened with [`OpenMode::Direct`] bypass the page cache: `O_DIRECT` on
//! Linux, `F_NOCACHE` on macOS. Other platforms refuse direct mode at open.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::backend::{OpenMode, RawDevice};

/// A file or block device opened read-write.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    /// Size of a block device, which cannot be positioned past its end.
    /// `None` for regular files, which grow on write.
    extent: Option<u64>,
}

impl FileDevice {
    /// Opens `path` for reading and writing. The file must already exist.
    pub fn open(path: &Path, mode: OpenMode) -> io::Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true);

        #[cfg(target_os = "linux")]
        if mode.is_direct() {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_DIRECT);
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        if mode.is_direct() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "direct I/O is not supported on this platform",
            ));
        }

        let file = opts.open(path)?;

        #[cfg(target_os = "macos")]
        if mode.is_direct() {
            disable_page_cache(&file)?;
        }

        let extent = fixed_extent(&file)?;
        Ok(Self { file, extent })
    }

    /// Returns the device size if it has a fixed extent.
    pub fn extent(&self) -> Option<u64> {
        self.extent
    }
}

impl RawDevice for FileDevice {
    fn position(&mut self, offset: u64) -> io::Result<u64> {
        let target = match self.extent {
            Some(end) if offset > end => end,
            _ => offset,
        };
        self.file.seek(SeekFrom::Start(target))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn close(self) -> io::Result<()> {
        use std::os::fd::IntoRawFd;

        // `File`'s drop discards the result of close(2); take the descriptor so
        // the failure reaches the caller.
        let fd = self.file.into_raw_fd();
        // SAFETY: `fd` came from `into_raw_fd`, so nothing else owns it and it
        // is closed exactly once.
        if unsafe { libc::close(fd) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn close(self) -> io::Result<()> {
        drop(self.file);
        Ok(())
    }
}

#[cfg(target_os = "macos")]
#[allow(unsafe_code)]
fn disable_page_cache(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor is owned by `file`, which outlives the call.
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn fixed_extent(file: &File) -> io::Result<Option<u64>> {
    use std::os::unix::fs::FileTypeExt;

    if !file.metadata()?.file_type().is_block_device() {
        return Ok(None);
    }
    // Block devices report a zero length in metadata; ask the device instead.
    let mut handle = file;
    let end = handle.seek(SeekFrom::End(0))?;
    handle.seek(SeekFrom::Start(0))?;
    Ok(Some(end))
}

#[allow(clippy::unnecessary_wraps)]
#[cfg(not(unix))]
fn fixed_extent(_file: &File) -> io::Result<Option<u64>> {
    Ok(None)
}
