//! POSIX back-end: `pread`/`pwrite`, `posix_fallocate`, `madvise`, `fsync`/`fdatasync`.

use super::PlatformFile;
use crate::error::{Error, Result};
use crate::options::{Advice, OpenOptions};
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

pub(crate) struct PosixFile {
    file: File,
}

impl PosixFile {
    /// Retries a syscall closure across `EINTR` (common pitfall on some
    /// platforms where interrupting a thread closes the
    /// channel)". On POSIX `pread`/`pwrite` simply return `EINTR`; no reopen
    /// is needed, just a retry.
    fn retry_eintr<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        loop {
            match f() {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    tracing::trace!("retrying syscall after EINTR");
                    continue;
                }
                other => return other,
            }
        }
    }
}

impl PlatformFile for PosixFile {
    fn open(path: &Path, options: OpenOptions) -> Result<Self> {
        let mut opts = StdOpenOptions::new();
        opts.read(true);
        opts.write(!options.contains(OpenOptions::READ_ONLY));
        opts.create(options.contains(OpenOptions::CREATE));

        let mut flags = 0;
        if options.contains(OpenOptions::SYNC_IO) {
            flags |= libc::O_DSYNC;
        }
        #[cfg(target_os = "linux")]
        if options.contains(OpenOptions::DIRECT_IO) {
            flags |= libc::O_DIRECT;
        }
        if flags != 0 {
            opts.custom_flags(flags);
        }

        let file = opts.open(path).map_err(Error::from)?;

        if options.contains(OpenOptions::RANDOM_ACCESS) {
            let len = file.metadata().map(|m| m.len()).unwrap_or(0);
            let _ = advise_raw(&file, 0, len as usize, Advice::Random);
        }

        Ok(Self { file })
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            file: self.file.try_clone().map_err(Error::from)?,
        })
    }

    fn file(&self) -> &File {
        &self.file
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata().map_err(Error::from)?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.file.set_len(len).map_err(Error::from)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let fd = self.file.as_raw_fd();
        let n = Self::retry_eintr(|| {
            let r = unsafe {
                libc::pread(
                    fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    offset as libc::off_t,
                )
            };
            if r < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(r as usize)
            }
        })
        .map_err(Error::from)?;
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let fd = self.file.as_raw_fd();
        let n = Self::retry_eintr(|| {
            let r = unsafe {
                libc::pwrite(
                    fd,
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    offset as libc::off_t,
                )
            };
            if r < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(r as usize)
            }
        })
        .map_err(Error::from)?;
        Ok(n)
    }

    fn sync(&self, metadata: bool) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let r = unsafe {
            if metadata {
                libc::fsync(fd)
            } else {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    libc::fdatasync(fd)
                }
                #[cfg(not(any(target_os = "linux", target_os = "android")))]
                {
                    libc::fsync(fd)
                }
            }
        };
        if r != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn sync_parent_dir(path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        // Best-effort: a directory that can't be opened (e.g. permissions)
        // must not fail the caller's create().
        let Ok(dir) = File::open(parent) else {
            return Ok(());
        };
        let _ = unsafe { libc::fsync(dir.as_raw_fd()) };
        Ok(())
    }

    fn preallocate(&self, offset: u64, len: u64) -> Result<bool> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let fd = self.file.as_raw_fd();
            let r =
                unsafe { libc::posix_fallocate(fd, offset as libc::off_t, len as libc::off_t) };
            if r == 0 {
                return Ok(true);
            }
            if r == libc::EOPNOTSUPP || r == libc::EINVAL {
                return Ok(false);
            }
            return Err(io::Error::from_raw_os_error(r).into());
        }
        #[cfg(target_os = "macos")]
        {
            let fd = self.file.as_raw_fd();
            let mut fstore = libc::fstore_t {
                fst_flags: libc::F_ALLOCATECONTIG,
                fst_posmode: libc::F_PEOFPOSMODE,
                fst_offset: offset as libc::off_t,
                fst_length: len as libc::off_t,
                fst_bytesalloc: 0,
            };
            let r = unsafe { libc::fcntl(fd, libc::F_PREALLOCATE, &mut fstore) };
            if r != 0 {
                fstore.fst_flags = libc::F_ALLOCATEALL;
                let r2 = unsafe { libc::fcntl(fd, libc::F_PREALLOCATE, &mut fstore) };
                if r2 != 0 {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        #[cfg(not(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos"
        )))]
        {
            let _ = (offset, len);
            Ok(false)
        }
    }

    fn advise(&self, offset: u64, len: usize, advice: Advice) -> Result<()> {
        advise_raw(&self.file, offset, len, advice)
    }
}

fn advise_raw(file: &File, offset: u64, len: usize, advice: Advice) -> Result<()> {
    let fd = file.as_raw_fd();
    let flag = match advice {
        Advice::WillNeed => libc::POSIX_FADV_WILLNEED,
        Advice::Random => libc::POSIX_FADV_RANDOM,
        Advice::DontNeed => libc::POSIX_FADV_DONTNEED,
    };
    // Ignored when unsupported: posix_fadvise returns an errno
    // rather than setting one; a nonzero result here is not fatal.
    let _ = unsafe { libc::posix_fadvise(fd, offset as libc::off_t, len as libc::off_t, flag) };
    Ok(())
}
