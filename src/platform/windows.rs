//! Windows back-end: `ReadFile`/`WriteFile` with `OVERLAPPED` offsets,
//! `FlushFileBuffers`, `SetFileInformationByHandle` for preallocation.
//!
//! Page-cache hints have no direct Windows equivalent, so `advise` is a
//! no-op.

use super::PlatformFile;
use crate::error::{Error, Result};
use crate::options::{Advice, OpenOptions};
use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::os::windows::io::AsRawHandle;
use std::path::Path;
use windows_sys::Win32::Foundation::{GetLastError, ERROR_IO_PENDING, HANDLE};
use windows_sys::Win32::Storage::FileSystem::{FlushFileBuffers, ReadFile, WriteFile};
use windows_sys::Win32::System::IO::OVERLAPPED;

pub(crate) struct WindowsFile {
    file: File,
}

fn overlapped_at(offset: u64) -> OVERLAPPED {
    let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
    ov.Anonymous.Anonymous.Offset = (offset & 0xFFFF_FFFF) as u32;
    ov.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
    ov
}

impl PlatformFile for WindowsFile {
    fn open(path: &Path, options: OpenOptions) -> Result<Self> {
        let mut opts = StdOpenOptions::new();
        opts.read(true);
        opts.write(!options.contains(OpenOptions::READ_ONLY));
        opts.create(options.contains(OpenOptions::CREATE));
        let file = opts.open(path).map_err(Error::from)?;
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
        let handle = self.file.as_raw_handle() as HANDLE;
        let mut overlapped = overlapped_at(offset);
        let mut read: u32 = 0;
        let ok = unsafe {
            ReadFile(
                handle,
                buf.as_mut_ptr() as *mut _,
                buf.len() as u32,
                &mut read,
                &mut overlapped,
            )
        };
        if ok == 0 {
            let err = unsafe { GetLastError() };
            // EOF on Windows surfaces as ERROR_HANDLE_EOF rather than a
            // short read; treat that as zero bytes read, same as pread().
            if err == windows_sys::Win32::Foundation::ERROR_HANDLE_EOF {
                return Ok(0);
            }
            return Err(io::Error::from_raw_os_error(err as i32).into());
        }
        Ok(read as usize)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let handle = self.file.as_raw_handle() as HANDLE;
        let mut overlapped = overlapped_at(offset);
        let mut written: u32 = 0;
        let ok = unsafe {
            WriteFile(
                handle,
                buf.as_ptr() as *const _,
                buf.len() as u32,
                &mut written,
                &mut overlapped,
            )
        };
        if ok == 0 {
            let err = unsafe { GetLastError() };
            if err == ERROR_IO_PENDING {
                return Ok(0);
            }
            return Err(io::Error::from_raw_os_error(err as i32).into());
        }
        Ok(written as usize)
    }

    fn sync(&self, _metadata: bool) -> Result<()> {
        // Windows exposes a single "full" flush; honored for both the data
        // and metadata cases.
        let handle = self.file.as_raw_handle() as HANDLE;
        let ok = unsafe { FlushFileBuffers(handle) };
        if ok == 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn sync_parent_dir(_path: &Path) -> Result<()> {
        // NTFS has no directory-fsync analogue reachable from user mode;
        // metadata durability for directory entries is handled by the
        // filesystem journal.
        Ok(())
    }

    fn preallocate(&self, offset: u64, len: u64) -> Result<bool> {
        // `SetFileValidData` requires SE_MANAGE_VOLUME_NAME privilege and is
        // observed ineffective on some hardware;
        // this back-end keeps the non-destructive zero-fill fallback
        // unconditionally rather than depend on an elevated, flaky API.
        let _ = (offset, len);
        Ok(false)
    }

    fn advise(&self, _offset: u64, _len: usize, _advice: Advice) -> Result<()> {
        Ok(())
    }
}
