//! A single contiguous memory view of a file region.
//!
//! `Mapping` is the capability set the source's abstract `Mapping` class
//! reduces to: read bytes at an offset, write bytes at an offset, sync,
//! close. A "direct" variant — reading/writing via a raw memory address
//! instead of a managed buffer — is expressed here as
//! the `read_direct`/`write_direct` methods rather than a second type, since
//! every mapping this crate creates is capable of handing out its base
//! pointer (`MappedPageArray` and `copy_page_from_address` are the only
//! direct-pointer consumers).

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::cell::UnsafeCell;
use std::fs::File;

/// A contiguous mapped region of size `<= MAPPING_SIZE`.
///
/// `read`/`write` are in-process memcpy and never fail on their own; the
/// caller (`FileIo`) is responsible for keeping `start + len <= size`.
pub trait Mapping: Send + Sync {
    /// Size in bytes of this mapping.
    fn size(&self) -> usize;

    /// Whether this mapping was opened read-only.
    fn read_only(&self) -> bool;

    /// Copies `len` bytes beginning at `start` into `dst[off..off+len]`.
    fn read(&self, start: usize, dst: &mut [u8], off: usize, len: usize);

    /// Copies `len` bytes from `src[off..off+len]` to `start` in this mapping.
    /// Fails with [`Error::Permission`] if the mapping is read-only.
    fn write(&self, start: usize, src: &[u8], off: usize, len: usize) -> Result<()>;

    /// Copies `len` bytes beginning at `start` directly to `dst`, a raw
    /// pointer owned by the caller. Valid only for the lifetime of the call.
    ///
    /// # Safety
    /// `dst` must be valid for writes of `len` bytes.
    unsafe fn read_direct(&self, start: usize, dst: *mut u8, len: usize);

    /// Copies `len` bytes from `src`, a raw pointer owned by the caller,
    /// directly to `start` in this mapping.
    ///
    /// # Safety
    /// `src` must be valid for reads of `len` bytes.
    unsafe fn write_direct(&self, start: usize, src: *const u8, len: usize) -> Result<()>;

    /// Durably flushes the mapped range. `metadata` requests that any
    /// file-level metadata implied by dirty pages also be flushed, on
    /// platforms that distinguish the two.
    fn sync(&self, metadata: bool) -> Result<()>;

    /// Flushes and marks this mapping as discarded. The actual OS region
    /// release (`munmap` / `UnmapViewOfFile`) happens when the last
    /// reference-counted handle to this mapping is dropped — `memmap2`'s own
    /// `Drop` impl does the unmap, so the mapping table only needs to drop
    /// its `Arc` once every concurrent reader that observed the old table
    /// has released its shared lock (guaranteed by remap's swap-then-close
    /// ordering).
    fn close(&self) -> Result<()>;

    /// Base address of the mapped region. Valid only while the mapping is
    /// open and has not been closed; callers holding this pointer across a
    /// remap do so at their own risk.
    fn as_ptr(&self) -> *const u8;

    /// Mutable base address. Fails with [`Error::Permission`] for read-only
    /// mappings.
    fn as_mut_ptr(&self) -> Result<*mut u8>;
}

/// `memmap2`-backed mapping, used for both file-backed and anonymous
/// (scratch / `MappedPageArray` non-file-backed) regions.
pub(crate) enum MmapMapping {
    ReadWrite { mmap: UnsafeCell<MmapMut> },
    ReadOnly { mmap: Mmap },
}

// SAFETY: callers only ever touch disjoint byte ranges concurrently; the
// pointer itself never moves or is deallocated except by `close`, which
// takes ownership.
unsafe impl Sync for MmapMapping {}

impl MmapMapping {
    pub(crate) fn open_file(file: &File, offset: u64, len: usize, read_only: bool) -> Result<Self> {
        if read_only {
            let mmap = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(len)
                    .map(file)
                    .map_err(|e| Error::Mapping(e.to_string()))?
            };
            Ok(MmapMapping::ReadOnly { mmap })
        } else {
            let mmap = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(len)
                    .map_mut(file)
                    .map_err(|e| Error::Mapping(e.to_string()))?
            };
            Ok(MmapMapping::ReadWrite {
                mmap: UnsafeCell::new(mmap),
            })
        }
    }

    /// Anonymous `MAP_SHARED | MAP_ANONYMOUS` region, used by
    /// `MappedPageArray` when it is not file-backed.
    pub(crate) fn anonymous(len: usize) -> Result<Self> {
        let mmap = MmapOptions::new()
            .len(len)
            .map_anon()
            .map_err(|e| Error::Mapping(e.to_string()))?;
        Ok(MmapMapping::ReadWrite {
            mmap: UnsafeCell::new(mmap),
        })
    }

    fn base_ptr(&self) -> *const u8 {
        match self {
            MmapMapping::ReadWrite { mmap } => unsafe { (*mmap.get()).as_ptr() },
            MmapMapping::ReadOnly { mmap } => mmap.as_ptr(),
        }
    }
}

impl Mapping for MmapMapping {
    fn size(&self) -> usize {
        match self {
            MmapMapping::ReadWrite { mmap } => unsafe { (*mmap.get()).len() },
            MmapMapping::ReadOnly { mmap } => mmap.len(),
        }
    }

    fn read_only(&self) -> bool {
        matches!(self, MmapMapping::ReadOnly { .. })
    }

    fn read(&self, start: usize, dst: &mut [u8], off: usize, len: usize) {
        let base = self.base_ptr();
        unsafe {
            std::ptr::copy_nonoverlapping(base.add(start), dst.as_mut_ptr().add(off), len);
        }
    }

    fn write(&self, start: usize, src: &[u8], off: usize, len: usize) -> Result<()> {
        let ptr = self.as_mut_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr().add(off), ptr.add(start), len);
        }
        Ok(())
    }

    unsafe fn read_direct(&self, start: usize, dst: *mut u8, len: usize) {
        let base = self.base_ptr();
        unsafe { std::ptr::copy_nonoverlapping(base.add(start), dst, len) };
    }

    unsafe fn write_direct(&self, start: usize, src: *const u8, len: usize) -> Result<()> {
        let ptr = self.as_mut_ptr()?;
        unsafe { std::ptr::copy_nonoverlapping(src, ptr.add(start), len) };
        Ok(())
    }

    fn sync(&self, metadata: bool) -> Result<()> {
        match self {
            MmapMapping::ReadWrite { mmap } => {
                let mmap = unsafe { &*mmap.get() };
                if metadata {
                    mmap.flush().map_err(Error::from)
                } else {
                    mmap.flush_async().map_err(Error::from)
                }
            }
            MmapMapping::ReadOnly { .. } => Ok(()),
        }
    }

    fn close(&self) -> Result<()> {
        self.sync(false)
    }

    fn as_ptr(&self) -> *const u8 {
        self.base_ptr()
    }

    fn as_mut_ptr(&self) -> Result<*mut u8> {
        match self {
            MmapMapping::ReadWrite { mmap } => Ok(unsafe { (*mmap.get()).as_mut_ptr() }),
            MmapMapping::ReadOnly { .. } => {
                Err(Error::Permission("mapping is read-only".to_string()))
            }
        }
    }
}
