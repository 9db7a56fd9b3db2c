//! Fully-mapped, fixed-capacity page array.
//!
//! The entire file (or an anonymous `MAP_SHARED | MAP_ANONYMOUS` region) is
//! mapped once at construction; reads and writes are plain memcpy against
//! `base_ptr + index * page_size`.

use crate::error::{Error, Result};
use crate::mapping::{Mapping, MmapMapping};
use crate::page_array::PageArray;
use crate::platform::{DefaultPlatformFile, PlatformFile};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// A fixed-capacity array backed by one mapping spanning its whole extent.
pub struct MappedPageArray<F: PlatformFile = DefaultPlatformFile> {
    mapping: MmapMapping,
    /// `Some` when file-backed, for the descriptor-level metadata sync a
    /// pure `msync` cannot provide.
    backing: Option<F>,
    page_size: usize,
    page_count: u64,
    /// CAS'd to null on close to prevent use-after-close.
    ptr: AtomicPtr<u8>,
    read_only: bool,
    /// True until the first write or sync, for anonymous (non-file-backed)
    /// instances.
    unwritten: AtomicBool,
    closed: AtomicBool,
    close_cause: Mutex<Option<Error>>,
}

impl<F: PlatformFile> MappedPageArray<F> {
    /// Maps the whole of `file`, resized to exactly `page_count * page_size`
    /// bytes.
    pub fn create_file_backed(
        file: F,
        page_size: usize,
        page_count: u64,
        read_only: bool,
    ) -> Result<Self> {
        let len = (page_count as usize)
            .checked_mul(page_size)
            .ok_or_else(|| Error::Mapping("mapped array capacity overflows usize".to_string()))?;
        if !read_only {
            file.set_len(len as u64)?;
        }
        let mapping = MmapMapping::open_file(file.file(), 0, len, read_only)?;
        let ptr = mapping.as_ptr() as *mut u8;
        Ok(Self {
            mapping,
            backing: Some(file),
            page_size,
            page_count,
            ptr: AtomicPtr::new(ptr),
            read_only,
            unwritten: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_cause: Mutex::new(None),
        })
    }

    /// Maps an anonymous, non-file-backed region (`MAP_SHARED |
    /// MAP_ANONYMOUS`). Marked unwritten until the first explicit write or
    /// sync.
    pub fn create_anonymous(page_size: usize, page_count: u64) -> Result<Self> {
        let len = (page_count as usize)
            .checked_mul(page_size)
            .ok_or_else(|| Error::Mapping("mapped array capacity overflows usize".to_string()))?;
        let mapping = MmapMapping::anonymous(len)?;
        let ptr = mapping.as_ptr() as *mut u8;
        Ok(Self {
            mapping,
            backing: None,
            page_size,
            page_count,
            ptr: AtomicPtr::new(ptr),
            read_only: false,
            unwritten: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_cause: Mutex::new(None),
        })
    }

    fn live_ptr(&self) -> Result<*mut u8> {
        let p = self.ptr.load(Ordering::Acquire);
        if p.is_null() {
            return Err(Error::closed(self.close_cause.lock().clone()));
        }
        Ok(p)
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.page_count {
            Err(Error::Full)
        } else {
            Ok(())
        }
    }

    /// True if this instance has never been written to or synced (only
    /// meaningful for anonymous instances; always `false` once file-backed
    /// content is read back).
    pub fn is_unwritten(&self) -> bool {
        self.unwritten.load(Ordering::Acquire)
    }
}

impl<F: PlatformFile> PageArray for MappedPageArray<F> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> Result<u64> {
        Ok(self.page_count)
    }

    fn page_count_limit(&self) -> u64 {
        self.page_count
    }

    fn truncate_page_count(&self, n: u64) -> Result<()> {
        if n == self.page_count {
            Ok(())
        } else {
            Err(Error::Unsupported(
                "a fully-mapped fixed-capacity array cannot change its page count",
            ))
        }
    }

    fn expand_page_count(&self, n: u64) -> Result<()> {
        self.truncate_page_count(n)
    }

    fn read_page(&self, index: u64, dst: &mut [u8], off: usize, len: usize) -> Result<()> {
        self.check_index(index)?;
        let ptr = self.live_ptr()?;
        let start = index as usize * self.page_size;
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(start), dst.as_mut_ptr().add(off), len);
        }
        Ok(())
    }

    fn write_page(&self, index: u64, src: &[u8], off: usize) -> Result<()> {
        // `i >= page_count` fails with `Full`, not a generic
        // out-of-range error.
        self.check_index(index)?;
        if self.read_only {
            return Err(Error::write_failure(
                index * self.page_size as u64,
                true,
                "mapped array is read-only",
            ));
        }
        let ptr = self.live_ptr()?;
        let start = index as usize * self.page_size;
        let len = src.len() - off;
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr().add(off), ptr.add(start), len);
        }
        self.unwritten.store(false, Ordering::Release);
        Ok(())
    }

    fn sync(&self, metadata: bool) -> Result<()> {
        self.live_ptr()?;
        self.mapping.sync(false)?;
        self.unwritten.store(false, Ordering::Release);
        if metadata {
            if let Some(backing) = &self.backing {
                backing.sync(true)?;
            }
        }
        Ok(())
    }

    fn close(&self, cause: Option<Error>) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(cause) = cause {
            *self.close_cause.lock() = Some(cause);
        }
        let current = self.ptr.load(Ordering::Acquire);
        // Clear the pointer before releasing the mapping so any racing
        // accessor observes either the live pointer (and completes before
        // `mapping.close()` runs, since `close` only executes after this
        // CAS) or the null sentinel, never a dangling one.
        let _ = self.ptr.compare_exchange(
            current,
            std::ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.mapping.close()
    }

    fn is_closed(&self) -> bool {
        self.ptr.load(Ordering::Acquire).is_null()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn is_fully_mapped(&self) -> bool {
        true
    }

    fn direct_page_address(&self, index: u64) -> Result<*const u8> {
        self.check_index(index)?;
        let ptr = self.live_ptr()?;
        Ok(unsafe { ptr.add(index as usize * self.page_size) } as *const u8)
    }

    fn copy_page(&self, src: u64, dst: u64) -> Result<()> {
        self.check_index(src)?;
        self.check_index(dst)?;
        let ptr = self.live_ptr()?;
        unsafe {
            let src_ptr = ptr.add(src as usize * self.page_size);
            let dst_ptr = ptr.add(dst as usize * self.page_size);
            // `copy` (not `copy_nonoverlapping`): src == dst is a valid
            // no-op call site callers may hit.
            std::ptr::copy(src_ptr, dst_ptr, self.page_size);
        }
        self.unwritten.store(false, Ordering::Release);
        Ok(())
    }

    fn copy_page_from_address(&self, src: *const u8, dst: u64) -> Result<()> {
        self.check_index(dst)?;
        let ptr = self.live_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(src, ptr.add(dst as usize * self.page_size), self.page_size);
        }
        self.unwritten.store(false, Ordering::Release);
        Ok(())
    }
}

// SAFETY: the raw pointer is only ever dereferenced through bounds-checked
// offsets within the mapping's own extent, and concurrent memcpy on
// disjoint page ranges is the documented contract.
unsafe impl<F: PlatformFile> Send for MappedPageArray<F> {}
unsafe impl<F: PlatformFile> Sync for MappedPageArray<F> {}
