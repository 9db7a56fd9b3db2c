//! Page-index-addressed façade over [`crate::file_io::FileIo`].

use crate::error::{Error, Result};
use crate::file_io::FileIo;
use crate::platform::{DefaultPlatformFile, PlatformFile};
use std::sync::Arc;

/// Translates page indices to byte offsets and exposes the common
/// operations every array variant in this crate shares. Default methods
/// (`evict_page`, `copy_page`, `copy_page_from_address`, `is_empty`,
/// `is_fully_mapped`) give sensible fallbacks so `MappedPageArray` only
/// needs to override the fast paths.
pub trait PageArray: Send + Sync {
    /// Size, in bytes, of one page. Invariant: `>= 1`.
    fn page_size(&self) -> usize;

    /// Number of whole pages currently addressable. Partial trailing bytes
    /// do not constitute a page (rounds down).
    fn page_count(&self) -> Result<u64>;

    /// Upper bound on `page_count` this array can ever reach.
    fn page_count_limit(&self) -> u64;

    /// Shrinks the array to `n` pages.
    fn truncate_page_count(&self, n: u64) -> Result<()>;

    /// Grows the array to `n` pages.
    fn expand_page_count(&self, n: u64) -> Result<()>;

    /// Reads `len` bytes of page `index` into `dst[off..off+len]`.
    fn read_page(&self, index: u64, dst: &mut [u8], off: usize, len: usize) -> Result<()>;

    /// Writes `src[off..]` to page `index`.
    fn write_page(&self, index: u64, src: &[u8], off: usize) -> Result<()>;

    /// Flushes this array to stable storage.
    fn sync(&self, metadata: bool) -> Result<()>;

    /// Records `cause` (if any) and releases all resources. Idempotent.
    fn close(&self, cause: Option<Error>) -> Result<()>;

    /// True once `close` has completed.
    fn is_closed(&self) -> bool;

    /// True if writes are rejected.
    fn is_read_only(&self) -> bool;

    /// True if `page_count() == 0`.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.page_count()? == 0)
    }

    /// Evicts page `index`, writing `buf` back. The default is a plain
    /// write; arrays that manage an internal buffer may substitute a
    /// cheaper replacement.
    fn evict_page(&self, index: u64, buf: &[u8]) -> Result<()> {
        self.write_page(index, buf, 0)
    }

    /// True only when every underlying byte range is backed by a live
    /// memory mapping (required by `direct_page_address`).
    fn is_fully_mapped(&self) -> bool {
        false
    }

    /// Raw pointer to page `index`'s first byte. Only supported when
    /// `is_fully_mapped()`; valid only while the array remains open and is
    /// not remapped.
    fn direct_page_address(&self, _index: u64) -> Result<*const u8> {
        Err(Error::Unsupported(
            "directPageAddress requires a fully-mapped array",
        ))
    }

    /// Copies page `src` to page `dst`. The default goes through a
    /// temporary buffer; fully-mapped arrays may override this with a
    /// direct-pointer memcpy.
    fn copy_page(&self, src: u64, dst: u64) -> Result<()> {
        let size = self.page_size();
        let mut buf = vec![0u8; size];
        self.read_page(src, &mut buf, 0, size)?;
        self.write_page(dst, &buf, 0)
    }

    /// Copies `page_size()` bytes from a raw address (typically another
    /// array's `direct_page_address`) into page `dst`.
    ///
    /// # Safety-adjacent contract
    /// `src` must be valid for reads of `page_size()` bytes for the
    /// duration of this call.
    fn copy_page_from_address(&self, src: *const u8, dst: u64) -> Result<()> {
        let size = self.page_size();
        let slice = unsafe { std::slice::from_raw_parts(src, size) };
        self.write_page(dst, slice, 0)
    }
}

/// The base variant: a `PageArray` that simply translates indices into
/// `FileIo` byte offsets, with no internal mapping fast path of its own
/// (that's `MappedPageArray`'s job).
pub struct BasicPageArray<F: PlatformFile = DefaultPlatformFile> {
    file: Arc<FileIo<F>>,
    page_size: usize,
}

impl<F: PlatformFile> BasicPageArray<F> {
    /// Wraps `file`, addressing it in units of `page_size` bytes.
    pub fn new(file: Arc<FileIo<F>>, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Unsupported("page size must be at least 1 byte"));
        }
        Ok(Self { file, page_size })
    }

    fn byte_offset(&self, index: u64) -> Result<u64> {
        index
            .checked_mul(self.page_size as u64)
            .ok_or_else(|| Error::Mapping("page index out of addressable range".to_string()))
    }

    /// The underlying file, for callers that need raw byte access.
    pub fn file(&self) -> &Arc<FileIo<F>> {
        &self.file
    }
}

impl<F: PlatformFile> PageArray for BasicPageArray<F> {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> Result<u64> {
        Ok(self.file.length()? / self.page_size as u64)
    }

    fn page_count_limit(&self) -> u64 {
        u64::MAX / self.page_size as u64
    }

    fn truncate_page_count(&self, n: u64) -> Result<()> {
        let len = self.byte_offset(n)?;
        self.file.truncate_length(len)
    }

    fn expand_page_count(&self, n: u64) -> Result<()> {
        let len = self.byte_offset(n)?;
        self.file.expand_length(len, self.file.default_preallocate_mode())
    }

    fn read_page(&self, index: u64, dst: &mut [u8], off: usize, len: usize) -> Result<()> {
        let pos = self.byte_offset(index)?;
        self.file.read(pos, &mut dst[off..off + len])
    }

    fn write_page(&self, index: u64, src: &[u8], off: usize) -> Result<()> {
        let pos = self.byte_offset(index)?;
        self.file.write(pos, &src[off..])
    }

    fn sync(&self, metadata: bool) -> Result<()> {
        if self.file.is_mapped() {
            // Lazily remap at sync boundaries to recognize length changes
            // made by other arrays sharing this file.
            self.file.remap()?;
        }
        self.file.sync(metadata)
    }

    fn close(&self, cause: Option<Error>) -> Result<()> {
        self.file.close(cause)
    }

    fn is_closed(&self) -> bool {
        self.file.is_closed()
    }

    fn is_read_only(&self) -> bool {
        self.file.is_read_only()
    }

    fn is_fully_mapped(&self) -> bool {
        self.file.mapped_length() >= self.file.length().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OpenOptions;
    use tempfile::tempdir;

    fn array(page_size: usize) -> (tempfile::TempDir, BasicPageArray) {
        let dir = tempdir().unwrap();
        let fio = FileIo::open(dir.path().join("data"), OpenOptions::CREATE).unwrap();
        let arr = BasicPageArray::new(Arc::new(fio), page_size).unwrap();
        (dir, arr)
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let dir = tempdir().unwrap();
        let fio = FileIo::open(dir.path().join("data"), OpenOptions::CREATE).unwrap();
        assert!(BasicPageArray::new(Arc::new(fio), 0).is_err());
    }

    /// `page_count() == floor(length / page_size)`.
    #[test]
    fn page_count_floors_partial_trailing_bytes() {
        let (_dir, arr) = array(100);
        arr.expand_page_count(3).unwrap();
        arr.file().truncate_length(250).unwrap();
        assert_eq!(arr.page_count().unwrap(), 2);
    }

    #[test]
    fn read_write_round_trip_through_page_index() {
        let (_dir, arr) = array(64);
        arr.expand_page_count(4).unwrap();
        let page = vec![9u8; 64];
        arr.write_page(2, &page, 0).unwrap();
        let mut out = vec![0u8; 64];
        arr.read_page(2, &mut out, 0, 64).unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn is_empty_true_for_fresh_array() {
        let (_dir, arr) = array(64);
        assert!(arr.is_empty().unwrap());
        arr.expand_page_count(1).unwrap();
        assert!(!arr.is_empty().unwrap());
    }

    #[test]
    fn evict_page_defaults_to_write() {
        let (_dir, arr) = array(64);
        arr.expand_page_count(1).unwrap();
        let page = vec![5u8; 64];
        arr.evict_page(0, &page).unwrap();
        let mut out = vec![0u8; 64];
        arr.read_page(0, &mut out, 0, 64).unwrap();
        assert_eq!(out, page);
    }

    #[test]
    fn direct_page_address_unsupported_when_not_fully_mapped() {
        let (_dir, arr) = array(64);
        arr.expand_page_count(1).unwrap();
        assert!(arr.direct_page_address(0).is_err());
    }

    #[test]
    fn copy_page_default_goes_through_buffer() {
        let (_dir, arr) = array(64);
        arr.expand_page_count(2).unwrap();
        let page = vec![3u8; 64];
        arr.write_page(0, &page, 0).unwrap();
        arr.copy_page(0, 1).unwrap();
        let mut out = vec![0u8; 64];
        arr.read_page(1, &mut out, 0, 64).unwrap();
        assert_eq!(out, page);
    }
}
