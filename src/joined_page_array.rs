//! Sequential composition: pages `[0, J)` route to `A`, pages `[J, ∞)` route
//! to `B` at offset `i - J`.

use crate::error::{Error, Result};
use crate::page_array::PageArray;
use crate::worker;
use std::sync::Arc;

/// `(A, joinIndex, B)`. Construction requires `A.page_count() <= J`.
pub struct JoinedPageArray {
    a: Arc<dyn PageArray>,
    join_index: u64,
    b: Arc<dyn PageArray>,
}

impl JoinedPageArray {
    /// Builds the join, rejecting `A` if it already extends past `join_index`.
    pub fn new(a: Arc<dyn PageArray>, join_index: u64, b: Arc<dyn PageArray>) -> Result<Self> {
        let a_count = a.page_count()?;
        if a_count > join_index {
            return Err(Error::Unsupported(
                "A.pageCount() must not exceed the join index",
            ));
        }
        Ok(Self { a, join_index, b })
    }

    fn route(&self, index: u64) -> (bool, u64) {
        if index < self.join_index {
            (true, index)
        } else {
            (false, index - self.join_index)
        }
    }

    fn side(&self, is_a: bool) -> &Arc<dyn PageArray> {
        if is_a {
            &self.a
        } else {
            &self.b
        }
    }
}

impl PageArray for JoinedPageArray {
    fn page_size(&self) -> usize {
        self.a.page_size()
    }

    fn page_count(&self) -> Result<u64> {
        Ok(self.join_index + self.b.page_count()?)
    }

    fn page_count_limit(&self) -> u64 {
        let a_limit = self.a.page_count_limit();
        if a_limit > self.join_index {
            a_limit
        } else {
            self.join_index.saturating_add(self.b.page_count_limit())
        }
    }

    fn truncate_page_count(&self, n: u64) -> Result<()> {
        if n >= self.join_index {
            self.b.truncate_page_count(n - self.join_index)
        } else {
            self.b.truncate_page_count(0)?;
            self.a.truncate_page_count(n)
        }
    }

    fn expand_page_count(&self, n: u64) -> Result<()> {
        if n <= self.join_index {
            return Ok(());
        }
        self.b.expand_page_count(n - self.join_index)
    }

    fn read_page(&self, index: u64, dst: &mut [u8], off: usize, len: usize) -> Result<()> {
        let (is_a, idx) = self.route(index);
        self.side(is_a).read_page(idx, dst, off, len)
    }

    fn write_page(&self, index: u64, src: &[u8], off: usize) -> Result<()> {
        let (is_a, idx) = self.route(index);
        self.side(is_a).write_page(idx, src, off)
    }

    fn evict_page(&self, index: u64, buf: &[u8]) -> Result<()> {
        let (is_a, idx) = self.route(index);
        self.side(is_a).evict_page(idx, buf)
    }

    fn is_fully_mapped(&self) -> bool {
        self.a.is_fully_mapped() && self.b.is_fully_mapped()
    }

    fn direct_page_address(&self, index: u64) -> Result<*const u8> {
        let (is_a, idx) = self.route(index);
        self.side(is_a).direct_page_address(idx)
    }

    /// Uses each side's `direct_page_address` when the copy crosses from
    /// one side to the other and both are fully mapped; falls
    /// back to a buffered copy otherwise.
    fn copy_page(&self, src: u64, dst: u64) -> Result<()> {
        let (src_is_a, src_idx) = self.route(src);
        let (dst_is_a, dst_idx) = self.route(dst);
        if src_is_a == dst_is_a {
            return self.side(src_is_a).copy_page(src_idx, dst_idx);
        }
        let src_side = self.side(src_is_a);
        let dst_side = self.side(dst_is_a);
        if src_side.is_fully_mapped() {
            let addr = src_side.direct_page_address(src_idx)?;
            dst_side.copy_page_from_address(addr, dst_idx)
        } else {
            let size = self.page_size();
            let mut buf = vec![0u8; size];
            src_side.read_page(src_idx, &mut buf, 0, size)?;
            dst_side.write_page(dst_idx, &buf, 0)
        }
    }

    /// Submits `A`'s sync to a worker and runs `B`'s on the caller, joining
    /// and merging errors.
    fn sync(&self, metadata: bool) -> Result<()> {
        let a = self.a.clone();
        let handle = worker::submit(move || a.sync(metadata));
        let b_result = self.b.sync(metadata);
        let a_result = handle.join();
        Error::join([a_result, b_result])
    }

    fn close(&self, cause: Option<Error>) -> Result<()> {
        let a_result = self.a.close(cause.clone());
        let b_result = self.b.close(cause);
        Error::join([a_result, b_result])
    }

    fn is_closed(&self) -> bool {
        self.a.is_closed() && self.b.is_closed()
    }

    fn is_read_only(&self) -> bool {
        self.a.is_read_only() || self.b.is_read_only()
    }
}
