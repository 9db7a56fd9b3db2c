//! Round-robin composition across N sub-arrays. Page `i` routes to stripe
//! `i mod N` at sub-index `i / N`.

use crate::error::{Error, Result};
use crate::page_array::PageArray;
use crate::worker;
use std::sync::Arc;

/// N stripes sharing a page size; page `i` maps to `stripes[i % N]` at
/// sub-index `i / N`.
pub struct StripedPageArray {
    stripes: Vec<Arc<dyn PageArray>>,
    page_size: usize,
}

impl StripedPageArray {
    /// Builds the stripe set, rejecting an empty list or mismatched page
    /// sizes.
    pub fn new(stripes: Vec<Arc<dyn PageArray>>) -> Result<Self> {
        let Some(first) = stripes.first() else {
            return Err(Error::Unsupported(
                "striped array requires at least one stripe",
            ));
        };
        let page_size = first.page_size();
        if stripes.iter().any(|s| s.page_size() != page_size) {
            return Err(Error::Unsupported(
                "all stripes in a striped array must share a page size",
            ));
        }
        Ok(Self { stripes, page_size })
    }

    fn stripe_count(&self) -> u64 {
        self.stripes.len() as u64
    }

    fn route(&self, index: u64) -> (usize, u64) {
        let n = self.stripe_count();
        ((index % n) as usize, index / n)
    }
}

impl PageArray for StripedPageArray {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> Result<u64> {
        let mut total = 0u64;
        for stripe in &self.stripes {
            total = total.saturating_add(stripe.page_count()?);
        }
        Ok(total)
    }

    fn page_count_limit(&self) -> u64 {
        let min_sub_limit = self
            .stripes
            .iter()
            .map(|s| s.page_count_limit())
            .min()
            .unwrap_or(0);
        min_sub_limit.saturating_mul(self.stripe_count())
    }

    fn truncate_page_count(&self, n: u64) -> Result<()> {
        let per_stripe = n.div_ceil(self.stripe_count());
        for stripe in &self.stripes {
            stripe.truncate_page_count(per_stripe)?;
        }
        Ok(())
    }

    fn expand_page_count(&self, n: u64) -> Result<()> {
        let per_stripe = n.div_ceil(self.stripe_count());
        for stripe in &self.stripes {
            stripe.expand_page_count(per_stripe)?;
        }
        Ok(())
    }

    fn read_page(&self, index: u64, dst: &mut [u8], off: usize, len: usize) -> Result<()> {
        let (stripe, sub) = self.route(index);
        self.stripes[stripe].read_page(sub, dst, off, len)
    }

    fn write_page(&self, index: u64, src: &[u8], off: usize) -> Result<()> {
        let (stripe, sub) = self.route(index);
        self.stripes[stripe].write_page(sub, src, off)
    }

    fn evict_page(&self, index: u64, buf: &[u8]) -> Result<()> {
        let (stripe, sub) = self.route(index);
        self.stripes[stripe].evict_page(sub, buf)
    }

    fn is_fully_mapped(&self) -> bool {
        self.stripes.iter().all(|s| s.is_fully_mapped())
    }

    fn direct_page_address(&self, index: u64) -> Result<*const u8> {
        let (stripe, sub) = self.route(index);
        self.stripes[stripe].direct_page_address(sub)
    }

    fn copy_page(&self, src: u64, dst: u64) -> Result<()> {
        let (src_stripe, src_sub) = self.route(src);
        let (dst_stripe, dst_sub) = self.route(dst);
        if src_stripe == dst_stripe {
            return self.stripes[src_stripe].copy_page(src_sub, dst_sub);
        }
        if self.stripes[src_stripe].is_fully_mapped() {
            let addr = self.stripes[src_stripe].direct_page_address(src_sub)?;
            self.stripes[dst_stripe].copy_page_from_address(addr, dst_sub)
        } else {
            let size = self.page_size;
            let mut buf = vec![0u8; size];
            self.stripes[src_stripe].read_page(src_sub, &mut buf, 0, size)?;
            self.stripes[dst_stripe].write_page(dst_sub, &buf, 0)
        }
    }

    /// Fans out to `N-1` worker tasks and syncs the last stripe in place,
    /// joining all and rethrowing the first error with the others
    /// suppressed.
    fn sync(&self, metadata: bool) -> Result<()> {
        let Some((last, rest)) = self.stripes.split_last() else {
            return Ok(());
        };
        let handles: Vec<_> = rest
            .iter()
            .cloned()
            .map(|s| worker::submit(move || s.sync(metadata)))
            .collect();
        let last_result = last.sync(metadata);
        let mut results: Vec<Result<()>> = handles.into_iter().map(|h| h.join()).collect();
        results.push(last_result);
        Error::join(results)
    }

    fn close(&self, cause: Option<Error>) -> Result<()> {
        Error::join(self.stripes.iter().map(|s| s.close(cause.clone())))
    }

    fn is_closed(&self) -> bool {
        self.stripes.iter().all(|s| s.is_closed())
    }

    fn is_read_only(&self) -> bool {
        self.stripes.iter().any(|s| s.is_read_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapped_page_array::MappedPageArray;

    fn stripes(n: usize, per_stripe: u64) -> StripedPageArray {
        let stripes = (0..n)
            .map(|_| Arc::new(MappedPageArray::create_anonymous(8, per_stripe).unwrap()) as Arc<dyn PageArray>)
            .collect();
        StripedPageArray::new(stripes).unwrap()
    }

    /// N=3, page 3 routes to stripe 0 sub-index 1.
    #[test]
    fn round_robin_routing() {
        let arr = stripes(3, 4);
        arr.write_page(0, &[b'A'; 8], 0).unwrap();
        arr.write_page(1, &[b'B'; 8], 0).unwrap();
        arr.write_page(2, &[b'C'; 8], 0).unwrap();
        arr.write_page(3, &[b'D'; 8], 0).unwrap();

        let mut buf = [0u8; 8];
        arr.read_page(3, &mut buf, 0, 8).unwrap();
        assert_eq!(buf, [b'D'; 8]);
        assert_eq!(arr.route(3), (0, 1));
    }

    #[test]
    fn page_count_sums_across_stripes() {
        let arr = stripes(3, 4);
        assert_eq!(arr.page_count().unwrap(), 12);
    }

    #[test]
    fn rejects_empty_stripe_set() {
        assert!(StripedPageArray::new(Vec::new()).is_err());
    }

    #[test]
    fn rejects_mismatched_page_sizes() {
        let a: Arc<dyn PageArray> = Arc::new(MappedPageArray::create_anonymous(8, 4).unwrap());
        let b: Arc<dyn PageArray> = Arc::new(MappedPageArray::create_anonymous(16, 4).unwrap());
        assert!(StripedPageArray::new(vec![a, b]).is_err());
    }

    #[test]
    fn sync_fans_out_across_stripes() {
        let arr = stripes(4, 4);
        for i in 0..4 {
            arr.write_page(i, &[i as u8; 8], 0).unwrap();
        }
        arr.sync(true).unwrap();
    }

    #[test]
    fn last_write_to_each_index_wins_under_permuted_writes() {
        let arr = stripes(3, 4);
        for i in 0..9u64 {
            arr.write_page(i, &[i as u8; 8], 0).unwrap();
        }
        for i in (0..9u64).rev() {
            arr.write_page(i, &[(i + 100) as u8; 8], 0).unwrap();
        }
        for i in 0..9u64 {
            let mut buf = [0u8; 8];
            arr.read_page(i, &mut buf, 0, 8).unwrap();
            assert_eq!(buf, [(i + 100) as u8; 8]);
        }
    }
}
