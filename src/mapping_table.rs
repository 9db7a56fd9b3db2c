//! The ordered sequence of mappings covering a prefix of the file.

use crate::mapping::Mapping;
use std::sync::Arc;

/// Invariant: either empty, or every entry but the last is exactly
/// `mapping_size` bytes and the last is in `(0, mapping_size]`.
pub(crate) struct MappingTable {
    pub(crate) mappings: Vec<Arc<dyn Mapping>>,
    pub(crate) last_mapping_size: u64,
}

impl MappingTable {
    pub(crate) fn length_covered(&self, mapping_size: u64) -> u64 {
        match self.mappings.len() {
            0 => 0,
            n => (n as u64 - 1) * mapping_size + self.last_mapping_size,
        }
    }

    /// Locates the mapping covering `pos`, returning
    /// `(mapping index, offset within that mapping, bytes available from
    /// that offset to the end of the mapping)`, or `None` if `pos` falls
    /// outside the table (fall through to positional I/O).
    pub(crate) fn locate(
        &self,
        pos: u64,
        mapping_shift: u32,
        mapping_size: u64,
    ) -> Option<(usize, usize, usize)> {
        if self.mappings.is_empty() {
            return None;
        }
        let mi = (pos >> mapping_shift) as usize;
        let mapping = self.mappings.get(mi)?;
        let mpos = pos - (mi as u64) * mapping_size;
        let size = mapping.size() as u64;
        if mpos >= size {
            return None;
        }
        Some((mi, mpos as usize, (size - mpos) as usize))
    }
}
