//! Property tests for mapping-boundary splitting and preallocation
//! non-destructiveness.

use pagedio::{FileIoBuilder, OpenOptions, PreallocateMode};
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    /// Any write fitting within a small, fixed-size file round-trips
    /// exactly, regardless of where it lands relative to 16-byte mapping
    /// boundaries.
    #[test]
    fn write_read_round_trips_across_mapping_boundaries(
        pos in 0u64..48,
        len in 1usize..16,
        byte in any::<u8>(),
    ) {
        prop_assume!(pos + len as u64 <= 64);
        let dir = tempdir().unwrap();
        let fio = FileIoBuilder::new()
            .options(OpenOptions::CREATE | OpenOptions::MAPPED)
            .mapping_size(16)
            .open(dir.path().join("data"))
            .unwrap();
        fio.expand_length(64, PreallocateMode::Never).unwrap();
        fio.remap().unwrap();

        let payload = vec![byte; len];
        fio.write(pos, &payload).unwrap();
        let mut out = vec![0u8; len];
        fio.read(pos, &mut out).unwrap();
        prop_assert_eq!(out, payload);
    }

    /// Preallocating past an existing range never disturbs bytes already
    /// written below the old length.
    #[test]
    fn preallocate_never_disturbs_bytes_below_old_length(
        old_len in 16u64..256,
        extra in 16u64..256,
        marker_offset in 0u64..16,
    ) {
        let marker_pos = (old_len.saturating_sub(16)) + marker_offset;
        prop_assume!(marker_pos < old_len);
        let dir = tempdir().unwrap();
        let fio = FileIoBuilder::new()
            .options(OpenOptions::CREATE)
            .open(dir.path().join("data"))
            .unwrap();
        fio.expand_length(old_len, PreallocateMode::Never).unwrap();
        fio.write(marker_pos, &[0x7E]).unwrap();

        fio.expand_length(old_len + extra, PreallocateMode::Always).unwrap();

        let mut b = [0u8; 1];
        fio.read(marker_pos, &mut b).unwrap();
        prop_assert_eq!(b[0], 0x7E);
    }
}
