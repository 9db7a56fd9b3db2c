//! Preallocating a grown range must not disturb existing bytes, and any
//! byte only newly reachable because of the grow must read as zero. Holds
//! whether the platform's fast extent-allocation path is available or the
//! non-destructive zero-fill fallback runs.

use pagedio::{FileIoBuilder, OpenOptions, PreallocateMode};
use tempfile::tempdir;

#[test]
fn preexisting_bytes_survive_expand_with_preallocate_always() {
    let dir = tempdir().unwrap();
    let fio = FileIoBuilder::new()
        .options(OpenOptions::CREATE)
        .preallocate(PreallocateMode::Always)
        .open(dir.path().join("data"))
        .unwrap();

    fio.expand_length(16 * 1024, PreallocateMode::Never).unwrap();
    fio.write(0, &[0x42]).unwrap();
    fio.write(4096, &[0x42]).unwrap();
    fio.write(8192, &[0x42]).unwrap();

    fio.expand_length(64 * 1024, PreallocateMode::Always).unwrap();

    for off in [0u64, 4096, 8192] {
        let mut b = [0u8; 1];
        fio.read(off, &mut b).unwrap();
        assert_eq!(b[0], 0x42, "preexisting byte at {off} must survive preallocation");
    }
    for off in [12288u64, 16384, 32768, 65536 - 1] {
        let mut b = [0u8; 1];
        fio.read(off, &mut b).unwrap();
        assert_eq!(b[0], 0, "newly-reachable byte at {off} must read zero");
    }
}
