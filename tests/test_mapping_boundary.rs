//! A write straddling a mapping-table boundary must read back as
//! contiguous bytes, split transparently across two mappings.

use pagedio::{FileIoBuilder, OpenOptions, PreallocateMode};
use tempfile::tempdir;

#[test]
fn write_spanning_two_mappings_reads_back_contiguous() {
    let dir = tempdir().unwrap();
    let fio = FileIoBuilder::new()
        .options(OpenOptions::CREATE | OpenOptions::MAPPED)
        .mapping_size(16)
        .open(dir.path().join("data"))
        .unwrap();

    fio.expand_length(40, PreallocateMode::Never).unwrap();
    fio.remap().unwrap();

    fio.write(14, &[0xAA; 8]).unwrap();

    let mut buf = [0u8; 8];
    fio.read(14, &mut buf).unwrap();
    assert_eq!(buf, [0xAA; 8]);
}

#[test]
fn write_spanning_three_mappings() {
    let dir = tempdir().unwrap();
    let fio = FileIoBuilder::new()
        .options(OpenOptions::CREATE | OpenOptions::MAPPED)
        .mapping_size(16)
        .open(dir.path().join("data"))
        .unwrap();

    fio.expand_length(48, PreallocateMode::Never).unwrap();
    fio.remap().unwrap();

    let payload: Vec<u8> = (0..40u8).collect();
    fio.write(4, &payload).unwrap();

    let mut buf = vec![0u8; 40];
    fio.read(4, &mut buf).unwrap();
    assert_eq!(buf, payload);
}
