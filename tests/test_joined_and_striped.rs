//! Joined and striped composition routing, via the public API only (no
//! crate-internal access).

use pagedio::{BasicPageArray, FileIo, JoinedPageArray, OpenOptions, PageArray, StripedPageArray};
use std::sync::Arc;
use tempfile::tempdir;

fn basic_array(dir: &tempfile::TempDir, name: &str, page_size: usize) -> Arc<dyn PageArray> {
    let fio = FileIo::open(dir.path().join(name), OpenOptions::CREATE).unwrap();
    Arc::new(BasicPageArray::new(Arc::new(fio), page_size).unwrap())
}

#[test]
fn joined_array_routes_around_join_index() {
    let dir = tempdir().unwrap();
    let page_size = 4096;
    let a = basic_array(&dir, "a", page_size);
    a.expand_page_count(1000).unwrap();
    let b = basic_array(&dir, "b", page_size);
    b.expand_page_count(1001).unwrap();

    let joined = JoinedPageArray::new(a, 1000, b).unwrap();

    let x = vec![1u8; page_size];
    let y = vec![2u8; page_size];
    let z = vec![3u8; page_size];
    joined.write_page(999, &x, 0).unwrap();
    joined.write_page(1000, &y, 0).unwrap();
    joined.write_page(2000, &z, 0).unwrap();

    let mut buf = vec![0u8; page_size];
    joined.read_page(999, &mut buf, 0, page_size).unwrap();
    assert_eq!(buf, x);
    joined.read_page(1000, &mut buf, 0, page_size).unwrap();
    assert_eq!(buf, y);
    joined.read_page(2000, &mut buf, 0, page_size).unwrap();
    assert_eq!(buf, z);

    assert_eq!(joined.page_count().unwrap(), 1000 + 1001);
}

#[test]
fn striped_array_round_robins_across_stripes() {
    let dir = tempdir().unwrap();
    let page_size = 4096;
    let stripes: Vec<Arc<dyn PageArray>> = (0..3)
        .map(|i| {
            let arr = basic_array(&dir, &format!("stripe{i}"), page_size);
            arr.expand_page_count(4).unwrap();
            arr
        })
        .collect();
    let striped = StripedPageArray::new(stripes).unwrap();

    let a = vec![b'A'; page_size];
    let b = vec![b'B'; page_size];
    let c = vec![b'C'; page_size];
    let d = vec![b'D'; page_size];
    striped.write_page(0, &a, 0).unwrap();
    striped.write_page(1, &b, 0).unwrap();
    striped.write_page(2, &c, 0).unwrap();
    striped.write_page(3, &d, 0).unwrap();

    let mut buf = vec![0u8; page_size];
    striped.read_page(3, &mut buf, 0, page_size).unwrap();
    assert_eq!(buf, d);
}
