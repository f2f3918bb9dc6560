use std::collections::BTreeMap;
use std::sync::Arc;

use ferrodb::buffer::BufferPoolManager;
use ferrodb::common::Rid;
use ferrodb::index::{BTreeIndex, IxScan};
use ferrodb::storage::DiskManager;
use ferrodb::tuple::{ColType, Value};

fn int_key(v: i32) -> Vec<u8> {
    Value::Int(v).to_bytes(4).unwrap()
}

fn open_index(order: usize) -> (Arc<BTreeIndex>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ix");
    let dm = Arc::new(DiskManager::new());
    BTreeIndex::create(&dm, &path, vec![ColType::Int], vec![4], Some(order)).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(256, 2, dm));
    (Arc::new(BTreeIndex::open(bpm, &path).unwrap()), dir)
}

fn full_scan(ix: &Arc<BTreeIndex>) -> Vec<u32> {
    let start = ix.leaf_begin().unwrap();
    let end = ix.leaf_end().unwrap();
    let mut scan = IxScan::new(ix.clone(), start, end);
    let mut out = Vec::new();
    while !scan.is_end() {
        out.push(scan.rid().unwrap().page_no);
        scan.next().unwrap();
    }
    out
}

#[test]
fn test_order3_insert_1_to_20_both_directions() {
    let (fwd, _d1) = open_index(3);
    let (rev, _d2) = open_index(3);

    for v in 1..=20 {
        assert!(fwd.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap());
    }
    for v in (1..=20).rev() {
        assert!(rev.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap());
    }

    for v in 1..=20 {
        let expect = Some(Rid::new(v as u32, 0));
        assert_eq!(fwd.get_value(&int_key(v)).unwrap(), expect);
        assert_eq!(rev.get_value(&int_key(v)).unwrap(), expect);
    }
    assert_eq!(full_scan(&fwd), (1..=20).collect::<Vec<u32>>());
    assert_eq!(full_scan(&rev), (1..=20).collect::<Vec<u32>>());
}

#[test]
fn test_mixed_workload_against_oracle() {
    let (ix, _dir) = open_index(4);
    let mut oracle: BTreeMap<i32, Rid> = BTreeMap::new();

    // Deterministic pseudo-random operation stream
    let mut state: u64 = 0x5EED;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as i32
    };

    for round in 0..500 {
        let v = next().rem_euclid(120);
        if round % 3 == 2 {
            let expect = oracle.remove(&v).is_some();
            assert_eq!(ix.delete_entry(&int_key(v)).unwrap(), expect);
        } else {
            let rid = Rid::new(v as u32, round as u32);
            let expect = !oracle.contains_key(&v);
            assert_eq!(ix.insert_entry(&int_key(v), rid).unwrap(), expect);
            oracle.entry(v).or_insert(rid);
        }
    }

    for (v, rid) in &oracle {
        assert_eq!(ix.get_value(&int_key(*v)).unwrap(), Some(*rid));
    }
    let keys: Vec<u32> = oracle.keys().map(|&v| v as u32).collect();
    let scanned: Vec<u32> = {
        let start = ix.leaf_begin().unwrap();
        let end = ix.leaf_end().unwrap();
        let mut scan = IxScan::new(ix.clone(), start, end);
        let mut out = Vec::new();
        while !scan.is_end() {
            out.push(scan.rid().unwrap().page_no);
            scan.next().unwrap();
        }
        out
    };
    assert_eq!(scanned, keys);
}

#[test]
fn test_lower_bound_is_least_entry_geq() {
    let (ix, _dir) = open_index(3);
    for v in (2..=40).step_by(2) {
        ix.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap();
    }
    for probe in 1..=39 {
        let iid = ix.lower_bound(&int_key(probe)).unwrap();
        let rid = ix.get_rid(iid).unwrap();
        let expect = if probe % 2 == 0 { probe } else { probe + 1 };
        assert_eq!(rid.page_no, expect as u32);
    }
}

#[test]
fn test_delete_everything_then_reuse() {
    let (ix, _dir) = open_index(3);
    for v in 1..=30 {
        ix.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap();
    }
    for v in 1..=30 {
        assert!(ix.delete_entry(&int_key(v)).unwrap());
    }
    assert_eq!(full_scan(&ix), Vec::<u32>::new());

    // The degenerate empty tree accepts fresh inserts
    for v in [7, 3, 11] {
        assert!(ix.insert_entry(&int_key(v), Rid::new(v as u32, 0)).unwrap());
    }
    assert_eq!(full_scan(&ix), vec![3, 7, 11]);
}

#[test]
fn test_composite_key_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ix");
    let dm = Arc::new(DiskManager::new());
    BTreeIndex::create(
        &dm,
        &path,
        vec![ColType::Int, ColType::String],
        vec![4, 4],
        Some(3),
    )
    .unwrap();
    let bpm = Arc::new(BufferPoolManager::new(64, 2, dm));
    let ix = Arc::new(BTreeIndex::open(bpm, &path).unwrap());

    let key = |a: i32, s: &str| {
        let mut k = Value::Int(a).to_bytes(4).unwrap();
        k.extend(Value::Str(s.into()).to_bytes(4).unwrap());
        k
    };

    let entries = [
        (2, "a", 4u32),
        (1, "b", 2),
        (1, "a", 1),
        (2, "b", 5),
        (1, "c", 3),
    ];
    for (a, s, tag) in entries {
        assert!(ix.insert_entry(&key(a, s), Rid::new(tag, 0)).unwrap());
    }
    // Same first column, differing second column is a distinct key
    assert!(!ix.insert_entry(&key(1, "a"), Rid::new(99, 0)).unwrap());

    assert_eq!(full_scan(&ix), vec![1, 2, 3, 4, 5]);
}
