use crate::*;
use proptest::prelude::*;

fn int_key(i: u32) -> DecoratedKey {
    DecoratedKey::from_raw(i.to_be_bytes().to_vec())
}

fn ck(i: u32) -> ClusteringKey {
    ClusteringKey::new(vec![i.to_be_bytes().to_vec()])
}

// -------------------- Partitions --------------------

#[test]
fn fragments_follow_partition_layout() {
    let mut p = Partition::new(int_key(1));
    p.delete(Tombstone::new(3, 30));
    p.set_static_cell(0, Cell::live(1, b"s".to_vec()));
    p.upsert_row(row_with_cells(ck(2), [(0, Cell::live(1, b"x".to_vec()))]));
    p.upsert_row(row_with_cells(ck(1), [(0, Cell::live(1, b"y".to_vec()))]));
    p.add_range_tombstone(RangeTombstone {
        start: ClusteringBound::new(ck(2), BoundKind::InclStart),
        end: ClusteringBound::new(ck(3), BoundKind::InclEnd),
        tombstone: Tombstone::new(2, 20),
    });

    let kinds: Vec<FragmentKind> = p.fragments().iter().map(MutationFragment::kind).collect();
    assert_eq!(
        kinds,
        vec![
            FragmentKind::PartitionStart,
            FragmentKind::StaticRow,
            FragmentKind::ClusteringRow,
            FragmentKind::RangeTombstone,
            FragmentKind::ClusteringRow,
            FragmentKind::PartitionEnd,
        ]
    );
    match &p.fragments()[0] {
        MutationFragment::PartitionStart(ps) => {
            assert_eq!(ps.tombstone, Some(Tombstone::new(3, 30)));
        }
        other => panic!("unexpected first fragment {:?}", other.kind()),
    }
}

#[test]
fn empty_partition_is_start_and_end() {
    let p = Partition::new(int_key(9));
    let kinds: Vec<FragmentKind> = p.fragments().iter().map(MutationFragment::kind).collect();
    assert_eq!(kinds, vec![FragmentKind::PartitionStart, FragmentKind::PartitionEnd]);
}

// -------------------- Memtable --------------------

#[test]
fn memtable_merges_repeated_partitions() {
    let mut m = Memtable::new();
    m.put_row(int_key(1), row_with_cells(ck(1), [(0, Cell::live(1, b"a".to_vec()))]));
    m.put_row(int_key(1), row_with_cells(ck(1), [(0, Cell::live(2, b"b".to_vec()))]));
    m.put_row(int_key(1), row_with_cells(ck(2), [(0, Cell::live(1, b"c".to_vec()))]));
    assert_eq!(m.len(), 1);
    let p = m.get(&int_key(1)).expect("partition exists");
    assert_eq!(p.row_count(), 2);
}

#[test]
fn memtable_iterates_in_decorated_key_order() {
    let mut m = Memtable::new();
    for i in 0..100 {
        m.apply(Partition::new(int_key(i)));
    }
    let keys: Vec<&DecoratedKey> = m.iter().map(Partition::key).collect();
    assert_eq!(keys.len(), 100);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

proptest! {
    #[test]
    fn memtable_streams_always_validate(
        rows in proptest::collection::vec((0u32..20, 0u32..20, 0i64..5), 0..200)
    ) {
        let mut m = Memtable::new();
        for (pk, ckey, ts) in rows {
            m.put_row(int_key(pk), row_with_cells(ck(ckey), [(0, Cell::live(ts, vec![1]))]));
        }
        let mut v = MutationFragmentStreamValidator::new();
        for p in m.iter() {
            for f in p.fragments() {
                prop_assert!(v.validate(&f).is_ok());
            }
        }
        prop_assert!(v.on_end_of_stream().is_ok());
        prop_assert_eq!(v.partitions(), m.len() as u64);
    }
}
