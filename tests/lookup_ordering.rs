//! Lookup callbacks always fire in ascending key order of the underlying
//! tree, regardless of how the tree was built or which keys a fetch batch
//! asks for (the batch itself is still required to be pre-sorted).

mod common;

use common::{compare, insert_actions, key, reduce, rereduce};
use vbtree::{file::AppendOnlyFile, lookup, modify, LookupMode, LookupRequest, TreeConfig};

#[test]
fn fetch_batch_fires_in_ascending_key_order() -> vbtree::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = AppendOnlyFile::create(dir.path().join("tree.db"))?;
    let cfg = TreeConfig::new().kv_chunk_threshold(180).kp_chunk_threshold(180);

    let root = modify(
        &file,
        None,
        &insert_actions(0..600),
        compare,
        reduce,
        rereduce,
        &cfg,
        |_, _| Ok(()),
    )?;

    // A sorted, scattered subset: lookup must still report these in
    // ascending tree order, which here happens to equal the query order,
    // but the test checks the *output* order, not an echo of the input.
    let ids = [577, 3, 410, 89, 250, 599, 0];
    let mut sorted_ids = ids;
    sorted_ids.sort_unstable();
    let keys: Vec<_> = sorted_ids.iter().copied().map(key).collect();

    let rq = LookupRequest { file: &file, compare: &compare, tolerate_corruption: false };
    let mut seen = Vec::new();
    lookup(
        &rq,
        root.as_ref(),
        &LookupMode::Fetch { keys: &keys },
        |k, _| {
            seen.push(k.clone());
            Ok(())
        },
        None,
    )?;

    assert_eq!(seen.len(), sorted_ids.len());
    for pair in seen.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    for (got, expected_id) in seen.iter().zip(sorted_ids.iter()) {
        assert_eq!(got.as_ref(), key(*expected_id).as_ref());
    }

    Ok(())
}

#[test]
fn fold_range_fires_in_ascending_order_regardless_of_insertion_order() -> vbtree::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = AppendOnlyFile::create(dir.path().join("tree.db"))?;
    let cfg = TreeConfig::new().kv_chunk_threshold(180).kp_chunk_threshold(180);

    // Build the tree via two separate modify calls touching interleaved
    // ranges, so on-disk chunk order need not match the final key order.
    let root = modify(
        &file,
        None,
        &insert_actions((0..300).step_by(2)),
        compare,
        reduce,
        rereduce,
        &cfg,
        |_, _| Ok(()),
    )?;
    let root = modify(
        &file,
        root,
        &insert_actions((1..300).step_by(2)),
        compare,
        reduce,
        rereduce,
        &cfg,
        |_, _| Ok(()),
    )?;

    let lower = key(0);
    let rq = LookupRequest { file: &file, compare: &compare, tolerate_corruption: false };
    let mut seen = Vec::new();
    lookup(
        &rq,
        root.as_ref(),
        &LookupMode::Fold { lower: &lower, upper: None },
        |k, _| {
            seen.push(k.clone());
            Ok(())
        },
        None,
    )?;

    assert_eq!(seen.len(), 300);
    for pair in seen.windows(2) {
        assert!(pair[0] < pair[1], "fold must yield strictly ascending keys");
    }

    Ok(())
}
