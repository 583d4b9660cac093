//! With `tolerate_corruption` set, a lookup over a tree with one injected
//! malformed node returns results for every key outside that subtree and
//! silently omits the ones inside it; without the flag, the same lookup
//! fails outright.

mod common;

use common::{compare, insert_actions, reduce, rereduce};
use vbtree::{decode_node, file::AppendOnlyFile, lookup, modify, LookupMode, LookupRequest, Node, NodePointer, Slice, TreeConfig, TreeFile};

/// Finds the first leaf (in tree order) containing `target`, returning
/// its pointer and the full set of keys it holds.
fn find_leaf_containing<F: TreeFile>(
    file: &F,
    ptr: &NodePointer,
    target: &Slice,
) -> vbtree::Result<Option<(NodePointer, Vec<Slice>)>> {
    let bytes = file.read_chunk(ptr.offset)?;
    match decode_node(&bytes).map_err(vbtree::Error::Decode)? {
        Node::Kv(entries) => {
            if entries.iter().any(|(k, _)| k == target) {
                Ok(Some((ptr.clone(), entries.into_iter().map(|(k, _)| k).collect())))
            } else {
                Ok(None)
            }
        }
        Node::Kp(entries) => {
            for (_, child) in &entries {
                if let Some(found) = find_leaf_containing(file, child, target)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
    }
}

#[test]
fn tolerant_lookup_skips_only_the_corrupted_leaf() -> vbtree::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tree.db");
    let file = AppendOnlyFile::create(&path)?;
    let cfg = TreeConfig::new().kv_chunk_threshold(150).kp_chunk_threshold(150);

    let root = modify(
        &file,
        None,
        &insert_actions(0..500),
        compare,
        reduce,
        rereduce,
        &cfg,
        |_, _| Ok(()),
    )?
    .expect("non-empty tree has a root");

    let target = common::key(250);
    let (leaf, leaf_keys) = find_leaf_containing(&file, &root, &target)?.expect("key 250 must live in some leaf");
    drop(file);

    // Flip a payload byte of the leaf's chunk so its checksum no longer
    // matches; this is the same corruption shape as a torn write.
    let mut raw = std::fs::read(&path)?;
    let payload_start = leaf.offset as usize + 4 + 16;
    raw[payload_start] ^= 0xFF;
    std::fs::write(&path, raw)?;

    let file = AppendOnlyFile::open(&path)?;

    // Without tolerance, the corrupted chunk fails the whole call.
    let strict_rq = LookupRequest { file: &file, compare: &compare, tolerate_corruption: false };
    let lower = Slice::from(Vec::new());
    let err = lookup(
        &strict_rq,
        Some(&root),
        &LookupMode::Fold { lower: &lower, upper: None },
        |_, _| Ok(()),
        None,
    )
    .unwrap_err();
    assert!(
        matches!(err, vbtree::Error::InvalidChecksum { .. }),
        "a flipped payload byte must surface as a checksum mismatch: {err}"
    );

    // With tolerance, every key outside the corrupted leaf still comes
    // back; the corrupted leaf's own keys are silently omitted.
    let tolerant_rq = LookupRequest { file: &file, compare: &compare, tolerate_corruption: true };
    let mut seen = Vec::new();
    lookup(
        &tolerant_rq,
        Some(&root),
        &LookupMode::Fold { lower: &lower, upper: None },
        |k, _| {
            seen.push(k.clone());
            Ok(())
        },
        None,
    )?;

    assert_eq!(seen.len(), 500 - leaf_keys.len());
    for corrupted_key in &leaf_keys {
        assert!(!seen.contains(corrupted_key), "a key from the corrupted leaf leaked through");
    }
    assert!(seen.contains(&common::key(0)), "keys outside the corrupted leaf must still resolve");
    assert!(seen.contains(&common::key(499)), "keys outside the corrupted leaf must still resolve");

    Ok(())
}
