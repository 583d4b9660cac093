// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The lookup engine: point fetches and range folds over
//! an existing tree, without mutation.
//!
//! Built on the same block-scanning traversal shape used for bounded
//! iteration over a sorted run elsewhere in this crate, and on
//! `binary_search::partition_point` for narrowing a key window — adapted
//! from "scan one sorted block" to "recursively descend a pointer tree
//! with a shrinking key window".

use crate::{
    binary_search::partition_point,
    callback::CompareFn,
    coding::DecodeError,
    node::{decode_node, Node, NodePointer},
    Error, Result, Slice, TreeFile,
};
use std::cmp::Ordering;

/// What a [`lookup`] call is looking for.
pub enum LookupMode<'a> {
    /// Point lookups for an ascending, deduplicated set of keys. The fetch
    /// callback fires once per key that exists in the tree; missing keys
    /// are silently skipped (mirrors fetch mode).
    Fetch {
        /// Keys to look up, ascending and deduplicated.
        keys: &'a [Slice],
    },

    /// An inclusive range fold. `upper = None` means "unbounded above".
    Fold {
        /// Inclusive lower bound.
        lower: &'a Slice,
        /// Inclusive upper bound, or `None` for unbounded.
        upper: Option<&'a Slice>,
    },
}

/// Parameters shared by every node visited during one [`lookup`] call.
pub struct LookupRequest<'a, F: TreeFile> {
    /// The backing file nodes are read from.
    pub file: &'a F,
    /// Key ordering.
    pub compare: &'a CompareFn<'a>,
    /// Skip a subtree that fails to decode instead of failing the whole
    /// call.
    pub tolerate_corruption: bool,
}

/// Walks `root`, invoking `fetch_callback` for every matching entry in
/// ascending key order, and (if given) `node_callback` once per interior
/// node visited, before descending into it.
///
/// An empty tree (`root = None`) matches nothing and returns `Ok(())`
/// without reading anything.
///
/// # Errors
///
/// Propagates I/O and decode errors from `rq.file`, unless
/// `rq.tolerate_corruption` is set, in which case a corrupt subtree is
/// skipped instead. Propagates any error returned by `fetch_callback` or
/// `node_callback`.
pub fn lookup<F: TreeFile>(
    rq: &LookupRequest<'_, F>,
    root: Option<&NodePointer>,
    mode: &LookupMode<'_>,
    mut fetch_callback: impl FnMut(&Slice, &Slice) -> Result<()>,
    mut node_callback: Option<&mut dyn FnMut(u64, &Slice) -> Result<()>>,
) -> Result<()> {
    let Some(root) = root else {
        return Ok(());
    };

    match mode {
        LookupMode::Fetch { keys } => {
            if keys.is_empty() {
                return Ok(());
            }
            lookup_fetch(rq, root, keys, &mut fetch_callback, &mut node_callback)
        }
        LookupMode::Fold { lower, upper } => lookup_fold(
            rq,
            root,
            lower,
            *upper,
            &mut fetch_callback,
            &mut node_callback,
        ),
    }
}

fn decode_subtree<F: TreeFile>(rq: &LookupRequest<'_, F>, ptr: &NodePointer) -> Result<Option<Node>> {
    let bytes = match rq.file.read_chunk(ptr.offset) {
        Ok(bytes) => bytes,
        Err(e) if rq.tolerate_corruption => {
            log::warn!("lookup: skipping unreadable subtree at offset {}: {e}", ptr.offset);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    match decode_node(&bytes) {
        Ok(node) => Ok(Some(node)),
        Err(e) if rq.tolerate_corruption => {
            log::warn!("lookup: skipping corrupt subtree at offset {}: {e}", ptr.offset);
            Ok(None)
        }
        Err(e) => Err(Error::Decode(e)),
    }
}

fn lookup_fetch<F: TreeFile>(
    rq: &LookupRequest<'_, F>,
    ptr: &NodePointer,
    keys: &[Slice],
    fetch_callback: &mut dyn FnMut(&Slice, &Slice) -> Result<()>,
    node_callback: &mut Option<&mut dyn FnMut(u64, &Slice) -> Result<()>>,
) -> Result<()> {
    let Some(node) = decode_subtree(rq, ptr)? else {
        return Ok(());
    };

    match node {
        Node::Kv(entries) => {
            let mut i = 0;
            for key in keys {
                // advance the window to the first entry >= key
                while let Some((k, _)) = entries.get(i) {
                    if (rq.compare)(k, key) == Ordering::Less {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let Some((k, v)) = entries.get(i) else {
                    break;
                };
                if (rq.compare)(k, key) == Ordering::Equal {
                    fetch_callback(k, v)?;
                }
            }
            Ok(())
        }
        Node::Kp(entries) => {
            let mut start = 0;
            for (idx, (sep, child)) in entries.iter().enumerate() {
                let is_last = idx + 1 == entries.len();
                let end = if is_last {
                    keys.len()
                } else {
                    let window = keys.get(start..).unwrap_or(&[]);
                    start + partition_point(window, |k| (rq.compare)(k, sep) != Ordering::Greater)
                };

                if end > start {
                    if let Some(cb) = node_callback.as_deref_mut() {
                        cb(child.subtree_size, &child.reduce_value)?;
                    }
                    let slice = keys.get(start..end).unwrap_or(&[]);
                    lookup_fetch(rq, child, slice, fetch_callback, node_callback)?;
                }

                start = end;
                if start >= keys.len() {
                    break;
                }
            }
            Ok(())
        }
    }
}

fn lookup_fold<F: TreeFile>(
    rq: &LookupRequest<'_, F>,
    ptr: &NodePointer,
    lower: &Slice,
    upper: Option<&Slice>,
    fetch_callback: &mut dyn FnMut(&Slice, &Slice) -> Result<()>,
    node_callback: &mut Option<&mut dyn FnMut(u64, &Slice) -> Result<()>>,
) -> Result<()> {
    let Some(node) = decode_subtree(rq, ptr)? else {
        return Ok(());
    };

    match node {
        Node::Kv(entries) => {
            for (key, value) in &entries {
                if (rq.compare)(key, lower) == Ordering::Less {
                    continue;
                }
                if let Some(upper) = upper {
                    if (rq.compare)(key, upper) == Ordering::Greater {
                        break;
                    }
                }
                fetch_callback(key, value)?;
            }
            Ok(())
        }
        Node::Kp(entries) => {
            for (sep, child) in &entries {
                // child's key range is (previous sep, sep]; skip it
                // entirely if its whole range sits below the lower bound.
                if (rq.compare)(sep, lower) == Ordering::Less {
                    continue;
                }

                if let Some(cb) = node_callback.as_deref_mut() {
                    cb(child.subtree_size, &child.reduce_value)?;
                }
                lookup_fold(rq, child, lower, upper, fetch_callback, node_callback)?;

                // every later sibling's range starts past `sep`, so once
                // this child's own upper edge clears `upper` none of them
                // can overlap either.
                if let Some(upper) = upper {
                    if (rq.compare)(sep, upper) == Ordering::Greater {
                        break;
                    }
                }
            }
            Ok(())
        }
    }
}
