// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The modify engine: applies a sorted batch of
//! insert/remove/fetch actions to a tree in one left-to-right pass,
//! producing a new root without disturbing any untouched subtree.
//!
//! Built on the same streaming-flush bookkeeping used elsewhere in this
//! crate for block encoding — accumulate until the size budget is
//! exceeded, then flush — generalized from "serialize one sorted run of
//! key-value pairs" to "rewrite one level of a pointer tree".
//!
//! A node-list entry is either a raw item still awaiting a flush decision
//! or an already-finished pointer; `Finished` entries are kept as a plain
//! `Vec<(Slice, NodePointer)>` rather than a nullable-pointer check.

use crate::{
    action::Action,
    binary_search::partition_point,
    callback::{CompareFn, ReduceFn, RereduceFn},
    config::TreeConfig,
    node::{
        codec::{encode_kp_node, encode_kv_node, kp_entry_size, kv_entry_size},
        decode_node, Node, NodePointer,
    },
    Error, Result, Slice, TreeFile,
};
use std::cmp::Ordering;

/// One finished `(separator key, pointer)` entry a level has decided on.
pub(crate) type Finished = Vec<(Slice, NodePointer)>;

/// The outcome of rewriting one subtree. Shared with [`crate::purge`],
/// which rewrites subtrees under a purge policy instead of an action
/// batch but needs the same "did anything actually change" bookkeeping.
pub(crate) struct Outcome {
    /// Replacement entries for the rewritten subtree: empty if the whole
    /// subtree was deleted, one if it was rewritten in place, more than
    /// one if it split.
    pub(crate) entries: Finished,
    /// Whether any byte was actually written for this subtree. `false`
    /// means `entries` is exactly the subtree's original
    /// `(last_key, pointer)`, reused verbatim.
    pub(crate) changed: bool,
}

/// Accumulates entries for one being-rewritten level and flushes them to
/// `file` as the accumulated size crosses `threshold`.
pub(crate) struct LeafBuilder {
    pending: Vec<(Slice, Slice)>,
    pending_size: usize,
    finished: Finished,
}

impl LeafBuilder {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            pending_size: 1, // node tag byte
            finished: Vec::new(),
        }
    }

    pub(crate) fn push<F: TreeFile>(
        &mut self,
        key: Slice,
        value: Slice,
        threshold: usize,
        file: &F,
        reduce: &ReduceFn<'_>,
    ) -> Result<()> {
        let size = kv_entry_size(key.len(), value.len());
        if !self.pending.is_empty() && self.pending_size + size > threshold {
            self.flush(file, reduce)?;
        }
        self.pending_size += size;
        self.pending.push((key, value));
        Ok(())
    }

    fn flush<F: TreeFile>(&mut self, file: &F, reduce: &ReduceFn<'_>) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let bytes = encode_kv_node(&self.pending)?;
        let offset = file.append_chunk(&bytes)?;
        let reduce_value = reduce(&self.pending)?;
        let last_key = self.pending.last().expect("checked non-empty").0.clone();

        self.finished.push((
            last_key,
            NodePointer {
                offset,
                subtree_size: bytes.len() as u64,
                reduce_value,
            },
        ));

        self.pending.clear();
        self.pending_size = 1;
        Ok(())
    }

    pub(crate) fn finish<F: TreeFile>(mut self, file: &F, reduce: &ReduceFn<'_>) -> Result<Finished> {
        self.flush(file, reduce)?;
        Ok(self.finished)
    }
}

/// Same role as [`LeafBuilder`], for interior (KP) levels.
pub(crate) struct InteriorBuilder {
    pending: Vec<(Slice, NodePointer)>,
    pending_size: usize,
    finished: Finished,
}

impl InteriorBuilder {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            pending_size: 1,
            finished: Vec::new(),
        }
    }

    pub(crate) fn push<F: TreeFile>(
        &mut self,
        key: Slice,
        pointer: NodePointer,
        threshold: usize,
        file: &F,
        rereduce: &RereduceFn<'_>,
    ) -> Result<()> {
        let size = kp_entry_size(key.len(), &pointer);
        if !self.pending.is_empty() && self.pending_size + size > threshold {
            self.flush(file, rereduce)?;
        }
        self.pending_size += size;
        self.pending.push((key, pointer));
        Ok(())
    }

    fn flush<F: TreeFile>(&mut self, file: &F, rereduce: &RereduceFn<'_>) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let bytes = encode_kp_node(&self.pending)?;
        let offset = file.append_chunk(&bytes)?;

        let child_reduces: Vec<Slice> = self.pending.iter().map(|(_, p)| p.reduce_value.clone()).collect();
        let reduce_value = rereduce(&child_reduces)?;

        let children_size: u64 = self.pending.iter().map(|(_, p)| p.subtree_size).sum();
        let last_key = self.pending.last().expect("checked non-empty").0.clone();

        self.finished.push((
            last_key,
            NodePointer {
                offset,
                subtree_size: bytes.len() as u64 + children_size,
                reduce_value,
            },
        ));

        self.pending.clear();
        self.pending_size = 1;
        Ok(())
    }

    pub(crate) fn finish<F: TreeFile>(mut self, file: &F, rereduce: &RereduceFn<'_>) -> Result<Finished> {
        self.flush(file, rereduce)?;
        Ok(self.finished)
    }
}

fn run_end(actions: &[Action], start: usize, key: &Slice, compare: &CompareFn<'_>) -> usize {
    let mut end = start;
    while end < actions.len() && compare(actions.get(end).expect("end < actions.len()").key(), key) == Ordering::Equal {
        end += 1;
    }
    end
}

/// Applies one key's run of actions (already filtered to a single key, in
/// original batch order) to `initial`, invoking `fetch_callback` for
/// every [`Action::Fetch`] with the value visible at that point in the
/// run. Returns the value that should persist once the run is done.
fn apply_run(
    run: &[Action],
    key: &Slice,
    initial: Option<Slice>,
    fetch_callback: &mut dyn FnMut(&Slice, Option<&Slice>) -> Result<()>,
) -> Result<Option<Slice>> {
    let mut current = initial;
    for action in run {
        match action {
            Action::Insert(_, value) => current = Some(value.clone()),
            Action::Remove(_) => current = None,
            Action::Fetch(_) => fetch_callback(key, current.as_ref())?,
        }
    }
    Ok(current)
}

fn run_has_mutation(run: &[Action]) -> bool {
    run.iter().any(Action::mutates)
}

/// Context threaded through the recursive subtree rewrite; bundles the
/// callbacks and config that don't change between calls.
pub(crate) struct ModifyCtx<'a, F: TreeFile> {
    pub(crate) file: &'a F,
    pub(crate) compare: &'a CompareFn<'a>,
    pub(crate) reduce: &'a ReduceFn<'a>,
    pub(crate) rereduce: &'a RereduceFn<'a>,
    pub(crate) config: &'a TreeConfig,
}

fn process_kv<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    existing: Option<&NodePointer>,
    entries: &[(Slice, Slice)],
    actions: &[Action],
    fetch_callback: &mut dyn FnMut(&Slice, Option<&Slice>) -> Result<()>,
) -> Result<Outcome> {
    let mut i = 0;
    let mut j = 0;
    let mut rebuilt = Vec::new();
    let mut changed = false;

    while i < entries.len() || j < actions.len() {
        let ordering = match (entries.get(i), actions.get(j)) {
            (Some((k, _)), Some(a)) => (ctx.compare)(k, a.key()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match ordering {
            Ordering::Less => {
                rebuilt.push(entries.get(i).expect("i < entries.len()").clone());
                i += 1;
            }
            Ordering::Greater => {
                let key = actions.get(j).expect("j < actions.len()").key().clone();
                let end = run_end(actions, j, &key, ctx.compare);
                let run = actions.get(j..end).expect("j..end within actions");
                if run_has_mutation(run) {
                    changed = true;
                }
                if let Some(value) = apply_run(run, &key, None, fetch_callback)? {
                    rebuilt.push((key, value));
                }
                j = end;
            }
            Ordering::Equal => {
                let (key, existing_value) = entries.get(i).expect("i < entries.len()").clone();
                let end = run_end(actions, j, &key, ctx.compare);
                let run = actions.get(j..end).expect("j..end within actions");
                if run_has_mutation(run) {
                    changed = true;
                }
                if let Some(value) = apply_run(run, &key, Some(existing_value), fetch_callback)? {
                    rebuilt.push((key, value));
                }
                i += 1;
                j = end;
            }
        }
    }

    if !changed {
        let entries = match existing {
            Some(ptr) => vec![(
                entries.last().map(|(k, _)| k.clone()).unwrap_or_default(),
                ptr.clone(),
            )],
            None => Vec::new(),
        };
        return Ok(Outcome {
            entries,
            changed: false,
        });
    }

    let mut builder = LeafBuilder::new();
    for (key, value) in rebuilt {
        builder.push(key, value, ctx.config.kv_chunk_threshold, ctx.file, ctx.reduce)?;
    }
    let entries = builder.finish(ctx.file, ctx.reduce)?;

    Ok(Outcome {
        entries,
        changed: true,
    })
}

fn process_kp<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    existing: &NodePointer,
    entries: &[(Slice, NodePointer)],
    actions: &[Action],
    fetch_callback: &mut dyn FnMut(&Slice, Option<&Slice>) -> Result<()>,
) -> Result<Outcome> {
    let mut start = 0;
    let mut any_changed = false;
    let mut items: Vec<(Slice, NodePointer)> = Vec::new();

    for (idx, (sep, child)) in entries.iter().enumerate() {
        let is_last = idx + 1 == entries.len();
        let end = if is_last {
            actions.len()
        } else {
            let window = actions.get(start..).unwrap_or(&[]);
            start + partition_point(window, |a| (ctx.compare)(a.key(), sep) != Ordering::Greater)
        };

        if end == start {
            // copy-on-write fast path: nothing touches this subtree, it
            // isn't even read.
            items.push((sep.clone(), child.clone()));
        } else {
            let slice = actions.get(start..end).unwrap_or(&[]);
            let outcome = modify_subtree(ctx, Some(child), slice, fetch_callback)?;
            if outcome.changed {
                any_changed = true;
            }
            items.extend(outcome.entries);
        }

        start = end;
    }

    if !any_changed {
        return Ok(Outcome {
            entries: vec![(
                entries.last().map(|(k, _)| k.clone()).unwrap_or_default(),
                existing.clone(),
            )],
            changed: false,
        });
    }

    let mut builder = InteriorBuilder::new();
    for (key, pointer) in items {
        builder.push(key, pointer, ctx.config.kp_chunk_threshold, ctx.file, ctx.rereduce)?;
    }
    let entries = builder.finish(ctx.file, ctx.rereduce)?;

    Ok(Outcome {
        entries,
        changed: true,
    })
}

fn modify_subtree<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    existing: Option<&NodePointer>,
    actions: &[Action],
    fetch_callback: &mut dyn FnMut(&Slice, Option<&Slice>) -> Result<()>,
) -> Result<Outcome> {
    let Some(ptr) = existing else {
        return process_kv(ctx, None, &[], actions, fetch_callback);
    };

    let bytes = ctx.file.read_chunk(ptr.offset)?;
    match decode_node(&bytes).map_err(Error::Decode)? {
        Node::Kv(entries) => process_kv(ctx, Some(ptr), &entries, actions, fetch_callback),
        Node::Kp(entries) => process_kp(ctx, ptr, &entries, actions, fetch_callback),
    }
}

/// Rebuilds the levels above a changed subtree until exactly one pointer
/// remains: zero or one pointer needs no work, more than one means the
/// previous level split and a new parent level must be built over it.
pub(crate) fn promote<F: TreeFile>(
    file: &F,
    mut level: Finished,
    rereduce: &RereduceFn<'_>,
    kp_chunk_threshold: usize,
) -> Result<Finished> {
    while level.len() > 1 {
        let mut builder = InteriorBuilder::new();
        for (key, pointer) in level {
            builder.push(key, pointer, kp_chunk_threshold, file, rereduce)?;
        }
        level = builder.finish(file, rereduce)?;
    }
    Ok(level)
}

/// Applies `actions` (sorted ascending by key; ties broken by their
/// original relative order, last applicable action wins) to the tree
/// rooted at `root`, returning the new root.
///
/// `compare` orders raw keys. `reduce` summarizes a freshly-flushed leaf's
/// entries; `rereduce` summarizes a freshly-flushed interior node's
/// children's reduce values. `fetch_callback` is invoked once per
/// [`Action::Fetch`], with the value visible at that point in the batch
/// (`None` if absent).
///
/// An empty `actions` slice returns `root` unchanged and performs no I/O:
/// the idempotent no-op guarantee. Likewise, if no action's key intersects
/// a given subtree, that subtree's existing pointer is carried forward
/// unread and unwritten (copy-on-write locality).
///
/// # Errors
///
/// Propagates I/O, decode, and callback errors. Unlike lookup, modify
/// does not tolerate a corrupt subtree: any decode failure aborts the
/// whole call. Nodes already appended before the failure become
/// unreachable garbage in the append-only file; this is acceptable under
/// the append-only model, since the caller's root is left unchanged.
pub fn modify<F: TreeFile>(
    file: &F,
    root: Option<NodePointer>,
    actions: &[Action],
    compare: impl Fn(&[u8], &[u8]) -> Ordering,
    reduce: impl Fn(&[(Slice, Slice)]) -> Result<Slice>,
    rereduce: impl Fn(&[Slice]) -> Result<Slice>,
    config: &TreeConfig,
    mut fetch_callback: impl FnMut(&Slice, Option<&Slice>) -> Result<()>,
) -> Result<Option<NodePointer>> {
    if actions.is_empty() {
        return Ok(root);
    }

    let ctx = ModifyCtx {
        file,
        compare: &compare,
        reduce: &reduce,
        rereduce: &rereduce,
        config,
    };

    let outcome = modify_subtree(&ctx, root.as_ref(), actions, &mut fetch_callback)?;
    if !outcome.changed {
        return Ok(root);
    }

    let level = promote(file, outcome.entries, &rereduce, config.kp_chunk_threshold)?;
    Ok(level.into_iter().next().map(|(_, pointer)| pointer))
}
