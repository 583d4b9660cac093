// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The guided purge engine: walks a tree under a
//! caller-supplied policy instead of an action batch, deciding per item
//! and per subtree whether to keep it, drop it, descend into it, or stop
//! the whole pass early.
//!
//! Shares its chunk-threshold rewrite machinery
//! ([`crate::modify::LeafBuilder`], [`crate::modify::InteriorBuilder`],
//! [`crate::modify::promote`]) with [`crate::modify`]; only the
//! per-item/per-subtree decision is different. Decisions are a typed enum
//! ([`PurgeKvDecision`], [`PurgeKpDecision`]) rather than integer codes.

use crate::{
    callback::{CompareFn, ReduceFn, RereduceFn},
    config::TreeConfig,
    modify::{self, Finished, InteriorBuilder, LeafBuilder, ModifyCtx},
    node::{decode_node, Node, NodePointer},
    Error, Result, Slice, TreeFile,
};

/// What to do with one leaf entry during a guided purge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeKvDecision {
    /// Keep the entry.
    Keep,
    /// Drop the entry.
    Purge,
    /// Keep the entry and end the purge pass immediately; every
    /// not-yet-visited entry and subtree is left untouched.
    Stop,
}

/// What to do with one interior entry (a whole subtree) during a guided
/// purge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeKpDecision {
    /// Keep the subtree pointer unchanged, without reading it.
    Keep,
    /// Drop the entire subtree without descending into it.
    Purge,
    /// Descend into the subtree and decide per child.
    Partial,
    /// Keep the subtree pointer unchanged and end the purge pass
    /// immediately; every not-yet-visited entry and subtree is left
    /// untouched.
    Stop,
}

struct PurgeOutcome {
    entries: Finished,
    changed: bool,
    stopped: bool,
}

fn unchanged(key: Slice, pointer: NodePointer) -> PurgeOutcome {
    PurgeOutcome {
        entries: vec![(key, pointer)],
        changed: false,
        stopped: false,
    }
}

fn process_kv<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    existing: &NodePointer,
    entries: &[(Slice, Slice)],
    purge_kv: &mut dyn FnMut(&Slice, &Slice) -> Result<PurgeKvDecision>,
) -> Result<PurgeOutcome> {
    let mut rebuilt = Vec::new();
    let mut changed = false;
    let mut stopped = false;

    for (key, value) in entries {
        if stopped {
            rebuilt.push((key.clone(), value.clone()));
            continue;
        }

        match purge_kv(key, value)? {
            PurgeKvDecision::Keep => rebuilt.push((key.clone(), value.clone())),
            PurgeKvDecision::Purge => changed = true,
            PurgeKvDecision::Stop => {
                stopped = true;
                rebuilt.push((key.clone(), value.clone()));
            }
        }
    }

    if !changed {
        let last_key = entries.last().map(|(k, _)| k.clone()).unwrap_or_default();
        let mut outcome = unchanged(last_key, existing.clone());
        outcome.stopped = stopped;
        return Ok(outcome);
    }

    let mut builder = LeafBuilder::new();
    for (key, value) in rebuilt {
        builder.push(key, value, ctx.config.kv_chunk_threshold, ctx.file, ctx.reduce)?;
    }
    let entries = builder.finish(ctx.file, ctx.reduce)?;

    Ok(PurgeOutcome {
        entries,
        changed: true,
        stopped,
    })
}

fn process_kp<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    existing: &NodePointer,
    entries: &[(Slice, NodePointer)],
    purge_kp: &mut dyn FnMut(&NodePointer) -> Result<PurgeKpDecision>,
    purge_kv: &mut dyn FnMut(&Slice, &Slice) -> Result<PurgeKvDecision>,
) -> Result<PurgeOutcome> {
    let mut items: Finished = Vec::new();
    let mut any_changed = false;
    let mut stopped = false;

    for (sep, child) in entries {
        if stopped {
            items.push((sep.clone(), child.clone()));
            continue;
        }

        match purge_kp(child)? {
            PurgeKpDecision::Keep => items.push((sep.clone(), child.clone())),
            PurgeKpDecision::Purge => any_changed = true,
            PurgeKpDecision::Stop => {
                stopped = true;
                items.push((sep.clone(), child.clone()));
            }
            PurgeKpDecision::Partial => {
                let outcome = purge_subtree(ctx, child, purge_kp, purge_kv)?;
                if outcome.changed {
                    any_changed = true;
                }
                items.extend(outcome.entries);
                if outcome.stopped {
                    stopped = true;
                }
            }
        }
    }

    if !any_changed {
        let last_key = entries.last().map(|(k, _)| k.clone()).unwrap_or_default();
        let mut outcome = unchanged(last_key, existing.clone());
        outcome.stopped = stopped;
        return Ok(outcome);
    }

    let mut builder = InteriorBuilder::new();
    for (key, pointer) in items {
        builder.push(key, pointer, ctx.config.kp_chunk_threshold, ctx.file, ctx.rereduce)?;
    }
    let entries = builder.finish(ctx.file, ctx.rereduce)?;

    Ok(PurgeOutcome {
        entries,
        changed: true,
        stopped,
    })
}

fn purge_subtree<F: TreeFile>(
    ctx: &ModifyCtx<'_, F>,
    ptr: &NodePointer,
    purge_kp: &mut dyn FnMut(&NodePointer) -> Result<PurgeKpDecision>,
    purge_kv: &mut dyn FnMut(&Slice, &Slice) -> Result<PurgeKvDecision>,
) -> Result<PurgeOutcome> {
    let bytes = ctx.file.read_chunk(ptr.offset)?;
    match decode_node(&bytes).map_err(Error::Decode)? {
        Node::Kv(entries) => process_kv(ctx, ptr, &entries, purge_kv),
        Node::Kp(entries) => process_kp(ctx, ptr, &entries, purge_kp, purge_kv),
    }
}

/// Walks `root` under a purge policy, dropping the entries and subtrees
/// the policy rejects and stopping early if it asks to.
///
/// `purge_kv` is consulted for every leaf entry not already skipped by an
/// enclosing `Keep`/`Purge` decision on its containing subtree.
/// `purge_kp` is consulted for every interior entry (whole subtree)
/// before it is read; [`PurgeKpDecision::Keep`] and
/// [`PurgeKpDecision::Purge`] both avoid reading the subtree at all,
/// mirroring modify's copy-on-write fast path.
///
/// An empty tree (`root = None`) is a no-op. Root `reduce`/`rereduce`
/// follow the same flush-time computation as [`crate::modify::modify`].
///
/// # Errors
///
/// Returns [`Error::PurgingDisabled`] unless
/// [`TreeConfig::enable_purging`] is set on `config`. Otherwise propagates
/// I/O, decode, and callback errors. A decode failure always aborts the
/// call; purge has no corruption-tolerance mode of its own (that's a
/// lookup-only concept).
pub fn purge<F: TreeFile>(
    file: &F,
    root: Option<NodePointer>,
    compare: impl Fn(&[u8], &[u8]) -> std::cmp::Ordering,
    reduce: impl Fn(&[(Slice, Slice)]) -> Result<Slice>,
    rereduce: impl Fn(&[Slice]) -> Result<Slice>,
    config: &TreeConfig,
    mut purge_kp: impl FnMut(&NodePointer) -> Result<PurgeKpDecision>,
    mut purge_kv: impl FnMut(&Slice, &Slice) -> Result<PurgeKvDecision>,
) -> Result<Option<NodePointer>> {
    if !config.enable_purging {
        return Err(Error::PurgingDisabled);
    }

    if config.compacting {
        log::debug!("purge: running under a compacting config");
    }

    let Some(root) = root else {
        return Ok(None);
    };

    let ctx: ModifyCtx<'_, F> = ModifyCtx {
        file,
        compare: &compare as &CompareFn<'_>,
        reduce: &reduce as &ReduceFn<'_>,
        rereduce: &rereduce as &RereduceFn<'_>,
        config,
    };

    let outcome = purge_subtree(&ctx, &root, &mut purge_kp, &mut purge_kv)?;
    if !outcome.changed {
        return Ok(Some(root));
    }

    let level = modify::promote(file, outcome.entries, &rereduce, config.kp_chunk_threshold)?;
    Ok(level.into_iter().next().map(|(_, pointer)| pointer))
}
