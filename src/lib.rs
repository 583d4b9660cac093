// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A copy-on-write, reduce-annotated B+tree engine over an append-only file.
//!
//! ##### NOTE
//!
//! > This crate implements the B+tree engine only: the on-disk node codec,
//! > and the lookup/modify/guided-purge traversals over it. It does not
//! > ship a document store, a vBucket router, or a write-ahead log — those
//! > are callers' concerns, built on top of the [`TreeFile`] contract this
//! > crate consumes.
//!
//! ##### About
//!
//! The tree is never mutated in place. Every [`modify`] or [`purge`] call
//! reads only the nodes its action batch or policy actually touches,
//! appends new nodes for the rewritten spine, and returns a new root
//! [`NodePointer`] — every node reachable from an old root stays valid for
//! as long as a reader holds it. Interior nodes additionally carry a
//! caller-defined *reduce value*: an opaque summary of the subtree below
//! them, recomputed bottom-up on every rewrite, so range-count/aggregate
//! queries can stop at an interior node without visiting its leaves.
//!
//! # Example usage
//!
//! ```
//! use vbtree::{file::AppendOnlyFile, Action, Slice, TreeConfig};
//! #
//! # let folder = tempfile::tempdir()?;
//! let file = AppendOnlyFile::create(folder.path().join("tree.db"))?;
//! let compare = |a: &[u8], b: &[u8]| a.cmp(b);
//!
//! // The reduce value here is just an entry count; a real caller might
//! // track a checksum, a byte total, or a secondary aggregate.
//! let reduce = |entries: &[(Slice, Slice)]| -> vbtree::Result<Slice> {
//!     Ok(Slice::from((entries.len() as u64).to_be_bytes().to_vec()))
//! };
//! let rereduce = |values: &[Slice]| -> vbtree::Result<Slice> {
//!     let total: u64 = values
//!         .iter()
//!         .map(|v| u64::from_be_bytes(v.as_ref().try_into().unwrap()))
//!         .sum();
//!     Ok(Slice::from(total.to_be_bytes().to_vec()))
//! };
//!
//! let actions = vec![
//!     Action::Insert(Slice::from("k01"), Slice::from("v01")),
//!     Action::Insert(Slice::from("k02"), Slice::from("v02")),
//! ];
//!
//! let root = vbtree::modify(
//!     &file,
//!     None,
//!     &actions,
//!     compare,
//!     reduce,
//!     rereduce,
//!     &TreeConfig::default(),
//!     |_, _| Ok(()),
//! )?;
//!
//! // The new root's reduce value reflects both inserted entries.
//! let root = root.expect("non-empty tree has a root");
//! assert_eq!(root.reduce_value.as_ref(), 2u64.to_be_bytes());
//! # Ok::<(), vbtree::Error>(())
//! ```

#![doc(html_logo_url = "https://raw.githubusercontent.com/vbtree-rs/vbtree/main/logo.png")]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/vbtree-rs/vbtree/main/logo.png")]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod action;

#[doc(hidden)]
pub mod arena;

mod binary_search;
mod callback;
mod checksum;
mod coding;
mod config;
mod error;

#[doc(hidden)]
pub mod file;

mod lookup;
mod modify;
mod node;
mod purge;
mod slice;

pub use {
    action::Action,
    callback::{CompareFn, ReduceFn, RereduceFn},
    config::{
        TreeConfig, DEFAULT_KP_CHUNK_THRESHOLD, DEFAULT_KV_CHUNK_THRESHOLD, MAX_REDUCTION_SIZE,
    },
    error::{Error, Result},
    file::TreeFile,
    lookup::{lookup, LookupMode, LookupRequest},
    modify::modify,
    node::{decode_node, encode_kp_node, encode_kv_node, Node, NodePointer},
    purge::{purge, PurgeKpDecision, PurgeKvDecision},
    slice::Slice,
};

#[doc(hidden)]
pub use checksum::Checksum;
