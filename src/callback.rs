// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared callback types for the lookup, modify, and purge engines.
//!
//! Plain Rust closures stand in for function-pointer-plus-context-argument
//! callbacks. These aliases name the shapes used across more than one
//! engine so callers aren't stuck writing the same `dyn Fn` signature out
//! by hand at every call site.

use crate::{Result, Slice};
use std::cmp::Ordering;

/// Orders two raw keys. The same ordering must be used consistently across
/// a tree's lifetime; the engines never invent their own.
pub type CompareFn<'a> = dyn Fn(&[u8], &[u8]) -> Ordering + 'a;

/// Summarizes a freshly-flushed leaf's entries into a reduce value.
pub type ReduceFn<'a> = dyn Fn(&[(Slice, Slice)]) -> Result<Slice> + 'a;

/// Summarizes a freshly-flushed interior node's children's reduce values
/// into this node's own reduce value.
pub type RereduceFn<'a> = dyn Fn(&[Slice]) -> Result<Slice> + 'a;
