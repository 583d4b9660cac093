// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Slice;

/// One entry of a modify batch.
///
/// A tagged variant replaces the untyped-union-plus-type-tag shape found
/// in C implementations of the same idea (a buffer pointer for inserts, an
/// opaque argument pointer for fetches): no loss of expressiveness, and the
/// compiler checks that each variant only carries the fields it needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write `key => value`, replacing any existing entry for `key`.
    Insert(Slice, Slice),

    /// Remove any existing entry for `key`.
    Remove(Slice),

    /// Look up the current value for `key` without modifying the tree.
    Fetch(Slice),
}

impl Action {
    /// The key this action applies to.
    #[must_use]
    pub fn key(&self) -> &Slice {
        match self {
            Self::Insert(k, _) => k,
            Self::Remove(k) => k,
            Self::Fetch(k) => k,
        }
    }

    /// `true` for [`Action::Insert`] and [`Action::Remove`] — actions that
    /// can change the tree's persisted content. `false` for
    /// [`Action::Fetch`].
    #[must_use]
    pub fn mutates(&self) -> bool {
        matches!(self, Self::Insert(..) | Self::Remove(..))
    }
}
