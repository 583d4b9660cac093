//! Shared fixtures for the integration tests in this directory.

use std::cmp::Ordering;
use vbtree::{Action, Result, Slice};

pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// A reduce function that counts entries, so `rereduce` can sum counts
/// bottom-up and a caller can sanity-check a subtree's size without
/// visiting its leaves.
pub fn reduce(entries: &[(Slice, Slice)]) -> Result<Slice> {
    Ok(Slice::from((entries.len() as u64).to_be_bytes().to_vec()))
}

pub fn rereduce(values: &[Slice]) -> Result<Slice> {
    let total: u64 = values
        .iter()
        .map(|v| u64::from_be_bytes(v.as_ref().try_into().expect("reduce value is 8 bytes")))
        .sum();
    Ok(Slice::from(total.to_be_bytes().to_vec()))
}

pub fn reduce_count(value: &Slice) -> u64 {
    u64::from_be_bytes(value.as_ref().try_into().expect("reduce value is 8 bytes"))
}

pub fn key(i: usize) -> Slice {
    Slice::from(format!("k{i:05}").into_bytes())
}

pub fn value(i: usize) -> Slice {
    Slice::from(format!("v{i:05}").into_bytes())
}

pub fn insert_actions(ids: impl IntoIterator<Item = usize>) -> Vec<Action> {
    ids.into_iter().map(|i| Action::Insert(key(i), value(i))).collect()
}
