// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! On-disk node layout, bit-exact:
//!
//! - First byte: `0x00` for KP (interior), `0x01` for KV (leaf).
//! - Entry sequence: repeated `<key_len:12 bits><value_len:28 bits><key><value>`,
//!   the combined 5-byte header packing both lengths big-endian.
//! - For KP, the "value" is a pointer payload
//!   (`<offset:48><subtree_size:48><reduce_len:16><reduce>`, see
//!   [`crate::node::pointer::NodePointer`]).

use super::pointer::NodePointer;
use crate::{coding::DecodeError, Slice};
use byteorder::{BigEndian, ReadBytesExt};

const TAG_KP: u8 = 0x00;
const TAG_KV: u8 = 0x01;

/// Maximum key length representable by the 12-bit length field.
pub const MAX_KEY_LEN: usize = (1 << 12) - 1;

/// Maximum value (or pointer payload) length representable by the 28-bit
/// length field.
pub const MAX_VALUE_LEN: usize = (1 << 28) - 1;

/// A decoded node: either an interior (KP) node of separator/pointer
/// entries, or a leaf (KV) node of key/value entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Interior node: `(last_key_in_subtree, pointer)` entries.
    Kp(Vec<(Slice, NodePointer)>),

    /// Leaf node: `(key, value)` entries.
    Kv(Vec<(Slice, Slice)>),
}

impl Node {
    /// Number of entries in this node.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Kp(entries) => entries.len(),
            Self::Kv(entries) => entries.len(),
        }
    }

    /// Returns `true` if the node has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The largest key held directly in this node (the last entry's key).
    #[must_use]
    pub fn last_key(&self) -> Option<&Slice> {
        match self {
            Self::Kp(entries) => entries.last().map(|(k, _)| k),
            Self::Kv(entries) => entries.last().map(|(k, _)| k),
        }
    }
}

/// Serialized size of one KV entry, including its 5-byte header.
#[must_use]
pub fn kv_entry_size(key_len: usize, value_len: usize) -> usize {
    5 + key_len + value_len
}

/// Serialized size of one KP entry, including its 5-byte header.
#[must_use]
pub fn kp_entry_size(key_len: usize, pointer: &NodePointer) -> usize {
    5 + key_len + pointer.payload_len()
}

/// Serialized size of a KV node with the given entries (includes the
/// 1-byte tag).
#[must_use]
pub fn kv_node_size(entries: &[(Slice, Slice)]) -> usize {
    1 + entries
        .iter()
        .map(|(k, v)| kv_entry_size(k.len(), v.len()))
        .sum::<usize>()
}

/// Serialized size of a KP node with the given entries (includes the
/// 1-byte tag).
#[must_use]
pub fn kp_node_size(entries: &[(Slice, NodePointer)]) -> usize {
    1 + entries
        .iter()
        .map(|(k, p)| kp_entry_size(k.len(), p))
        .sum::<usize>()
}

fn write_entry_header(buf: &mut Vec<u8>, key_len: usize, value_len: usize) -> Result<(), DecodeError> {
    if key_len > MAX_KEY_LEN {
        return Err(DecodeError::Corrupt("key exceeds 12-bit length field"));
    }
    if value_len > MAX_VALUE_LEN {
        return Err(DecodeError::Corrupt("value exceeds 28-bit length field"));
    }

    #[allow(clippy::cast_possible_truncation)]
    let packed: u64 = ((key_len as u64) << 28) | (value_len as u64);
    let be = packed.to_be_bytes();
    // 40 bits = 5 bytes; `packed` only ever occupies the low 40 bits of
    // the 8-byte big-endian representation.
    buf.extend_from_slice(&be[3..]);

    Ok(())
}

fn read_entry_header(cursor: &mut &[u8]) -> Result<(usize, usize), DecodeError> {
    let header = cursor
        .get(..5)
        .ok_or(DecodeError::Corrupt("entry header overruns buffer"))?;
    *cursor = cursor.get(5..).unwrap_or(&[]);

    let mut widened = [0u8; 8];
    widened[3..].copy_from_slice(header);
    let packed = u64::from_be_bytes(widened);

    let key_len = (packed >> 28) as usize;
    let value_len = (packed & 0x0FFF_FFFF) as usize;

    Ok((key_len, value_len))
}

fn take(cursor: &mut &[u8], len: usize) -> Result<Slice, DecodeError> {
    let chunk = cursor
        .get(..len)
        .ok_or(DecodeError::Corrupt("entry payload overruns buffer"))?;
    *cursor = cursor.get(len..).unwrap_or(&[]);
    Ok(Slice::from(chunk))
}

/// Encodes a KV (leaf) node.
///
/// # Errors
///
/// Fails if any key/value exceeds its length field.
pub fn encode_kv_node(entries: &[(Slice, Slice)]) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::with_capacity(kv_node_size(entries));
    buf.push(TAG_KV);

    for (key, value) in entries {
        write_entry_header(&mut buf, key.len(), value.len())?;
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }

    Ok(buf)
}

/// Encodes a KP (interior) node.
///
/// # Errors
///
/// Fails if any key/reduce value exceeds its length field.
pub fn encode_kp_node(entries: &[(Slice, NodePointer)]) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::with_capacity(kp_node_size(entries));
    buf.push(TAG_KP);

    for (key, pointer) in entries {
        let mut payload = Vec::with_capacity(pointer.payload_len());
        pointer.encode_into(&mut payload)?;

        write_entry_header(&mut buf, key.len(), payload.len())?;
        buf.extend_from_slice(key);
        buf.extend_from_slice(&payload);
    }

    Ok(buf)
}

/// Decodes a node (KP or KV) from its on-disk byte representation.
///
/// # Errors
///
/// Returns [`DecodeError::Corrupt`] on an unrecognized tag byte, a length
/// prefix overrunning the buffer, or (for KP nodes) a pointer whose
/// reduce value exceeds [`crate::config::MAX_REDUCTION_SIZE`].
pub fn decode_node(buf: &[u8]) -> Result<Node, DecodeError> {
    let mut cursor = buf;

    let (&tag, rest) = cursor
        .split_first()
        .ok_or(DecodeError::Corrupt("empty node buffer"))?;
    cursor = rest;

    match tag {
        TAG_KV => {
            let mut entries = Vec::new();
            while !cursor.is_empty() {
                let (key_len, value_len) = read_entry_header(&mut cursor)?;
                let key = take(&mut cursor, key_len)?;
                let value = take(&mut cursor, value_len)?;
                entries.push((key, value));
            }
            Ok(Node::Kv(entries))
        }
        TAG_KP => {
            let mut entries = Vec::new();
            while !cursor.is_empty() {
                let (key_len, payload_len) = read_entry_header(&mut cursor)?;
                let key = take(&mut cursor, key_len)?;
                let payload = take(&mut cursor, payload_len)?;
                let pointer = NodePointer::decode_from_payload(&payload)?;
                entries.push((key, pointer));
            }
            Ok(Node::Kp(entries))
        }
        _ => Err(DecodeError::Corrupt("unrecognized node tag byte")),
    }
}
