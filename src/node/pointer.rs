// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{coding::DecodeError, config::MAX_REDUCTION_SIZE, Slice};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// A persistent descriptor of a subtree: the file offset of the pointed
/// node, the total live size of the subtree in bytes, and an opaque
/// reduce value summarizing it. Interior (KP) node entries hold these;
/// every modify/purge call also returns one as the new root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePointer {
    /// File offset of the pointed-to node.
    pub offset: u64,

    /// Total persisted byte size of the subtree rooted at this pointer.
    pub subtree_size: u64,

    /// Opaque, caller-defined summary of the subtree (`reduce`/`rereduce`
    /// output). Bounded to [`MAX_REDUCTION_SIZE`] bytes.
    pub reduce_value: Slice,
}

impl NodePointer {
    /// Size in bytes of the on-disk pointer payload (excludes the
    /// separator key and the shared 5-byte entry header).
    #[must_use]
    pub fn payload_len(&self) -> usize {
        6 + 6 + 2 + self.reduce_value.len()
    }

    /// Encodes the pointer payload: `<offset:48><subtree_size:48><reduce_len:16><reduce>`.
    ///
    /// # Errors
    ///
    /// Fails if `reduce_value` exceeds [`MAX_REDUCTION_SIZE`].
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), DecodeError> {
        if self.reduce_value.len() > MAX_REDUCTION_SIZE {
            return Err(DecodeError::Corrupt("reduce value exceeds 65535 bytes"));
        }

        write_u48(writer, self.offset)?;
        write_u48(writer, self.subtree_size)?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(self.reduce_value.len() as u16)?;
        writer.write_all(&self.reduce_value)?;

        Ok(())
    }

    /// Decodes a pointer payload (the value half of a KP entry).
    ///
    /// Standalone pointer-decode helper:
    /// callers that have already split a KP entry into `(key, payload)`
    /// (e.g. a root descriptor read from an external manifest) can decode
    /// just the payload without going through the full node codec.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Corrupt`] if the buffer is short or the
    /// encoded reduce length overruns it.
    pub fn decode_from_payload(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = buf;

        let offset = read_u48(&mut cursor)?;
        let subtree_size = read_u48(&mut cursor)?;
        let reduce_len = cursor.read_u16::<BigEndian>()? as usize;

        let reduce_value = cursor
            .get(..reduce_len)
            .ok_or(DecodeError::Corrupt("pointer reduce value overruns buffer"))?;

        Ok(Self {
            offset,
            subtree_size,
            reduce_value: Slice::from(reduce_value),
        })
    }
}

fn write_u48<W: Write>(writer: &mut W, value: u64) -> std::io::Result<()> {
    debug_assert!(value < (1u64 << 48), "value does not fit in 48 bits");
    let bytes = value.to_be_bytes();
    // `to_be_bytes` on a u64 yields 8 bytes; the top 48 bits are the
    // trailing 6 bytes once the leading 2 (always-zero) bytes are dropped.
    writer.write_all(&bytes[2..])
}

fn read_u48(cursor: &mut &[u8]) -> Result<u64, DecodeError> {
    let bytes = cursor
        .get(..6)
        .ok_or(DecodeError::Corrupt("48-bit integer overruns buffer"))?;
    *cursor = cursor.get(6..).unwrap_or(&[]);

    let mut widened = [0u8; 8];
    widened[2..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(widened))
}
