// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur in the B+tree engine.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying `tree_file`.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed: a malformed node, an oversized reduce
    /// value, or an inconsistent pointer.
    Decode(DecodeError),

    /// A read chunk's checksum did not match the one recorded when it was
    /// appended.
    InvalidChecksum {
        /// Checksum recorded when the chunk was appended.
        expected: u128,
        /// Checksum recomputed on read.
        got: u128,
    },

    /// An arena allocation could not be satisfied.
    ResourceExhausted,

    /// A caller-supplied callback (`compare`, `reduce`, `rereduce`,
    /// `fetch_callback`, `purge_kp`, `purge_kv`) reported an error.
    Callback(Box<dyn std::error::Error + Send + Sync>),

    /// [`crate::purge`] was called with [`crate::TreeConfig::enable_purging`]
    /// left unset.
    PurgingDisabled,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "VBTreeError::Io({e})"),
            Self::Encode(e) => write!(f, "VBTreeError::Encode({e})"),
            Self::Decode(e) => write!(f, "VBTreeError::Decode({e})"),
            Self::InvalidChecksum { expected, got } => write!(
                f,
                "VBTreeError::InvalidChecksum(expected {expected}, got {got})"
            ),
            Self::ResourceExhausted => write!(f, "VBTreeError::ResourceExhausted"),
            Self::Callback(e) => write!(f, "VBTreeError::Callback({e})"),
            Self::PurgingDisabled => write!(f, "VBTreeError::PurgingDisabled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Callback(e) => Some(e.as_ref()),
            Self::InvalidChecksum { .. } | Self::ResourceExhausted | Self::PurgingDisabled => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// B+tree engine result.
pub type Result<T> = std::result::Result<T, Error>;
