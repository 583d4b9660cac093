// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `tree_file` abstraction the B+tree engine is built against.
//!
//! The storage format a `tree_file` enforces — length-prefixed, checksummed
//! chunks — is treated as an external collaborator: the engine assumes it,
//! it doesn't implement it. [`TreeFile`] is that contract.
//! [`AppendOnlyFile`] is a concrete, checksummed implementation so the
//! engine can be exercised end-to-end; it carries no invariants beyond
//! framing and checksum.

use crate::{checksum::Checksum, Error, Result, Slice};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

/// Byte-range reads and append-only writes over a persistent file.
///
/// Every chunk handed back by [`TreeFile::read_chunk`] is the exact byte
/// sequence that was passed to [`TreeFile::append_chunk`] at that offset;
/// the file layer is responsible for framing (length prefix) and integrity
/// (checksum)
pub trait TreeFile {
    /// Reads back a previously-appended chunk at `offset`.
    fn read_chunk(&self, offset: u64) -> Result<Slice>;

    /// Appends `bytes` to the file, returning the offset at which the
    /// chunk now starts.
    fn append_chunk(&self, bytes: &[u8]) -> Result<u64>;

    /// Total number of bytes persisted so far. Used for space accounting
    /// (`subtree_size` bookkeeping in tests) and not by the engine itself.
    fn len(&self) -> Result<u64>;

    /// Returns `true` if no chunk has ever been appended.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A disk-backed [`TreeFile`] that frames every chunk as
/// `<len:u32><checksum:u128><payload>` and validates the checksum on read.
pub struct AppendOnlyFile {
    inner: Mutex<File>,
}

impl AppendOnlyFile {
    /// Creates a fresh, empty backing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            inner: Mutex::new(file),
        })
    }

    /// Opens an existing backing file at `path` for continued appends.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            inner: Mutex::new(file),
        })
    }
}

impl TreeFile for AppendOnlyFile {
    fn read_chunk(&self, offset: u64) -> Result<Slice> {
        let mut file = self.inner.lock().expect("lock is poisoned");

        file.seek(SeekFrom::Start(offset))?;

        let len = file.read_u32::<BigEndian>()?;
        let expected = file.read_u128::<BigEndian>()?;

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        let got = Checksum::of(&payload);
        got.check(Checksum::from_raw(expected))?;

        Ok(Slice::from(payload))
    }

    fn append_chunk(&self, bytes: &[u8]) -> Result<u64> {
        let mut file = self.inner.lock().expect("lock is poisoned");

        let offset = file.seek(SeekFrom::End(0))?;

        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Decode(crate::coding::DecodeError::Corrupt("chunk too large")))?;
        let checksum = Checksum::of(bytes);

        file.write_u32::<BigEndian>(len)?;
        file.write_u128::<BigEndian>(checksum.into_u128())?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(offset)
    }

    fn len(&self) -> Result<u64> {
        let file = self.inner.lock().expect("lock is poisoned");
        Ok(file.metadata()?.len())
    }
}

/// An in-memory [`TreeFile`], for fast unit and property tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct MemTreeFile {
    bytes: Mutex<Vec<u8>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MemTreeFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MemTreeFile {
    /// Creates a new, empty in-memory file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TreeFile for MemTreeFile {
    fn read_chunk(&self, offset: u64) -> Result<Slice> {
        let bytes = self.bytes.lock().expect("lock is poisoned");
        let offset = offset as usize;

        let mut cursor = bytes
            .get(offset..)
            .ok_or(Error::Decode(crate::coding::DecodeError::Corrupt(
                "chunk offset out of bounds",
            )))?;

        let len = cursor.read_u32::<BigEndian>()? as usize;
        let expected = cursor.read_u128::<BigEndian>()?;

        let payload = cursor
            .get(..len)
            .ok_or(Error::Decode(crate::coding::DecodeError::Corrupt(
                "chunk payload truncated",
            )))?;

        let got = Checksum::of(payload);
        got.check(Checksum::from_raw(expected))?;

        Ok(Slice::from(payload))
    }

    fn append_chunk(&self, bytes: &[u8]) -> Result<u64> {
        let mut buf = self.bytes.lock().expect("lock is poisoned");
        let offset = buf.len() as u64;

        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Decode(crate::coding::DecodeError::Corrupt("chunk too large")))?;
        let checksum = Checksum::of(bytes);

        buf.write_u32::<BigEndian>(len)?;
        buf.write_u128::<BigEndian>(checksum.into_u128())?;
        buf.write_all(bytes)?;

        Ok(offset)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.bytes.lock().expect("lock is poisoned").len() as u64)
    }
}
