// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The node codec: KP (interior) and KV (leaf) node
//! encoding/decoding, and the [`NodePointer`] descriptor.

pub mod codec;
pub mod pointer;

pub use codec::{decode_node, encode_kp_node, encode_kv_node, Node};
pub use pointer::NodePointer;
