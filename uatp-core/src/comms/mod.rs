// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Everything between raw bytes and decoded service messages.

pub mod buffer;
pub mod chunker;
pub mod message_chunk;
pub mod message_chunk_info;
pub mod secure_channel;
pub mod security_header;
pub mod tcp_codec;
pub mod tcp_types;
pub mod url;
