// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! [`ChunkInfo`], the parsed headers and body offsets of one chunk.

use std::io::Cursor;

use uatp_types::{EncodingResult, SimpleBinaryDecodable};

use super::{
    message_chunk::{MessageChunk, MessageChunkHeader},
    secure_channel::SecureChannel,
    security_header::{SecurityHeader, SequenceHeader},
};

/// Everything readable from a decrypted chunk's front matter: the three
/// headers and the offsets delimiting them and the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    /// The chunk header.
    pub message_header: MessageChunkHeader,
    /// Asymmetric or symmetric security header, depending on chunk type.
    pub security_header: SecurityHeader,
    /// The sequence header.
    pub sequence_header: SequenceHeader,
    /// Offset of the security header.
    pub security_header_offset: usize,
    /// Offset of the sequence header.
    pub sequence_header_offset: usize,
    /// Offset of the message body.
    pub body_offset: usize,
    /// Length of the message body.
    pub body_length: usize,
}

impl ChunkInfo {
    /// Parse the chunk's headers. The chunk must already be decrypted,
    /// otherwise everything after the security header is garbage.
    pub fn new(chunk: &MessageChunk, secure_channel: &SecureChannel) -> EncodingResult<ChunkInfo> {
        let decoding_options = secure_channel.decoding_options();
        let mut stream = Cursor::new(&chunk.data);

        let message_header = MessageChunkHeader::decode(&mut stream, &decoding_options)?;

        let security_header_offset = stream.position() as usize;
        let security_header = SecurityHeader::decode_from_stream(
            &mut stream,
            message_header.message_type.is_open_secure_channel(),
            &decoding_options,
        )?;

        let sequence_header_offset = stream.position() as usize;
        let sequence_header = SequenceHeader::decode(&mut stream, &decoding_options)?;

        let body_offset = stream.position() as usize;
        let body_length = chunk.data.len() - body_offset;

        Ok(ChunkInfo {
            message_header,
            security_header,
            sequence_header,
            security_header_offset,
            sequence_header_offset,
            body_offset,
            body_length,
        })
    }
}
