// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A message chunk: one frame of a service message, possibly signed and
//! encrypted, carrying a slice of the message body.

use std::io::{Cursor, Read, Write};

use log::error;
use uatp_types::{
    encoding::{
        process_decode_io_result, process_encode_io_result, read_u32, read_u8, write_u32,
        write_u8, DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable,
    },
    status_code::StatusCode,
    Error,
};

use super::{
    message_chunk_info::ChunkInfo,
    secure_channel::SecureChannel,
    security_header::{SecurityHeader, SequenceHeader},
    tcp_types::{
        CHUNK_FINAL, CHUNK_FINAL_ERROR, CHUNK_INTERMEDIATE, CHUNK_MESSAGE,
        CLOSE_SECURE_CHANNEL_MESSAGE, MIN_CHUNK_SIZE, OPEN_SECURE_CHANNEL_MESSAGE,
    },
};

/// Size of a chunk header: message type, chunk type, size, channel id.
pub const MESSAGE_CHUNK_HEADER_SIZE: usize = 3 + 1 + 4 + 4;

/// Byte offset of the message size within a chunk, right after the type
/// tag and chunk type byte. The size is rewritten in place after padding,
/// signing and encryption change the chunk's length.
pub const MESSAGE_SIZE_OFFSET: usize = 3 + 1;

/// The kind of service message a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageChunkType {
    /// An ordinary service message, MSG.
    Message,
    /// An open secure channel message, OPN.
    OpenSecureChannel,
    /// A close secure channel message, CLO.
    CloseSecureChannel,
}

impl MessageChunkType {
    /// `true` for OPN chunks, which use asymmetric security.
    pub fn is_open_secure_channel(&self) -> bool {
        *self == MessageChunkType::OpenSecureChannel
    }
}

/// Continuation state of a chunk within its message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageIsFinalType {
    /// `C`, more chunks follow.
    Intermediate,
    /// `F`, the last chunk of the message.
    Final,
    /// `A`, the message is aborted, discard what came before.
    FinalError,
}

/// The chunk header: type tags, total size, and the secure channel id.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunkHeader {
    /// The kind of message the chunk belongs to.
    pub message_type: MessageChunkType,
    /// Continuation state of the chunk.
    pub is_final: MessageIsFinalType,
    /// Size of the whole chunk in bytes, header included.
    pub message_size: u32,
    /// Secure channel id, 0 on the initial OPN.
    pub secure_channel_id: u32,
}

impl SimpleBinaryEncodable for MessageChunkHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_CHUNK_HEADER_SIZE
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let message_type = match self.message_type {
            MessageChunkType::Message => CHUNK_MESSAGE,
            MessageChunkType::OpenSecureChannel => OPEN_SECURE_CHANNEL_MESSAGE,
            MessageChunkType::CloseSecureChannel => CLOSE_SECURE_CHANNEL_MESSAGE,
        };
        let is_final = match self.is_final {
            MessageIsFinalType::Intermediate => CHUNK_INTERMEDIATE,
            MessageIsFinalType::Final => CHUNK_FINAL,
            MessageIsFinalType::FinalError => CHUNK_FINAL_ERROR,
        };
        process_encode_io_result(stream.write_all(message_type))?;
        write_u8(stream, is_final)?;
        write_u32(stream, self.message_size)?;
        write_u32(stream, self.secure_channel_id)
    }
}

impl SimpleBinaryDecodable for MessageChunkHeader {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let mut message_type_code = [0u8; 3];
        process_decode_io_result(stream.read_exact(&mut message_type_code))?;
        let message_type = match &message_type_code as &[u8] {
            CHUNK_MESSAGE => MessageChunkType::Message,
            OPEN_SECURE_CHANNEL_MESSAGE => MessageChunkType::OpenSecureChannel,
            CLOSE_SECURE_CHANNEL_MESSAGE => MessageChunkType::CloseSecureChannel,
            r => {
                return Err(Error::decoding(format!("Invalid chunk message type: {r:?}")));
            }
        };
        let is_final = match read_u8(stream)? {
            CHUNK_FINAL => MessageIsFinalType::Final,
            CHUNK_INTERMEDIATE => MessageIsFinalType::Intermediate,
            CHUNK_FINAL_ERROR => MessageIsFinalType::FinalError,
            r => {
                return Err(Error::decoding(format!("Invalid chunk type byte: {r}")));
            }
        };
        Ok(MessageChunkHeader {
            message_type,
            is_final,
            message_size: read_u32(stream)?,
            secure_channel_id: read_u32(stream)?,
        })
    }
}

/// One chunk: the raw bytes including all headers, the body slice, and,
/// when secured, padding and signature. Assembling a message takes every
/// chunk of its request id in sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    /// The chunk's bytes: headers, payload, padding, signature.
    pub data: Vec<u8>,
}

impl SimpleBinaryEncodable for MessageChunk {
    fn byte_len(&self) -> usize {
        self.data.len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        process_encode_io_result(stream.write_all(&self.data))
    }
}

impl SimpleBinaryDecodable for MessageChunk {
    fn decode<S: Read + ?Sized>(
        in_stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let chunk_header = MessageChunkHeader::decode(in_stream, decoding_options).map_err(
            |err| {
                Error::new(
                    StatusCode::BadCommunicationError,
                    format!("Cannot decode chunk header: {err}"),
                )
            },
        )?;
        let message_size = chunk_header.message_size as usize;
        if decoding_options.max_message_size > 0
            && message_size > decoding_options.max_message_size
        {
            return Err(Error::new(
                StatusCode::BadTcpMessageTooLarge,
                format!(
                    "Chunk size {} exceeds max message size {}",
                    message_size, decoding_options.max_message_size
                ),
            ));
        }
        // Write the header back into the buffer, then fill the rest of the
        // chunk from the stream
        let mut stream = Cursor::new(vec![0u8; message_size]);
        let chunk_header_size = chunk_header.byte_len();
        chunk_header.encode(&mut stream)?;
        let mut data = stream.into_inner();
        process_decode_io_result(in_stream.read_exact(&mut data[chunk_header_size..]))?;
        Ok(MessageChunk { data })
    }
}

/// Error returned when a maximum chunk size is too small to fit headers,
/// padding and signature. Indicates misconfiguration elsewhere.
#[derive(Debug)]
pub struct MessageChunkTooSmall;

impl MessageChunk {
    /// Build an unsecured chunk around `data`. Padding and signature are
    /// applied later by [`SecureChannel::apply_security`].
    pub fn new(
        sequence_number: u32,
        request_id: u32,
        message_type: MessageChunkType,
        is_final: MessageIsFinalType,
        secure_channel: &SecureChannel,
        data: &[u8],
    ) -> EncodingResult<MessageChunk> {
        let security_header = secure_channel.make_security_header(message_type);
        let sequence_header = SequenceHeader {
            sequence_number,
            request_id,
        };

        let message_size = MESSAGE_CHUNK_HEADER_SIZE
            + security_header.byte_len()
            + sequence_header.byte_len()
            + data.len();

        let chunk_header = MessageChunkHeader {
            message_type,
            is_final,
            message_size: message_size as u32,
            secure_channel_id: secure_channel.secure_channel_id(),
        };

        let mut buf = vec![0u8; message_size];
        let mut stream = Cursor::new(&mut buf as &mut [u8]);
        chunk_header.encode(&mut stream)?;
        security_header.encode(&mut stream)?;
        sequence_header.encode(&mut stream)?;
        process_encode_io_result(stream.write_all(data))?;

        Ok(MessageChunk { data: buf })
    }

    /// The largest body that fits into a chunk of `max_chunk_size` bytes,
    /// accounting for headers, signature and padding under the channel's
    /// current security settings.
    pub fn body_size_from_message_size(
        message_type: MessageChunkType,
        secure_channel: &SecureChannel,
        max_chunk_size: usize,
    ) -> Result<usize, MessageChunkTooSmall> {
        if max_chunk_size < MIN_CHUNK_SIZE {
            error!(
                "Chunk size {} is less than the minimum the standard allows",
                max_chunk_size
            );
            return Err(MessageChunkTooSmall);
        }
        let security_header = secure_channel.make_security_header(message_type);

        let mut header_size = MESSAGE_CHUNK_HEADER_SIZE;
        header_size += security_header.byte_len();
        header_size += SequenceHeader {
            sequence_number: 0,
            request_id: 0,
        }
        .byte_len();

        let signature_size = secure_channel.signature_size(&security_header);
        let (plain_text_block_size, minimum_padding) =
            secure_channel.get_padding_block_sizes(&security_header, signature_size, message_type);

        // Encryption requires whole blocks, round the chunk down to the
        // nearest block boundary before deducting the overheads.
        let aligned_max_chunk_size = if plain_text_block_size > 0 {
            max_chunk_size - (max_chunk_size % plain_text_block_size)
        } else {
            max_chunk_size
        };

        Ok(aligned_max_chunk_size - header_size - signature_size - minimum_padding)
    }

    /// Decode this chunk's header.
    pub fn message_header(
        &self,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<MessageChunkHeader> {
        let mut stream = Cursor::new(&self.data);
        MessageChunkHeader::decode(&mut stream, decoding_options)
    }

    /// True when this chunk is part of an OPN message.
    pub fn is_open_secure_channel(&self, decoding_options: &DecodingOptions) -> bool {
        self.message_header(decoding_options)
            .map(|h| h.message_type.is_open_secure_channel())
            .unwrap_or(false)
    }

    /// Decode offsets and headers for this chunk. The chunk must be
    /// decrypted first, the values are garbage otherwise.
    pub fn chunk_info(&self, secure_channel: &SecureChannel) -> EncodingResult<ChunkInfo> {
        ChunkInfo::new(self, secure_channel)
    }

    pub(crate) fn encrypted_data_offset(
        &self,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<usize> {
        // The encrypted region starts after the security header
        let mut stream = Cursor::new(&self.data);
        let message_header = MessageChunkHeader::decode(&mut stream, decoding_options)?;
        SecurityHeader::decode_from_stream(
            &mut stream,
            message_header.message_type.is_open_secure_channel(),
            decoding_options,
        )?;
        Ok(stream.position() as usize)
    }
}
