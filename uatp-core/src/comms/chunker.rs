// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Turning messages into chunk sequences and chunk sequences back into
//! messages.

use std::io::{Read, Write};

use log::{debug, error};

use uatp_crypto::SecurityPolicy;
use uatp_types::{
    BinaryDecodable, BinaryEncodable, EncodingResult, Error, NodeId, ObjectId, StatusCode,
};

use crate::Message;

use super::{
    message_chunk::{MessageChunk, MessageChunkType, MessageIsFinalType},
    secure_channel::SecureChannel,
};

/// `Read` over a sequence of chunks. Feeds the decoder the concatenated
/// chunk bodies without ever materializing the full message, stepping to
/// the next chunk as the previous one runs dry.
struct ReceiveStream<'a, T> {
    buffer: &'a [u8],
    channel: &'a SecureChannel,
    items: T,
    num_items: usize,
    pos: usize,
    index: usize,
}

impl<'a, T: Iterator<Item = &'a MessageChunk>> ReceiveStream<'a, T> {
    fn expected_final_type(index: usize, num_items: usize) -> MessageIsFinalType {
        if index == num_items - 1 {
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        }
    }

    fn body_of(
        chunk: &'a MessageChunk,
        channel: &SecureChannel,
        index: usize,
        num_items: usize,
    ) -> Result<&'a [u8], Error> {
        let chunk_info = chunk.chunk_info(channel)?;
        if chunk_info.message_header.is_final != Self::expected_final_type(index, num_items) {
            return Err(Error::new(
                StatusCode::BadDecodingError,
                "Chunk continuation byte does not match its position in the sequence",
            ));
        }
        let body_start = chunk_info.body_offset;
        let body_end = body_start + chunk_info.body_length;
        Ok(&chunk.data[body_start..body_end])
    }

    pub fn new(channel: &'a SecureChannel, mut items: T, num_items: usize) -> Result<Self, Error> {
        let Some(chunk) = items.next() else {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                "Stream contained no chunks",
            ));
        };
        let buffer = Self::body_of(chunk, channel, 0, num_items)?;
        Ok(Self {
            buffer,
            channel,
            items,
            num_items,
            pos: 0,
            index: 0,
        })
    }
}

impl<'a, T: Iterator<Item = &'a MessageChunk>> Read for ReceiveStream<'a, T> {
    fn read(&mut self, mut buf: &mut [u8]) -> std::io::Result<usize> {
        if self.buffer.len() == self.pos {
            let Some(chunk) = self.items.next() else {
                return Ok(0);
            };
            self.index += 1;
            self.buffer = Self::body_of(chunk, self.channel, self.index, self.num_items)
                .map_err(std::io::Error::other)?;
            self.pos = 0;
        }
        let written = buf.write(&self.buffer[self.pos..])?;
        self.pos += written;
        Ok(written)
    }
}

/// `Write` that seals a chunk whenever the current chunk body fills up and
/// continues the encoding into a fresh buffer. This is what lets the
/// encoder emit a message larger than a single send buffer without ever
/// holding the whole encoded form: the encoder writes as if into one
/// stream, the stream exchanges buffers underneath it at chunk boundaries.
struct ChunkingStream<'a> {
    secure_channel: &'a SecureChannel,
    chunks: Vec<MessageChunk>,
    expected_chunk_count: usize,
    max_body_per_chunk: usize,
    next_buf: Vec<u8>,
    buf_position: usize,
    is_closed: bool,
    sequence_number: u32,
    request_id: u32,
    message_size: usize,
    message_type: MessageChunkType,
}

impl<'a> ChunkingStream<'a> {
    pub fn new(
        message_type: MessageChunkType,
        secure_channel: &'a SecureChannel,
        max_chunk_size: usize,
        message_size: usize,
        request_id: u32,
        request_handle: u32,
        sequence_number: u32,
    ) -> Result<Self, Error> {
        let (expected_chunk_count, max_body_per_chunk) = if max_chunk_size > 0 {
            let max_body_per_chunk = MessageChunk::body_size_from_message_size(
                message_type,
                secure_channel,
                max_chunk_size,
            )
            .map_err(|_| {
                Error::new(
                    StatusCode::BadTcpInternalError,
                    format!(
                        "Cannot compute a chunk body size for max_chunk_size {}",
                        max_chunk_size
                    ),
                )
                .with_context(
                    Some(request_id),
                    (request_handle > 0).then_some(request_handle),
                )
            })?;
            (message_size.div_ceil(max_body_per_chunk).max(1), max_body_per_chunk)
        } else {
            (1, 0)
        };
        let next_buf_size = if expected_chunk_count == 1 {
            message_size
        } else {
            max_body_per_chunk
        };
        Ok(Self {
            secure_channel,
            chunks: Vec::with_capacity(expected_chunk_count),
            expected_chunk_count,
            max_body_per_chunk,
            next_buf: vec![0; next_buf_size],
            buf_position: 0,
            is_closed: false,
            sequence_number,
            request_id,
            message_type,
            message_size,
        })
    }

    // Seal the filled buffer into a chunk and open the next buffer, sized
    // to the remaining message.
    fn flush_chunk(&mut self) -> EncodingResult<()> {
        if self.is_closed {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.next_buf);
        let is_final = if self.chunks.len() == self.expected_chunk_count - 1 {
            self.is_closed = true;
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        };

        // Chunks of one message carry consecutive sequence numbers
        let chunk = MessageChunk::new(
            self.sequence_number.wrapping_add(self.chunks.len() as u32),
            self.request_id,
            self.message_type,
            is_final,
            self.secure_channel,
            &buf,
        )?;
        self.chunks.push(chunk);

        if !self.is_closed {
            let next_buf_size = if self.chunks.len() == self.expected_chunk_count - 1 {
                self.message_size - (self.expected_chunk_count - 1) * self.max_body_per_chunk
            } else {
                self.max_body_per_chunk
            };
            self.next_buf = vec![0; next_buf_size];
            self.buf_position = 0;
        }
        Ok(())
    }

    fn finish(self) -> EncodingResult<Vec<MessageChunk>> {
        if !self.is_closed {
            return Err(Error::encoding(
                "Message did not encode to the expected size",
            ));
        }
        Ok(self.chunks)
    }
}

impl Write for ChunkingStream<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.is_closed {
            return Ok(0);
        }
        let to_copy = buf.len().min(self.next_buf.len() - self.buf_position);
        self.next_buf[self.buf_position..(self.buf_position + to_copy)]
            .copy_from_slice(&buf[..to_copy]);
        self.buf_position += to_copy;
        if self.buf_position == self.next_buf.len() {
            self.flush_chunk()?;
        }
        Ok(to_copy)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_chunk()?;
        Ok(())
    }
}

/// Turns messages into chunks and chunks into messages.
pub struct Chunker;

impl Chunker {
    /// Check that a chunk sequence has the expected channel id, that
    /// sequence numbers start at or above `starting_sequence_number` and
    /// increase by exactly one per chunk, and that every chunk shares the
    /// first chunk's request id. Returns the last sequence number.
    ///
    /// Sequence numbers may wrap at `u32::MAX`, the successor of a value
    /// near the maximum restarts below 1024.
    pub fn validate_chunks(
        starting_sequence_number: u32,
        secure_channel: &SecureChannel,
        chunks: &[MessageChunk],
    ) -> Result<u32, Error> {
        let first_sequence_number = {
            let chunk_info = chunks[0].chunk_info(secure_channel)?;
            chunk_info.sequence_header.sequence_number
        };
        if !sequence_number_follows(starting_sequence_number, first_sequence_number) {
            return Err(Error::new(
                StatusCode::BadSequenceNumberInvalid,
                format!(
                    "First sequence number {} is less than expected value {}",
                    first_sequence_number, starting_sequence_number
                ),
            ));
        }

        let secure_channel_id = secure_channel.secure_channel_id();
        let mut expected_request_id: u32 = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(secure_channel)?;

            if secure_channel_id != 0
                && chunk_info.message_header.secure_channel_id != secure_channel_id
            {
                return Err(Error::new(
                    StatusCode::BadSecureChannelIdInvalid,
                    format!(
                        "Secure channel id {} does not match expected id {}",
                        chunk_info.message_header.secure_channel_id, secure_channel_id
                    ),
                ));
            }

            let sequence_number = chunk_info.sequence_header.sequence_number;
            let expected_sequence_number = first_sequence_number.wrapping_add(i as u32);
            if sequence_number != expected_sequence_number {
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    format!(
                        "Chunk sequence number {} is not the expected value {}, idx {}",
                        sequence_number, expected_sequence_number, i
                    ),
                ));
            }

            if i == 0 {
                expected_request_id = chunk_info.sequence_header.request_id;
            } else if chunk_info.sequence_header.request_id != expected_request_id {
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    format!(
                        "Chunk {} has request id {}, expected {}",
                        i, chunk_info.sequence_header.request_id, expected_request_id
                    ),
                ));
            }
        }
        Ok(first_sequence_number.wrapping_add(chunks.len() as u32 - 1))
    }

    /// Encode `message` into one or more chunks with consecutive sequence
    /// numbers starting at `sequence_number`, all carrying `request_id`.
    ///
    /// `max_message_size` caps the encoded size of the message,
    /// `max_chunk_size` the size of each chunk; either may be 0 for
    /// unlimited.
    pub fn encode(
        sequence_number: u32,
        request_id: u32,
        max_message_size: usize,
        max_chunk_size: usize,
        secure_channel: &SecureChannel,
        message: &impl Message,
    ) -> Result<Vec<MessageChunk>, Error> {
        if secure_channel.security_policy() == SecurityPolicy::Unknown {
            return Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                "Security policy cannot be unknown",
            ));
        }

        let ctx_id = Some(request_id);
        let handle = message.request_handle();
        let ctx_handle = (handle > 0).then_some(handle);

        let ctx_r = secure_channel.context();
        let ctx = ctx_r.context();

        let mut message_size = message.byte_len(&ctx);
        if max_message_size > 0 && message_size > max_message_size {
            error!(
                "Max message size is {} and message of {} exceeds that",
                max_message_size, message_size
            );
            // The client reports a request too large, the server a
            // response too large
            return Err(Error::new(
                if secure_channel.is_client_role() {
                    StatusCode::BadRequestTooLarge
                } else {
                    StatusCode::BadResponseTooLarge
                },
                format!(
                    "Max message size is {} and message of {} exceeds that",
                    max_message_size, message_size
                ),
            )
            .with_context(ctx_id, ctx_handle));
        }

        // The encoding id travels in front of the body and counts towards
        // the chunked size
        let node_id = message.type_id();
        message_size += node_id.byte_len(&ctx);

        let mut stream = ChunkingStream::new(
            message.message_type(),
            secure_channel,
            max_chunk_size,
            message_size,
            request_id,
            handle,
            sequence_number,
        )?;

        node_id.encode(&mut stream, &ctx)?;
        message
            .encode(&mut stream, &ctx)
            .map_err(|e| e.with_context(ctx_id, ctx_handle))?;
        stream.flush()?;
        stream.finish()
    }

    /// Decode a full chunk sequence into a message. The chunks must be
    /// decrypted, in sequence order, and end with a final chunk.
    pub fn decode<T: Message>(
        chunks: &[MessageChunk],
        secure_channel: &SecureChannel,
        expected_node_id: Option<NodeId>,
    ) -> Result<T, Error> {
        let mut stream = ReceiveStream::new(secure_channel, chunks.iter(), chunks.len())?;

        let ctx_r = secure_channel.context();
        let ctx = ctx_r.context();

        // The message body starts with its encoding id
        let node_id = NodeId::decode(&mut stream, &ctx)?;
        let object_id = Self::object_id_from_node_id(node_id, expected_node_id)?;

        match T::decode_by_object_id(&mut stream, object_id, &ctx) {
            Ok(message) => Ok(message),
            Err(err) => {
                debug!("Cannot decode message {:?}, err = {:?}", object_id, err);
                Err(err)
            }
        }
    }

    fn object_id_from_node_id(
        node_id: NodeId,
        expected_node_id: Option<NodeId>,
    ) -> Result<ObjectId, Error> {
        if let Some(id) = expected_node_id {
            if node_id != id {
                return Err(Error::decoding(format!(
                    "The message id {node_id} is not the expected value {id}"
                )));
            }
        }
        node_id
            .as_object_id()
            .map_err(|_| Error::decoding(format!("The message id {node_id} is not an object id")))
    }
}

// Whether `next` is a legal successor of the last received sequence number
// `prev`, allowing the wrap at the top of the u32 range. Part 6 requires a
// wrapping counter to restart below 1024.
fn sequence_number_follows(prev: u32, next: u32) -> bool {
    next >= prev || (prev > u32::MAX - 1024 && next < 1024)
}
