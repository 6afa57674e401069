// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The outbound send buffer: messages in, secured chunks out.

use std::collections::VecDeque;
use std::io::Cursor;

use log::trace;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uatp_types::{Error, StatusCode};

use crate::Message;

use super::{chunker::Chunker, message_chunk::MessageChunk, secure_channel::SecureChannel};

// A wrapping sequence counter restarts below 1024 after the top of the
// u32 range.
const SEQUENCE_NUMBER_WRAP: u32 = 1;

/// Queues outbound messages as chunks and secures them one at a time into
/// a write buffer sized to the negotiated send buffer.
///
/// Writing a message performs the chunking immediately, assigning the
/// chunk sequence numbers; applying security is deferred until the chunk
/// is about to go out, so chunks always hit the wire in sequence order
/// with the keys current at send time.
pub struct SendBuffer {
    /// The negotiated maximum size of a single chunk.
    send_buffer_size: usize,
    /// The negotiated maximum size of a whole message, 0 for no limit.
    max_message_size: usize,
    /// The negotiated maximum number of chunks per message, 0 for none.
    max_chunk_count: usize,
    /// Secured bytes of the chunk currently being written to the stream.
    buffer: Cursor<Vec<u8>>,
    /// Chunks awaiting security and transmission.
    chunks: VecDeque<MessageChunk>,
    last_sent_sequence_number: u32,
}

impl SendBuffer {
    /// Create a send buffer with the local limits. Call
    /// [`SendBuffer::revise`] once the peer's limits are known.
    pub fn new(
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> SendBuffer {
        SendBuffer {
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            buffer: Cursor::new(Vec::new()),
            chunks: VecDeque::new(),
            // The OPC UA part 6 "first sequence number" can be anything,
            // starting at 0 keeps traces easy to read
            last_sent_sequence_number: 0,
        }
    }

    /// Apply the peer's advertised limits: each effective limit is the
    /// minimum of ours and theirs (0 counts as unlimited).
    pub fn revise(
        &mut self,
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) {
        if send_buffer_size > 0 {
            self.send_buffer_size = self.send_buffer_size.min(send_buffer_size);
        }
        if max_message_size > 0 {
            self.max_message_size = if self.max_message_size == 0 {
                max_message_size
            } else {
                self.max_message_size.min(max_message_size)
            };
        }
        if max_chunk_count > 0 {
            self.max_chunk_count = if self.max_chunk_count == 0 {
                max_chunk_count
            } else {
                self.max_chunk_count.min(max_chunk_count)
            };
        }
    }

    /// The effective maximum chunk size.
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    /// The sequence number of the last chunk handed to the wire.
    pub fn last_sent_sequence_number(&self) -> u32 {
        self.last_sent_sequence_number
    }

    fn next_sequence_number(&self) -> u32 {
        if self.last_sent_sequence_number == u32::MAX {
            SEQUENCE_NUMBER_WRAP
        } else {
            self.last_sent_sequence_number + 1
        }
    }

    /// Chunk `message` under `request_id` and queue the chunks. Returns
    /// the request id for convenience.
    pub fn write(
        &mut self,
        request_id: u32,
        message: impl Message,
        secure_channel: &SecureChannel,
    ) -> Result<u32, Error> {
        trace!("Writing request {}", request_id);
        let first_sequence_number = self.next_sequence_number();
        let chunks = Chunker::encode(
            first_sequence_number,
            request_id,
            self.max_message_size,
            self.send_buffer_size,
            secure_channel,
            &message,
        )?;
        if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
            return Err(Error::new(
                StatusCode::BadCommunicationError,
                format!(
                    "Message encoded to {} chunks, the peer accepts {}",
                    chunks.len(),
                    self.max_chunk_count
                ),
            )
            .with_context(
                Some(request_id),
                (message.request_handle() > 0).then_some(message.request_handle()),
            ));
        }
        self.last_sent_sequence_number =
            first_sequence_number.wrapping_add(chunks.len() as u32 - 1);
        self.chunks.extend(chunks);
        Ok(request_id)
    }

    /// True when a chunk is queued and the write buffer is drained, so
    /// the next chunk can be secured.
    pub fn should_encode_chunks(&self) -> bool {
        !self.chunks.is_empty() && !self.can_read()
    }

    /// Secure the next queued chunk into the write buffer.
    pub fn encode_next_chunk(&mut self, secure_channel: &SecureChannel) -> Result<(), Error> {
        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(());
        };
        // Secured chunks can be larger than their plain form, the security
        // math guarantees they still fit the negotiated chunk size
        let mut out = vec![0u8; self.send_buffer_size];
        let size = secure_channel.apply_security(&chunk, &mut out)?;
        out.truncate(size);
        self.buffer = Cursor::new(out);
        Ok(())
    }

    /// True when secured bytes are waiting to be written to the stream.
    pub fn can_read(&self) -> bool {
        (self.buffer.position() as usize) < self.buffer.get_ref().len()
    }

    /// Write the remaining secured bytes to the stream.
    pub async fn read_into_async<W: AsyncWrite + Unpin>(
        &mut self,
        write: &mut W,
    ) -> std::io::Result<()> {
        let pos = self.buffer.position() as usize;
        let data = &self.buffer.get_ref()[pos..];
        let written = write.write(data).await?;
        self.buffer.set_position((pos + written) as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SendBuffer;

    #[test]
    fn limits_are_revised_to_the_minimum() {
        // The values of a HEL carrying (8192, 8192, 16384, 1) answered by
        // an ACK carrying (65536, 65536, 16777216, 0): the effective send
        // chunk is 8192 and the hello's message limits stay in force.
        let mut buffer = SendBuffer::new(8192, 16384, 1);
        buffer.revise(65536, 16777216, 0);
        assert_eq!(buffer.send_buffer_size, 8192);
        assert_eq!(buffer.max_message_size, 16384);
        assert_eq!(buffer.max_chunk_count, 1);

        // The revision applies symmetrically when the peer is smaller
        let mut buffer = SendBuffer::new(65536, 16777216, 0);
        buffer.revise(8192, 16384, 1);
        assert_eq!(buffer.send_buffer_size, 8192);
        assert_eq!(buffer.max_message_size, 16384);
        assert_eq!(buffer.max_chunk_count, 1);
    }

    #[test]
    fn sequence_numbers_wrap_below_1024() {
        let mut buffer = SendBuffer::new(8192, 0, 0);
        buffer.last_sent_sequence_number = u32::MAX;
        assert_eq!(buffer.next_sequence_number(), 1);
    }
}
