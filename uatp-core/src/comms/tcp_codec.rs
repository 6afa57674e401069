// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Tokio codec turning the inbound byte stream into complete frames.
//!
//! The decoder scans the 8 byte common header, validates the tag and size,
//! and buffers until a whole frame is available. Anything that fails the
//! header checks marks the stream as garbage and errors the connection;
//! there is no resynchronization, the peer is expected to reconnect.

use std::io::{Cursor, Error, ErrorKind};

use bytes::{Buf, BytesMut};
use log::error;
use tokio_util::codec::Decoder;
use uatp_types::{DecodingOptions, SimpleBinaryDecodable};

use super::{
    message_chunk::MessageChunk,
    tcp_types::{
        AcknowledgeMessage, ErrorMessage, HelloMessage, MessageHeader, MessageType,
        MESSAGE_HEADER_LEN, MIN_MESSAGE_SIZE,
    },
};

/// One decoded frame off the wire.
#[derive(Debug)]
pub enum Message {
    /// A client hello.
    Hello(HelloMessage),
    /// A server acknowledge.
    Acknowledge(AcknowledgeMessage),
    /// An error report from the peer.
    Error(ErrorMessage),
    /// A chunk of a service message, still secured.
    Chunk(MessageChunk),
}

impl Message {
    fn decode(
        data: &[u8],
        message_type: MessageType,
        decoding_options: &DecodingOptions,
    ) -> Result<Message, uatp_types::Error> {
        let mut stream = Cursor::new(data);
        match message_type {
            MessageType::Hello => Ok(Message::Hello(HelloMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Acknowledge => Ok(Message::Acknowledge(AcknowledgeMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Error => Ok(Message::Error(ErrorMessage::decode(
                &mut stream,
                decoding_options,
            )?)),
            MessageType::Chunk => Ok(Message::Chunk(MessageChunk {
                data: data.to_vec(),
            })),
            MessageType::Invalid => Err(uatp_types::Error::decoding(
                "Cannot decode an invalid message type",
            )),
        }
    }
}

/// Decoder for the framing layer. Bytes in, [`Message`] frames out.
pub struct TcpCodec {
    /// The local receive buffer size. A frame larger than this is a
    /// framing error, the peer agreed not to send one.
    max_chunk_size: usize,
    decoding_options: DecodingOptions,
}

impl TcpCodec {
    /// Create a codec enforcing the given receive buffer size. A
    /// `max_chunk_size` of 0 means unlimited.
    pub fn new(max_chunk_size: usize, decoding_options: DecodingOptions) -> TcpCodec {
        TcpCodec {
            max_chunk_size,
            decoding_options,
        }
    }
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = Error;

    // The buffer may contain zero or more complete frames, possibly
    // followed by an incomplete one. Incomplete tails stay in `buf` and are
    // completed by later reads.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Error> {
        if buf.len() < MESSAGE_HEADER_LEN {
            return Ok(None);
        }

        let header = MessageHeader::from_slice(&buf[..MESSAGE_HEADER_LEN])
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        if header.message_type == MessageType::Invalid {
            error!("Message type tag is not recognized, closing connection");
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Invalid message type tag",
            ));
        }
        let message_size = header.message_size as usize;
        if header.message_size < MIN_MESSAGE_SIZE {
            error!("Message size {} is below the minimum frame size", message_size);
            return Err(Error::new(ErrorKind::InvalidData, "Frame is too small"));
        }
        if self.max_chunk_size > 0 && message_size > self.max_chunk_size {
            error!(
                "Message size {} exceeds receive buffer size {}",
                message_size, self.max_chunk_size
            );
            return Err(Error::new(ErrorKind::InvalidData, "Frame is too large"));
        }

        if buf.len() < message_size {
            // Not enough data yet, hint at how much is missing
            buf.reserve(message_size - buf.len());
            return Ok(None);
        }

        let frame = buf.copy_to_bytes(message_size);
        let message = Message::decode(&frame, header.message_type, &self.decoding_options)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::Decoder;
    use uatp_types::{DecodingOptions, SimpleBinaryEncodable};

    use super::{Message, TcpCodec};
    use crate::comms::tcp_types::HelloMessage;

    fn codec() -> TcpCodec {
        TcpCodec::new(65536, DecodingOptions::test())
    }

    #[test]
    fn partial_then_complete_frame() {
        let hello = HelloMessage::new("opc.tcp://host:4840", 8192, 8192, 16384, 1);
        let bytes = hello.encode_to_vec();

        let mut codec = codec();
        let mut buf = BytesMut::new();
        // First seven bytes only, not even a full header
        buf.extend_from_slice(&bytes[..7]);
        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        buf.extend_from_slice(&bytes[7..]);
        let Ok(Some(Message::Hello(decoded))) = codec.decode(&mut buf) else {
            panic!("expected a hello frame");
        };
        assert_eq!(decoded, hello);
        assert!(buf.is_empty());
    }

    #[test]
    fn garbage_errors_the_stream() {
        let mut codec = codec();
        let mut buf = BytesMut::from(&b"GARBAGEGARBAGE! "[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn oversized_frame_is_a_framing_error() {
        let mut codec = TcpCodec::new(16384, DecodingOptions::test());
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"MSGF");
        // One byte larger than the receive buffer size
        buf.extend_from_slice(&16385u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn undersized_frame_is_a_framing_error() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"MSGF");
        buf.extend_from_slice(&8u32.to_le_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn minimum_frame_size_is_accepted() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"MSGF");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        let Ok(Some(Message::Chunk(chunk))) = codec.decode(&mut buf) else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.data.len(), 16);
    }
}
