// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The connection protocol messages: HEL, ACK and ERR, plus the common
//! message header every frame starts with.

use std::io::{Read, Write};

use log::error;
use uatp_types::{
    encoding::{
        process_decode_io_result, process_encode_io_result, read_u32, write_u32, write_u8,
        DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable,
    },
    status_code::StatusCode,
    Error, UAString,
};

/// Message type tag of a hello frame.
pub const HELLO_MESSAGE: &[u8] = b"HEL";
/// Message type tag of an acknowledge frame.
pub const ACKNOWLEDGE_MESSAGE: &[u8] = b"ACK";
/// Message type tag of an error frame.
pub const ERROR_MESSAGE: &[u8] = b"ERR";
/// Message type tag of a service message chunk.
pub const CHUNK_MESSAGE: &[u8] = b"MSG";
/// Message type tag of an open secure channel chunk.
pub const OPEN_SECURE_CHANNEL_MESSAGE: &[u8] = b"OPN";
/// Message type tag of a close secure channel chunk.
pub const CLOSE_SECURE_CHANNEL_MESSAGE: &[u8] = b"CLO";

/// Chunk type byte of a final chunk.
pub const CHUNK_FINAL: u8 = b'F';
/// Chunk type byte of an intermediate chunk.
pub const CHUNK_INTERMEDIATE: u8 = b'C';
/// Chunk type byte of a final chunk that aborts its message.
pub const CHUNK_FINAL_ERROR: u8 = b'A';

/// Length of the common message header: 3 byte type, 1 byte chunk type,
/// 4 byte size.
pub const MESSAGE_HEADER_LEN: usize = 8;

/// The smallest legal frame: a header plus the smallest possible body.
pub const MIN_MESSAGE_SIZE: u32 = 16;

/// The smallest send/receive buffer size either side may advertise.
pub const MIN_CHUNK_SIZE: usize = 8192;

/// Maximum length in bytes of the endpoint url in a hello.
pub const MAX_ENDPOINT_URL_LENGTH: usize = 4096;

/// The kind of frame, from the message type tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageType {
    /// Tag did not match any known frame type.
    Invalid,
    /// HEL.
    Hello,
    /// ACK.
    Acknowledge,
    /// ERR.
    Error,
    /// MSG, OPN or CLO, handled by the chunking layer.
    Chunk,
}

/// The common header at the start of every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    /// The kind of frame.
    pub message_type: MessageType,
    /// The chunk type byte. `F` for HEL/ACK/ERR, `F`/`C`/`A` for chunks.
    pub chunk_type: u8,
    /// Total frame size, header included.
    pub message_size: u32,
}

impl MessageHeader {
    /// Parse a header from the first [`MESSAGE_HEADER_LEN`] bytes of a
    /// buffer. An unknown tag yields `MessageType::Invalid` rather than an
    /// error so the caller can classify the stream as garbage.
    pub fn from_slice(data: &[u8]) -> EncodingResult<MessageHeader> {
        if data.len() < MESSAGE_HEADER_LEN {
            return Err(Error::decoding("Message header is truncated"));
        }
        let message_type = match &data[0..3] {
            HELLO_MESSAGE => MessageType::Hello,
            ACKNOWLEDGE_MESSAGE => MessageType::Acknowledge,
            ERROR_MESSAGE => MessageType::Error,
            CHUNK_MESSAGE | OPEN_SECURE_CHANNEL_MESSAGE | CLOSE_SECURE_CHANNEL_MESSAGE => {
                MessageType::Chunk
            }
            _ => MessageType::Invalid,
        };
        let chunk_type = data[3];
        if message_type != MessageType::Chunk && chunk_type != CHUNK_FINAL {
            return Ok(MessageHeader {
                message_type: MessageType::Invalid,
                chunk_type,
                message_size: 0,
            });
        }
        let message_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Ok(MessageHeader {
            message_type,
            chunk_type,
            message_size,
        })
    }
}

impl SimpleBinaryEncodable for MessageHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let tag: &[u8] = match self.message_type {
            MessageType::Hello => HELLO_MESSAGE,
            MessageType::Acknowledge => ACKNOWLEDGE_MESSAGE,
            MessageType::Error => ERROR_MESSAGE,
            _ => {
                return Err(Error::encoding("Message type is not encodable"));
            }
        };
        process_encode_io_result(stream.write_all(tag))?;
        write_u8(stream, self.chunk_type)?;
        write_u32(stream, self.message_size)
    }
}

/// Client hello. Carries the endpoint url and the client's transport
/// limits. Always the first frame on a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Common header.
    pub message_header: MessageHeader,
    /// Version of the connection protocol.
    pub protocol_version: u32,
    /// Largest chunk the client is able to receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the client will send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the client accepts, 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the client accepts, 0 for no limit.
    pub max_chunk_count: u32,
    /// The endpoint the client wants to talk to.
    pub endpoint_url: UAString,
}

impl SimpleBinaryEncodable for HelloMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 20 + 4 + self.endpoint_url.as_ref().len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)?;
        encode_url(stream, &self.endpoint_url)
    }
}

impl SimpleBinaryDecodable for HelloMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = decode_header(stream, MessageType::Hello, decoding_options)?;
        let hello = HelloMessage {
            message_header,
            protocol_version: read_u32(stream)?,
            receive_buffer_size: read_u32(stream)?,
            send_buffer_size: read_u32(stream)?,
            max_message_size: read_u32(stream)?,
            max_chunk_count: read_u32(stream)?,
            endpoint_url: decode_url(stream)?,
        };
        if !hello.is_valid_buffer_sizes() {
            return Err(Error::new(
                StatusCode::BadCommunicationError,
                "Hello buffer sizes are below the minimum",
            ));
        }
        Ok(hello)
    }
}

impl HelloMessage {
    /// Create a hello with the given endpoint and limits.
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: usize,
        receive_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> HelloMessage {
        let mut msg = HelloMessage {
            message_header: MessageHeader {
                message_type: MessageType::Hello,
                chunk_type: CHUNK_FINAL,
                message_size: 0,
            },
            protocol_version: 0,
            receive_buffer_size: receive_buffer_size as u32,
            send_buffer_size: send_buffer_size as u32,
            max_message_size: max_message_size as u32,
            max_chunk_count: max_chunk_count as u32,
            endpoint_url: UAString::from(endpoint_url),
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }

    /// True when the endpoint url fits the limit the standard sets.
    pub fn is_endpoint_url_valid(&self) -> bool {
        self.endpoint_url.as_ref().len() <= MAX_ENDPOINT_URL_LENGTH
    }

    /// True when both advertised buffer sizes meet the minimum.
    pub fn is_valid_buffer_sizes(&self) -> bool {
        self.receive_buffer_size as usize >= MIN_CHUNK_SIZE
            && self.send_buffer_size as usize >= MIN_CHUNK_SIZE
    }
}

/// Server acknowledge, the response to a hello, carrying the server's
/// revised limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    /// Common header.
    pub message_header: MessageHeader,
    /// Version of the connection protocol.
    pub protocol_version: u32,
    /// Largest chunk the server is able to receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the server will send.
    pub send_buffer_size: u32,
    /// Largest reassembled message the server accepts, 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the server accepts, 0 for no limit.
    pub max_chunk_count: u32,
}

impl SimpleBinaryEncodable for AcknowledgeMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 20
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        write_u32(stream, self.protocol_version)?;
        write_u32(stream, self.receive_buffer_size)?;
        write_u32(stream, self.send_buffer_size)?;
        write_u32(stream, self.max_message_size)?;
        write_u32(stream, self.max_chunk_count)
    }
}

impl SimpleBinaryDecodable for AcknowledgeMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = decode_header(stream, MessageType::Acknowledge, decoding_options)?;
        Ok(AcknowledgeMessage {
            message_header,
            protocol_version: read_u32(stream)?,
            receive_buffer_size: read_u32(stream)?,
            send_buffer_size: read_u32(stream)?,
            max_message_size: read_u32(stream)?,
            max_chunk_count: read_u32(stream)?,
        })
    }
}

impl AcknowledgeMessage {
    /// Create an acknowledge with the given limits.
    pub fn new(
        protocol_version: u32,
        receive_buffer_size: u32,
        send_buffer_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> AcknowledgeMessage {
        let mut msg = AcknowledgeMessage {
            message_header: MessageHeader {
                message_type: MessageType::Acknowledge,
                chunk_type: CHUNK_FINAL,
                message_size: 0,
            },
            protocol_version,
            receive_buffer_size,
            send_buffer_size,
            max_message_size,
            max_chunk_count,
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }
}

/// Error frame, sent before closing when a fatal transport or framing
/// error has to be reported to the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// Common header.
    pub message_header: MessageHeader,
    /// The status code describing the error.
    pub error: u32,
    /// Human readable reason.
    pub reason: UAString,
}

impl SimpleBinaryEncodable for ErrorMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_LEN + 4 + 4 + self.reason.as_ref().len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.message_header.encode(stream)?;
        write_u32(stream, self.error)?;
        encode_url(stream, &self.reason)
    }
}

impl SimpleBinaryDecodable for ErrorMessage {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let message_header = decode_header(stream, MessageType::Error, decoding_options)?;
        Ok(ErrorMessage {
            message_header,
            error: read_u32(stream)?,
            reason: decode_url(stream)?,
        })
    }
}

impl ErrorMessage {
    /// Create an error frame from a status code and reason.
    pub fn new(status_code: StatusCode, reason: &str) -> ErrorMessage {
        let mut msg = ErrorMessage {
            message_header: MessageHeader {
                message_type: MessageType::Error,
                chunk_type: CHUNK_FINAL,
                message_size: 0,
            },
            error: status_code.bits(),
            reason: UAString::from(reason),
        };
        msg.message_header.message_size = msg.byte_len() as u32;
        msg
    }

    /// The error as a status code.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u32(self.error)
    }
}

fn decode_header<S: Read + ?Sized>(
    stream: &mut S,
    expected: MessageType,
    _: &DecodingOptions,
) -> EncodingResult<MessageHeader> {
    let mut buf = [0u8; MESSAGE_HEADER_LEN];
    process_decode_io_result(stream.read_exact(&mut buf))?;
    let header = MessageHeader::from_slice(&buf)?;
    if header.message_type != expected {
        error!(
            "Expected message type {:?}, got {:?}",
            expected, header.message_type
        );
        return Err(Error::decoding("Unexpected message type"));
    }
    Ok(header)
}

// HEL endpoint urls and ERR reasons are length prefixed strings with their
// own length cap, independent of the negotiated string limits.
fn encode_url<S: Write + ?Sized>(stream: &mut S, value: &UAString) -> EncodingResult<()> {
    if value.as_ref().len() > MAX_ENDPOINT_URL_LENGTH {
        return Err(Error::encoding("String exceeds the 4096 byte limit"));
    }
    write_u32(stream, value.as_ref().len() as u32)?;
    process_encode_io_result(stream.write_all(value.as_ref().as_bytes()))
}

fn decode_url<S: Read + ?Sized>(stream: &mut S) -> EncodingResult<UAString> {
    let len = read_u32(stream)? as usize;
    if len > MAX_ENDPOINT_URL_LENGTH {
        return Err(Error::decoding("String exceeds the 4096 byte limit"));
    }
    let mut buf = vec![0u8; len];
    process_decode_io_result(stream.read_exact(&mut buf))?;
    let value =
        String::from_utf8(buf).map_err(|_| Error::decoding("String is not valid UTF-8"))?;
    Ok(UAString::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use uatp_types::DecodingOptions;

    #[test]
    fn hello_round_trip() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840", 65536, 65536, 0, 0);
        assert_eq!(hello.message_header.message_size as usize, hello.byte_len());
        let buf = hello.encode_to_vec();
        let decoded =
            HelloMessage::decode(&mut Cursor::new(&buf), &DecodingOptions::test()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn hello_with_tiny_buffers_is_rejected() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840", 4096, 4096, 0, 0);
        let buf = hello.encode_to_vec();
        assert!(HelloMessage::decode(&mut Cursor::new(&buf), &DecodingOptions::test()).is_err());
    }

    #[test]
    fn error_round_trip() {
        let err = ErrorMessage::new(StatusCode::BadTcpMessageTooLarge, "message too large");
        let buf = err.encode_to_vec();
        let decoded =
            ErrorMessage::decode(&mut Cursor::new(&buf), &DecodingOptions::test()).unwrap();
        assert_eq!(decoded.status(), StatusCode::BadTcpMessageTooLarge);
    }

    #[test]
    fn invalid_tag_is_classified_not_errored() {
        let header = MessageHeader::from_slice(b"XXXF\x10\x00\x00\x00").unwrap();
        assert_eq!(header.message_type, MessageType::Invalid);
    }
}
