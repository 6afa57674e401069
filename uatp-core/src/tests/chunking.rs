// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

use uatp_types::{BinaryEncodable, DecodingOptions, StatusCode};

use crate::comms::chunker::Chunker;
use crate::comms::message_chunk::{MessageChunk, MessageIsFinalType};
use crate::RequestMessage;

use super::{client_channel, make_read_request};

#[test]
fn single_chunk_round_trip() {
    let channel = client_channel();
    let request = make_read_request(1);

    let chunks = Chunker::encode(51, 1, 0, 0, &channel, &request).unwrap();
    assert_eq!(chunks.len(), 1);

    let info = chunks[0].chunk_info(&channel).unwrap();
    assert_eq!(info.message_header.is_final, MessageIsFinalType::Final);
    assert_eq!(info.sequence_header.sequence_number, 51);
    assert_eq!(info.sequence_header.request_id, 1);

    let decoded: RequestMessage = Chunker::decode(&chunks, &channel, None).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn multi_chunk_round_trip() {
    let channel = client_channel();
    // Large enough that an 8192 byte chunk limit forces several chunks
    let request = make_read_request(2000);
    {
        let ctx = channel.context();
        assert!(request.byte_len(&ctx.context()) > 3 * 8192);
    }

    let chunks = Chunker::encode(51, 1, 0, 8192, &channel, &request).unwrap();
    assert!(chunks.len() > 3);

    // Every chunk but the last is intermediate, sequence numbers are
    // consecutive from 51, all share request id 1
    for (i, chunk) in chunks.iter().enumerate() {
        let info = chunk.chunk_info(&channel).unwrap();
        assert!(info.message_header.message_size as usize <= 8192);
        let expected = if i == chunks.len() - 1 {
            MessageIsFinalType::Final
        } else {
            MessageIsFinalType::Intermediate
        };
        assert_eq!(info.message_header.is_final, expected);
        assert_eq!(info.sequence_header.sequence_number, 51 + i as u32);
        assert_eq!(info.sequence_header.request_id, 1);
    }

    let last =
        Chunker::validate_chunks(51, &channel, &chunks).unwrap();
    assert_eq!(last, 51 + chunks.len() as u32 - 1);

    let decoded: RequestMessage = Chunker::decode(&chunks, &channel, None).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn max_message_size_is_enforced_exactly() {
    let channel = client_channel();
    let request = make_read_request(10);
    let size = {
        let ctx = channel.context();
        request.byte_len(&ctx.context())
    };

    // Exactly the encoded size passes
    assert!(Chunker::encode(1, 1, size, 0, &channel, &request).is_ok());
    // One byte less fails, and the client role reports request-too-large
    let err = Chunker::encode(1, 1, size - 1, 0, &channel, &request).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadRequestTooLarge);
}

#[test]
fn validate_chunks_rejects_sequence_gap() {
    let channel = client_channel();
    let request = make_read_request(2000);
    let mut chunks = Chunker::encode(51, 1, 0, 8192, &channel, &request).unwrap();

    // Drop a chunk from the middle, the gap must be detected
    chunks.remove(1);
    let err = Chunker::validate_chunks(51, &channel, &chunks).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSequenceNumberInvalid);
}

#[test]
fn validate_chunks_rejects_stale_sequence_number() {
    let channel = client_channel();
    let request = make_read_request(1);
    let chunks = Chunker::encode(51, 1, 0, 0, &channel, &request).unwrap();
    let err = Chunker::validate_chunks(52, &channel, &chunks).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSequenceNumberInvalid);
}

#[test]
fn validate_chunks_rejects_wrong_channel_id() {
    let mut channel = client_channel();
    let request = make_read_request(1);
    let chunks = Chunker::encode(1, 1, 0, 0, &channel, &request).unwrap();

    channel.set_secure_channel_id(42);
    let err = Chunker::validate_chunks(1, &channel, &chunks).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecureChannelIdInvalid);
}

#[test]
fn sequence_number_wraps_without_false_gap() {
    let channel = client_channel();
    let request = make_read_request(2000);
    // Starts close enough to the maximum that the sequence wraps mid
    // message
    let start = u32::MAX - 1;
    let chunks = Chunker::encode(start, 1, 0, 8192, &channel, &request).unwrap();
    assert!(chunks.len() > 2);
    let last = Chunker::validate_chunks(start, &channel, &chunks).unwrap();
    assert_eq!(last, start.wrapping_add(chunks.len() as u32 - 1));
}

#[test]
fn mangled_continuation_byte_fails_decode() {
    let channel = client_channel();
    let request = make_read_request(2000);
    let mut chunks = Chunker::encode(51, 1, 0, 8192, &channel, &request).unwrap();

    // Mark the last chunk as intermediate, the message never finishes
    let last = chunks.len() - 1;
    chunks[last].data[3] = b'C';
    assert!(Chunker::decode::<RequestMessage>(&chunks, &channel, None).is_err());
}

#[test]
fn abort_chunk_is_distinguished() {
    let channel = client_channel();
    let request = make_read_request(1);
    let mut chunks = Chunker::encode(1, 1, 0, 0, &channel, &request).unwrap();
    chunks[0].data[3] = b'A';
    let info = chunks[0].chunk_info(&channel).unwrap();
    assert_eq!(info.message_header.is_final, MessageIsFinalType::FinalError);
}

#[test]
fn chunk_size_limit_is_checked_on_decode() {
    use std::io::Cursor;
    use uatp_types::SimpleBinaryDecodable;

    let channel = client_channel();
    let request = make_read_request(2000);
    let chunks = Chunker::encode(1, 1, 0, 8192, &channel, &request).unwrap();
    let bytes = &chunks[0].data;

    let options = DecodingOptions {
        max_message_size: 4096,
        ..Default::default()
    };
    let err = MessageChunk::decode(&mut Cursor::new(bytes), &options).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadTcpMessageTooLarge);
}
