// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

use uatp_crypto::SecurityPolicy;
use uatp_types::{
    ChannelSecurityToken, DateTime, MessageSecurityMode, StatusCode,
};

use crate::comms::chunker::Chunker;
use crate::comms::message_chunk::MessageChunkType;
use crate::RequestMessage;

use super::{connected_channels, exchange_nonces_and_derive, make_read_request};

// A secured chunk is never larger than the negotiated chunk size, this is
// plenty for the tests here.
const SECURED_BUF_SIZE: usize = 65536;

#[test]
fn none_policy_chunk_passes_through_unchanged() {
    let (client, mut server) =
        connected_channels(SecurityPolicy::None, MessageSecurityMode::None, 1);
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &make_read_request(3)).unwrap();

    let mut secured = vec![0u8; SECURED_BUF_SIZE];
    let size = client.apply_security(&chunks[0], &mut secured).unwrap();
    assert_eq!(&secured[..size], &chunks[0].data[..]);

    let verified = server.verify_and_remove_security(&secured[..size]).unwrap();
    assert_eq!(verified.data, chunks[0].data);
}

#[test]
fn sign_and_encrypt_round_trip() {
    let (client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
        1,
    );
    let chunks = Chunker::encode(1, 1, 0, 8192, &client, &make_read_request(20)).unwrap();

    for chunk in &chunks {
        let mut secured = vec![0u8; SECURED_BUF_SIZE];
        let size = client.apply_security(chunk, &mut secured).unwrap();
        // Padding and signature make the secured chunk longer
        assert!(size > chunk.data.len());
        assert_ne!(&secured[..chunk.data.len()], &chunk.data[..]);

        let verified = server.verify_and_remove_security(&secured[..size]).unwrap();
        assert_eq!(verified.data, chunk.data);
    }
}

#[test]
fn sign_only_round_trip() {
    let (client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::Sign,
        1,
    );
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &make_read_request(3)).unwrap();

    let mut secured = vec![0u8; SECURED_BUF_SIZE];
    let size = client.apply_security(&chunks[0], &mut secured).unwrap();
    assert_eq!(
        size,
        chunks[0].data.len() + SecurityPolicy::Basic256Sha256.symmetric_signature_size()
    );

    let verified = server.verify_and_remove_security(&secured[..size]).unwrap();
    assert_eq!(verified.data, chunks[0].data);
}

#[test]
fn tampered_chunk_fails_verification() {
    let (client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::Sign,
        1,
    );
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &make_read_request(3)).unwrap();

    let mut secured = vec![0u8; SECURED_BUF_SIZE];
    let size = client.apply_security(&chunks[0], &mut secured).unwrap();
    // Flip one byte of the body
    secured[size / 2] ^= 0xff;
    let err = server
        .verify_and_remove_security(&secured[..size])
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
}

#[test]
fn unknown_token_is_rejected() {
    let (mut client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
        1,
    );
    // The client secures a chunk under a token the server never issued
    client.set_token_id(99);
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &make_read_request(1)).unwrap();
    let mut secured = vec![0u8; SECURED_BUF_SIZE];
    let size = client.apply_security(&chunks[0], &mut secured).unwrap();

    let err = server
        .verify_and_remove_security(&secured[..size])
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecureChannelTokenUnknown);
}

#[test]
fn token_renewal_overlap() {
    let (mut client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
        1,
    );

    // A message secured under token 1, before renewal
    let chunks = Chunker::encode(1, 1, 0, 0, &client, &make_read_request(1)).unwrap();
    let mut old_secured = vec![0u8; SECURED_BUF_SIZE];
    let old_size = client.apply_security(&chunks[0], &mut old_secured).unwrap();
    let mut old_secured_again = vec![0u8; SECURED_BUF_SIZE];
    let old_size_again = client
        .apply_security(&chunks[0], &mut old_secured_again)
        .unwrap();

    // Renew: token 2 on both sides, fresh nonces, fresh keys. The server
    // retains the token 1 inbound keys for the overlap window.
    for channel in [&mut client, &mut server] {
        channel.set_token_id(2);
        channel.set_token_lifetime(30_000);
    }
    exchange_nonces_and_derive(&mut client, &mut server);

    // Within the overlap the old token still verifies
    let verified = server
        .verify_and_remove_security(&old_secured[..old_size])
        .unwrap();
    assert_eq!(verified.data, chunks[0].data);

    // First message under the new token ends the overlap
    let new_chunks = Chunker::encode(2, 2, 0, 0, &client, &make_read_request(1)).unwrap();
    let mut new_secured = vec![0u8; SECURED_BUF_SIZE];
    let new_size = client
        .apply_security(&new_chunks[0], &mut new_secured)
        .unwrap();
    server
        .verify_and_remove_security(&new_secured[..new_size])
        .unwrap();

    // The old token is gone now
    let err = server
        .verify_and_remove_security(&old_secured_again[..old_size_again])
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BadSecureChannelTokenUnknown);
}

#[test]
fn renewal_due_at_75_percent_of_lifetime() {
    let (mut client, _) = connected_channels(
        SecurityPolicy::None,
        MessageSecurityMode::None,
        1,
    );
    // A token created three quarters of its lifetime ago is due, one
    // created just now is not
    client.set_security_token(ChannelSecurityToken {
        channel_id: 1,
        token_id: 1,
        created_at: DateTime::now() + chrono::Duration::milliseconds(-23_000),
        revised_lifetime: 30_000,
    });
    assert!(client.should_renew_security_token());

    client.set_security_token(ChannelSecurityToken {
        channel_id: 1,
        token_id: 1,
        created_at: DateTime::now(),
        revised_lifetime: 30_000,
    });
    assert!(!client.should_renew_security_token());
}

#[test]
fn security_header_matches_message_type() {
    let (client, _) = connected_channels(SecurityPolicy::None, MessageSecurityMode::None, 7);
    let header = client.make_security_header(MessageChunkType::Message);
    let crate::comms::security_header::SecurityHeader::Symmetric(header) = header else {
        panic!("expected a symmetric header for MSG");
    };
    assert_eq!(header.token_id, 7);

    let header = client.make_security_header(MessageChunkType::OpenSecureChannel);
    let crate::comms::security_header::SecurityHeader::Asymmetric(header) = header else {
        panic!("expected an asymmetric header for OPN");
    };
    assert_eq!(
        header.security_policy_uri.as_ref(),
        SecurityPolicy::None.to_uri()
    );
    assert!(header.sender_certificate.is_null());
}

#[test]
fn decode_of_secured_multichunk_message() {
    let (client, mut server) = connected_channels(
        SecurityPolicy::Basic256Sha256,
        MessageSecurityMode::SignAndEncrypt,
        1,
    );
    let request = make_read_request(2000);
    let chunks = Chunker::encode(1, 1, 0, 8192, &client, &request).unwrap();
    assert!(chunks.len() > 1);

    let mut verified = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let mut secured = vec![0u8; SECURED_BUF_SIZE];
        let size = client.apply_security(chunk, &mut secured).unwrap();
        verified.push(server.verify_and_remove_security(&secured[..size]).unwrap());
    }
    Chunker::validate_chunks(1, &server, &verified).unwrap();
    let decoded: RequestMessage = Chunker::decode(&verified, &server, None).unwrap();
    assert_eq!(decoded, request);
}
