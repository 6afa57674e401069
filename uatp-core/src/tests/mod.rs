// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

mod chunking;
mod secure_channel;

use uatp_crypto::SecurityPolicy;
use uatp_types::{
    DateTime, MessageSecurityMode, NodeId, ReadRequest, ReadValueId, RequestHeader,
    TimestampsToReturn,
};

use crate::comms::secure_channel::{Role, SecureChannel};
use crate::RequestMessage;

pub(crate) fn client_channel() -> SecureChannel {
    SecureChannel::new(Role::Client, None, None, Default::default())
}

pub(crate) fn server_channel() -> SecureChannel {
    SecureChannel::new(Role::Server, None, None, Default::default())
}

/// A read request of `count` nodes, for producing messages of a
/// controllable encoded size.
pub(crate) fn make_read_request(count: usize) -> RequestMessage {
    let nodes_to_read = (0..count)
        .map(|i| ReadValueId {
            node_id: NodeId::new(2, format!("Demo.Node.{:04}", i).as_str()),
            attribute_id: 13,
            ..Default::default()
        })
        .collect();
    ReadRequest {
        request_header: RequestHeader::new(NodeId::null(), DateTime::now(), 999),
        max_age: 0.0,
        timestamps_to_return: TimestampsToReturn::Both,
        nodes_to_read: Some(nodes_to_read),
    }
    .into()
}

/// A pair of channels sharing derived keys for `token_id`, as they stand
/// after an OPN exchange under the given policy.
pub(crate) fn connected_channels(
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
    token_id: u32,
) -> (SecureChannel, SecureChannel) {
    let mut client = client_channel();
    let mut server = server_channel();
    for channel in [&mut client, &mut server] {
        channel.set_security_policy(policy);
        channel.set_security_mode(mode);
        channel.set_secure_channel_id(1);
        channel.set_token_id(token_id);
        channel.set_token_lifetime(30_000);
    }
    exchange_nonces_and_derive(&mut client, &mut server);
    (client, server)
}

/// Generate fresh nonces on both channels, swap them, and derive keys,
/// the way an OPN issue or renew does.
pub(crate) fn exchange_nonces_and_derive(client: &mut SecureChannel, server: &mut SecureChannel) {
    client.create_random_nonce();
    server.create_random_nonce();
    let client_nonce = client.local_nonce().to_vec();
    let server_nonce = server.local_nonce().to_vec();
    client.set_remote_nonce(&server_nonce);
    server.set_remote_nonce(&client_nonce);
    client.derive_keys();
    server.derive_keys();
}
