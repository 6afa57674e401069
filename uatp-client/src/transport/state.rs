// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The client channel state: request handles, and the OPN issue/renew
//! exchanges.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use log::{debug, error};

use uatp_core::{
    comms::secure_channel::SecureChannel, sync::RwLock, trace_write_lock, RequestMessage,
    ResponseMessage,
};
use uatp_types::{
    DateTime, NodeId, OpenSecureChannelRequest, RequestHeader, SecurityTokenRequestType,
    StatusCode,
};

use super::OutgoingMessage;

/// Sender half of the outgoing message queue.
pub type RequestSend = tokio::sync::mpsc::Sender<OutgoingMessage>;

/// One request on its way out, paired with the means to await its
/// response.
pub struct Request {
    payload: RequestMessage,
    sender: RequestSend,
    timeout: Duration,
}

impl Request {
    /// Wrap a request for sending.
    pub fn new(payload: impl Into<RequestMessage>, sender: RequestSend, timeout: Duration) -> Self {
        Self {
            payload: payload.into(),
            sender,
            timeout,
        }
    }

    /// Send the request and wait for its response or timeout.
    pub async fn send(self) -> Result<ResponseMessage, StatusCode> {
        let (callback_send, callback_recv) = tokio::sync::oneshot::channel();
        let message = OutgoingMessage {
            request: self.payload,
            callback: Some(callback_send),
            deadline: Instant::now() + self.timeout,
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| StatusCode::BadConnectionClosed)?;
        match callback_recv.await {
            Ok(result) => result,
            // The transport dropped the callback, the connection is gone
            Err(_) => Err(StatusCode::BadConnectionClosed),
        }
    }

    /// Send the request without waiting for any response, used for CLO
    /// which never gets one.
    pub async fn send_no_response(self) -> Result<(), StatusCode> {
        let message = OutgoingMessage {
            request: self.payload,
            callback: None,
            deadline: Instant::now() + self.timeout,
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| StatusCode::BadConnectionClosed)
    }
}

/// The client side channel bookkeeping that is not key material: request
/// handles and OPN request construction and completion.
pub struct ChannelState {
    secure_channel: Arc<RwLock<SecureChannel>>,
    /// The session authentication token, set after session activation by
    /// a higher layer and stamped into every request header.
    auth_token: Arc<ArcSwap<NodeId>>,
    request_handle: AtomicU32,
}

impl ChannelState {
    const FIRST_REQUEST_HANDLE: u32 = 1;

    /// Create channel state for a secure channel.
    pub fn new(
        secure_channel: Arc<RwLock<SecureChannel>>,
        auth_token: Arc<ArcSwap<NodeId>>,
    ) -> Self {
        Self {
            secure_channel,
            auth_token,
            request_handle: AtomicU32::new(Self::FIRST_REQUEST_HANDLE),
        }
    }

    /// The next request handle, wrapping back to 1 and never 0.
    pub fn request_handle(&self) -> u32 {
        let mut handle = self.request_handle.fetch_add(1, Ordering::Relaxed);
        if handle == 0 {
            handle = self.request_handle.fetch_add(1, Ordering::Relaxed);
        }
        handle
    }

    /// Build a request header carrying the auth token and a fresh handle.
    pub fn make_request_header(&self, timeout: Duration) -> RequestHeader {
        RequestHeader {
            authentication_token: self.auth_token.load().as_ref().clone(),
            timestamp: DateTime::now(),
            request_handle: self.request_handle(),
            return_diagnostics: 0,
            timeout_hint: timeout.as_millis() as u32,
            ..Default::default()
        }
    }

    /// Build the OPN request for an issue or renew and hand it to the
    /// transport. Fresh nonces are generated here; keys are derived when
    /// the response arrives.
    pub fn begin_issue_or_renew_secure_channel(
        &self,
        request_type: SecurityTokenRequestType,
        requested_lifetime: u32,
        timeout: Duration,
        sender: RequestSend,
    ) -> Request {
        let (security_mode, client_nonce) = {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel.create_random_nonce();
            (
                secure_channel.security_mode(),
                secure_channel.local_nonce_as_byte_string(),
            )
        };
        debug!("Making an OPN request, type = {:?}", request_type);
        let request = OpenSecureChannelRequest {
            request_header: self.make_request_header(timeout),
            client_protocol_version: 0,
            request_type,
            security_mode,
            client_nonce,
            requested_lifetime,
        };
        Request::new(request, sender, timeout)
    }

    /// Complete an OPN exchange from its response: install the token,
    /// store the server nonce and derive the keys for it.
    pub fn end_issue_or_renew_secure_channel(
        &self,
        response: ResponseMessage,
    ) -> Result<(), StatusCode> {
        let ResponseMessage::OpenSecureChannel(response) = response else {
            error!("Expected an OPN response, got something else");
            return Err(StatusCode::BadUnexpectedError);
        };
        let service_result = response.response_header.service_result;
        if service_result.is_bad() {
            return Err(service_result);
        }

        let mut secure_channel = trace_write_lock!(self.secure_channel);
        secure_channel.set_security_token(response.security_token.clone());
        if secure_channel.security_policy() != uatp_crypto::SecurityPolicy::None {
            secure_channel
                .set_remote_nonce_from_byte_string(&response.server_nonce)
                .map_err(StatusCode::from)?;
            secure_channel.derive_keys();
        } else {
            // Under None the key material is all zero but still installed,
            // the channel code paths are identical
            let _ = secure_channel.set_remote_nonce_from_byte_string(&response.server_nonce);
            secure_channel.derive_keys();
        }
        debug!(
            "Installed security token {} on channel {}, lifetime {} ms",
            response.security_token.token_id,
            response.security_token.channel_id,
            response.security_token.revised_lifetime
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arc_swap::ArcSwap;
    use uatp_core::comms::secure_channel::{Role, SecureChannel};
    use uatp_core::sync::RwLock;
    use uatp_types::{
        ByteString, ChannelSecurityToken, DateTime, NodeId, OpenSecureChannelResponse,
        ResponseHeader,
    };

    use super::ChannelState;

    fn make_state() -> (Arc<RwLock<SecureChannel>>, ChannelState) {
        let channel = Arc::new(RwLock::new(SecureChannel::new(
            Role::Client,
            None,
            None,
            Default::default(),
        )));
        let state = ChannelState::new(channel.clone(), Arc::new(ArcSwap::new(Arc::new(NodeId::null()))));
        (channel, state)
    }

    #[test]
    fn issue_response_installs_token_and_keys() {
        let (channel, state) = make_state();
        {
            let mut channel = channel.write();
            channel.create_random_nonce();
        }

        // A server issuing channel 1, token 1, lifetime 30s, with the
        // single byte nonce of the None policy
        let response = OpenSecureChannelResponse {
            response_header: ResponseHeader::new_good(1),
            server_protocol_version: 0,
            security_token: ChannelSecurityToken {
                channel_id: 1,
                token_id: 1,
                created_at: DateTime::now(),
                revised_lifetime: 30_000,
            },
            server_nonce: ByteString::from(vec![0u8]),
        };
        state
            .end_issue_or_renew_secure_channel(response.into())
            .unwrap();

        let channel = channel.read();
        assert_eq!(channel.secure_channel_id(), 1);
        assert_eq!(channel.token_id(), 1);
        assert_eq!(channel.token_lifetime(), 30_000);
        // A token installed just now is nowhere near its 75% renewal point
        assert!(!channel.should_renew_security_token());
    }

    #[test]
    fn request_handles_are_monotonic_and_nonzero() {
        let (_, state) = make_state();
        let a = state.request_handle();
        let b = state.request_handle();
        assert!(a > 0 && b > a);
    }
}
