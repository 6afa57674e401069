// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The owner of one secure channel: connects it, keeps its token fresh,
//! and routes requests through it.

use std::{str::FromStr, sync::Arc, time::Duration};

use arc_swap::{ArcSwap, ArcSwapOption};
use log::{debug, error};

use uatp_core::{
    comms::secure_channel::{Role, SecureChannel},
    sync::RwLock,
    trace_read_lock, trace_write_lock, RequestMessage, ResponseMessage,
};
use uatp_crypto::{PrivateKey, SecurityPolicy, X509};
use uatp_types::{
    ByteString, CloseSecureChannelRequest, ContextOwned, MessageSecurityMode, NodeId,
    SecurityTokenRequestType, StatusCode,
};

use crate::retry::SessionRetryPolicy;

use super::{
    connect::{Connector, Transport},
    core::TransportPollResult,
    state::{ChannelState, Request, RequestSend},
    tcp::{TcpTransport, TransportConfiguration},
    OutgoingMessage,
};

// Bound on the outgoing queue. Never reached in practice, it exists so a
// runaway caller cannot consume unbounded memory.
const MAX_INFLIGHT_MESSAGES: usize = 100_000;

/// Notifications about channel lifecycle, delivered to whoever holds the
/// receiver handed out by [`SecureChannelSession::subscribe_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel completed its first OPN.
    Opened {
        /// The server assigned channel id.
        channel_id: u32,
    },
    /// The channel token was renewed.
    TokenRenewed {
        /// Id of the new token.
        token_id: u32,
    },
    /// The channel closed, on purpose or otherwise.
    Closed {
        /// Why the channel closed. `Good` for a deliberate close.
        status: StatusCode,
    },
}

/// Identity and endpoint parameters for a channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// The endpoint to connect to.
    pub endpoint_url: String,
    /// URI of the security policy to request.
    pub security_policy_uri: String,
    /// The security mode to request.
    pub security_mode: MessageSecurityMode,
    /// The server certificate, when known up front.
    pub server_certificate: ByteString,
}

/// A client secure channel together with the machinery to open it, renew
/// its token and push requests through it.
pub struct SecureChannelSession {
    channel_info: ChannelInfo,
    session_retry_policy: SessionRetryPolicy,
    /// The secure channel itself, shared with the transport.
    pub(crate) secure_channel: Arc<RwLock<SecureChannel>>,
    transport_config: TransportConfiguration,
    state: ChannelState,
    /// Held while an OPN exchange runs, so concurrent senders do not
    /// renew twice.
    issue_channel_lock: tokio::sync::Mutex<()>,
    connector: Box<dyn Connector>,
    /// Requested token lifetime in milliseconds.
    channel_lifetime: u32,
    request_send: ArcSwapOption<RequestSend>,
    event_send: ArcSwapOption<tokio::sync::mpsc::UnboundedSender<ChannelEvent>>,
}

/// Event loop for a connected channel. Poll it until it reports closed.
pub struct SecureChannelEventLoop {
    transport: TcpTransport,
}

impl SecureChannelEventLoop {
    /// Drive the channel one step.
    pub async fn poll(&mut self) -> TransportPollResult {
        self.transport.poll().await
    }
}

impl SecureChannelSession {
    /// Create a channel session. Nothing connects until
    /// [`SecureChannelSession::connect`] is called.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_info: ChannelInfo,
        session_retry_policy: SessionRetryPolicy,
        cert: Option<X509>,
        private_key: Option<PrivateKey>,
        auth_token: Arc<ArcSwap<NodeId>>,
        transport_config: TransportConfiguration,
        connector: Box<dyn Connector>,
        channel_lifetime: u32,
        encoding_context: Arc<RwLock<ContextOwned>>,
    ) -> Self {
        let secure_channel = Arc::new(RwLock::new(SecureChannel::new(
            Role::Client,
            cert,
            private_key,
            encoding_context,
        )));
        Self {
            channel_info,
            session_retry_policy,
            state: ChannelState::new(secure_channel.clone(), auth_token),
            secure_channel,
            transport_config,
            issue_channel_lock: tokio::sync::Mutex::new(()),
            connector,
            channel_lifetime,
            request_send: Default::default(),
            event_send: Default::default(),
        }
    }

    /// Register for lifecycle events. Only the latest subscriber receives
    /// them.
    pub fn subscribe_events(&self) -> tokio::sync::mpsc::UnboundedReceiver<ChannelEvent> {
        let (send, recv) = tokio::sync::mpsc::unbounded_channel();
        self.event_send.store(Some(Arc::new(send)));
        recv
    }

    fn emit(&self, event: ChannelEvent) {
        if let Some(send) = self.event_send.load().as_deref() {
            let _ = send.send(event);
        }
    }

    /// The channel's client nonce.
    pub fn client_nonce(&self) -> ByteString {
        let secure_channel = trace_read_lock!(self.secure_channel);
        secure_channel.local_nonce_as_byte_string()
    }

    /// The active security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        let secure_channel = trace_read_lock!(self.secure_channel);
        secure_channel.security_policy()
    }

    /// The next request handle on this channel.
    pub fn request_handle(&self) -> u32 {
        self.state.request_handle()
    }

    /// Send a request and wait for its response, transparently renewing
    /// the security token when it is due.
    pub async fn send(
        &self,
        request: impl Into<RequestMessage>,
        timeout: Duration,
    ) -> Result<ResponseMessage, StatusCode> {
        let Some(send) = self.request_send.load().as_deref().cloned() else {
            return Err(StatusCode::BadNotConnected);
        };

        let should_renew = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            secure_channel.should_renew_security_token()
        };
        if should_renew {
            // Take the lock, then check again: a concurrent sender may
            // have renewed while we waited.
            let guard = self.issue_channel_lock.lock().await;
            let should_renew = {
                let secure_channel = trace_read_lock!(self.secure_channel);
                secure_channel.should_renew_security_token()
            };
            if should_renew {
                let request = self.state.begin_issue_or_renew_secure_channel(
                    SecurityTokenRequestType::Renew,
                    self.channel_lifetime,
                    Duration::from_secs(30),
                    send.clone(),
                );
                let response = request.send().await?;
                self.state.end_issue_or_renew_secure_channel(response)?;
                let token_id = {
                    let secure_channel = trace_read_lock!(self.secure_channel);
                    secure_channel.token_id()
                };
                self.emit(ChannelEvent::TokenRenewed { token_id });
            }
            drop(guard);
        }

        Request::new(request.into(), send, timeout).send().await
    }

    /// Connect, retrying per the session retry policy, and return the
    /// event loop of the established channel.
    pub async fn connect(&self) -> Result<SecureChannelEventLoop, StatusCode> {
        self.request_send.store(None);
        let mut backoff = self.session_retry_policy.new_backoff();
        loop {
            match self.connect_no_retry().await {
                Ok(event_loop) => {
                    break Ok(event_loop);
                }
                Err(s) => {
                    let Some(delay) = backoff.next() else {
                        self.emit(ChannelEvent::Closed { status: s });
                        break Err(s);
                    };
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Connect once, without retrying.
    pub async fn connect_no_retry(&self) -> Result<SecureChannelEventLoop, StatusCode> {
        {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel.clear_security_token();
        }

        let (mut transport, send) = self.create_transport().await?;

        let request = self.state.begin_issue_or_renew_secure_channel(
            SecurityTokenRequestType::Issue,
            self.channel_lifetime,
            Duration::from_secs(30),
            send.clone(),
        );

        // The transport must be polled while the OPN is in flight, nothing
        // else drives it yet
        let request_fut = request.send();
        tokio::pin!(request_fut);
        let response = loop {
            tokio::select! {
                r = &mut request_fut => break r?,
                r = transport.poll() => {
                    if let TransportPollResult::Closed(e) = r {
                        return Err(e);
                    }
                }
            }
        };

        self.request_send.store(Some(Arc::new(send)));
        self.state.end_issue_or_renew_secure_channel(response)?;

        let channel_id = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            secure_channel.secure_channel_id()
        };
        self.emit(ChannelEvent::Opened { channel_id });

        Ok(SecureChannelEventLoop { transport })
    }

    async fn create_transport(
        &self,
    ) -> Result<(TcpTransport, tokio::sync::mpsc::Sender<OutgoingMessage>), StatusCode> {
        let endpoint_url = self.channel_info.endpoint_url.clone();
        debug!("Connecting to {}", endpoint_url);
        let security_policy =
            SecurityPolicy::from_str(&self.channel_info.security_policy_uri).unwrap_or_default();
        if security_policy == SecurityPolicy::Unknown {
            error!(
                "connect, security policy \"{}\" is unknown",
                self.channel_info.security_policy_uri
            );
            return Err(StatusCode::BadSecurityPolicyRejected);
        }

        {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel.set_security_policy(security_policy);
            secure_channel.set_security_mode(self.channel_info.security_mode);
            let _ = secure_channel
                .set_remote_cert_from_byte_string(&self.channel_info.server_certificate);
            debug!(
                "Security policy = {:?}, mode = {:?}",
                security_policy, self.channel_info.security_mode
            );
        }

        let (send, recv) = tokio::sync::mpsc::channel(MAX_INFLIGHT_MESSAGES);
        let transport = self
            .connector
            .connect(
                self.secure_channel.clone(),
                recv,
                self.transport_config.clone(),
                &endpoint_url,
            )
            .await?;
        Ok((transport, send))
    }

    /// Send CLO and stop. The server never responds to CLO, the request
    /// is fire and forget and the connection closes behind it.
    pub async fn close_channel(&self) {
        let msg = CloseSecureChannelRequest {
            request_header: self.state.make_request_header(Duration::from_secs(60)),
        };
        let sender = self.request_send.load().as_deref().cloned();
        if let Some(sender) = sender {
            let request = Request::new(msg, sender, Duration::from_secs(60));
            if let Err(e) = request.send_no_response().await {
                error!("Failed to send the close request: {}", e);
            }
        }
        self.emit(ChannelEvent::Closed {
            status: StatusCode::Good,
        });
    }
}
