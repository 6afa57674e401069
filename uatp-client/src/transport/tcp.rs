// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The TCP transport: socket establishment, the HEL/ACK exchange, and the
//! poll loop moving chunks in both directions.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, error, trace, warn};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;

use uatp_core::{
    comms::{
        buffer::SendBuffer,
        secure_channel::SecureChannel,
        tcp_codec::{Message, TcpCodec},
        tcp_types::{AcknowledgeMessage, ErrorMessage, HelloMessage},
        url::hostname_port_from_url,
    },
    sync::RwLock,
    trace_read_lock, RequestMessage,
};
use uatp_types::{SimpleBinaryEncodable, StatusCode};

use super::connect::{Connector, Transport};
use super::core::{OutgoingMessage, TransportPollResult, TransportState};

#[derive(Debug, Clone, Copy)]
enum TransportCloseState {
    Open,
    Closing(StatusCode),
    Closed(StatusCode),
}

/// Transport limits handed to a connector.
#[derive(Debug, Clone)]
pub struct TransportConfiguration {
    /// Most responses allowed in flight at once.
    pub max_pending_incoming: usize,
    /// Largest chunk to send, before revision by the ACK.
    pub send_buffer_size: usize,
    /// Largest chunk to receive.
    pub recv_buffer_size: usize,
    /// Largest reassembled message, 0 for no limit.
    pub max_message_size: usize,
    /// Most chunks per message, 0 for no limit.
    pub max_chunk_count: usize,
}

/// A connected TCP transport after a completed HEL/ACK exchange.
pub struct TcpTransport {
    state: TransportState,
    read: FramedRead<ReadHalf<TcpStream>, TcpCodec>,
    write: WriteHalf<TcpStream>,
    send_buffer: SendBuffer,
    should_close: bool,
    closed: TransportCloseState,
}

/// Connector establishing plain TCP connections.
pub struct TcpConnector;

impl TcpConnector {
    async fn connect_inner(
        secure_channel: &RwLock<SecureChannel>,
        config: &TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<
        (
            FramedRead<ReadHalf<TcpStream>, TcpCodec>,
            WriteHalf<TcpStream>,
            AcknowledgeMessage,
        ),
        StatusCode,
    > {
        let (host, port) = hostname_port_from_url(
            endpoint_url,
            uatp_core::constants::DEFAULT_OPC_UA_SERVER_PORT,
        )
        .map_err(StatusCode::from)?;

        let addr = {
            let addr = format!("{}:{}", host, port);
            match tokio::net::lookup_host(addr).await {
                Ok(mut addrs) => match addrs.next() {
                    Some(addr) => addr,
                    None => {
                        error!("Endpoint {} does not resolve to any address", endpoint_url);
                        return Err(StatusCode::BadTcpEndpointUrlInvalid);
                    }
                },
                Err(e) => {
                    error!("Endpoint {} cannot be resolved: {:?}", endpoint_url, e);
                    return Err(StatusCode::BadTcpEndpointUrlInvalid);
                }
            }
        };

        debug!("Connecting to {} with url {}", addr, endpoint_url);
        let socket = TcpStream::connect(&addr).await.map_err(|err| {
            error!("Could not connect to host {}: {:?}", addr, err);
            StatusCode::BadCommunicationError
        })?;
        let (reader, mut writer) = tokio::io::split(socket);

        let hello = HelloMessage::new(
            endpoint_url,
            config.send_buffer_size,
            config.recv_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        trace!("Sending hello: {:?}", hello);

        let mut framed_read = {
            let secure_channel = trace_read_lock!(secure_channel);
            FramedRead::new(
                reader,
                TcpCodec::new(config.recv_buffer_size, secure_channel.decoding_options()),
            )
        };

        writer
            .write_all(&hello.encode_to_vec())
            .await
            .map_err(|err| {
                error!("Cannot send hello to server: {}", err);
                StatusCode::BadCommunicationError
            })?;

        // The server must answer the hello with an ACK, anything else is a
        // state error
        let ack = match framed_read.next().await {
            Some(Ok(Message::Acknowledge(ack))) => {
                if ack.send_buffer_size > hello.receive_buffer_size {
                    warn!("Acknowledged send buffer exceeds the hello receive buffer");
                }
                if ack.receive_buffer_size > hello.send_buffer_size {
                    warn!("Acknowledged receive buffer exceeds the hello send buffer");
                }
                trace!("Received acknowledge: {:?}", ack);
                ack
            }
            Some(Ok(Message::Error(err))) => {
                error!(
                    "Server rejected the hello, status {}, reason \"{}\"",
                    err.status(),
                    err.reason
                );
                return Err(err.status());
            }
            other => {
                error!("Expected an ACK from the server, got {:?}", other);
                return Err(StatusCode::BadConnectionClosed);
            }
        };

        Ok((framed_read, writer, ack))
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: tokio::sync::mpsc::Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<TcpTransport, StatusCode> {
        let (framed_read, writer, ack) =
            Self::connect_inner(&channel, &config, endpoint_url).await?;

        // Effective limits are the minimum of ours and the peer's,
        // applied symmetrically on both sides
        let mut buffer = SendBuffer::new(
            config.send_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        buffer.revise(
            ack.receive_buffer_size as usize,
            ack.max_message_size as usize,
            ack.max_chunk_count as usize,
        );

        Ok(TcpTransport {
            state: TransportState::new(
                channel,
                outgoing_recv,
                config.max_pending_incoming,
                ack.send_buffer_size.min(config.recv_buffer_size as u32) as usize,
            ),
            read: framed_read,
            write: writer,
            send_buffer: buffer,
            should_close: false,
            closed: TransportCloseState::Open,
        })
    }
}

impl TcpTransport {
    // Whether a fatal status is reported to the peer with an ERR before
    // the socket drops. Framing and state errors are; failed security
    // checks close silently, and a dead stream gets nothing.
    fn should_notify_peer(status: StatusCode) -> bool {
        if status.is_good() {
            return false;
        }
        !matches!(
            status,
            StatusCode::BadSecurityChecksFailed
                | StatusCode::BadSecureChannelTokenUnknown
                | StatusCode::BadSecureChannelIdInvalid
                | StatusCode::BadSecurityPolicyRejected
                | StatusCode::BadCertificateInvalid
                | StatusCode::BadNoValidCertificates
                | StatusCode::BadNonceInvalid
                | StatusCode::BadConnectionClosed
                | StatusCode::BadCommunicationError
        )
    }

    // Best effort: the ERR goes out if the write half still accepts it,
    // nothing waits on the outcome.
    async fn send_error_message(&mut self, status: StatusCode) {
        let message = ErrorMessage::new(status, status.name());
        if let Err(e) = self.write.write_all(&message.encode_to_vec()).await {
            debug!("Could not send ERR before closing: {}", e);
        }
    }

    fn handle_incoming_message(
        &mut self,
        incoming: Option<Result<Message, std::io::Error>>,
    ) -> TransportPollResult {
        let Some(incoming) = incoming else {
            return TransportPollResult::Closed(StatusCode::BadConnectionClosed);
        };
        match incoming {
            Ok(message) => {
                if let Err(e) = self.state.handle_incoming_message(message) {
                    TransportPollResult::Closed(e)
                } else {
                    TransportPollResult::IncomingMessage
                }
            }
            Err(err) => {
                error!("Error reading from stream: {}", err);
                TransportPollResult::Closed(StatusCode::BadConnectionClosed)
            }
        }
    }

    async fn poll_inner(&mut self) -> TransportPollResult {
        // If chunks are queued and the write buffer is drained, secure the
        // next chunk before anything else.
        if self.send_buffer.should_encode_chunks() {
            let secure_channel = trace_read_lock!(self.state.secure_channel);
            if let Err(e) = self.send_buffer.encode_next_chunk(&secure_channel) {
                return TransportPollResult::Closed(e.status());
            }
        }

        // With bytes pending, write them while listening for frames. With
        // nothing pending, wait for the next outgoing message instead, so
        // the send buffer cannot fill without bound.
        if self.send_buffer.can_read() {
            tokio::select! {
                r = self.send_buffer.read_into_async(&mut self.write) => {
                    if let Err(e) = r {
                        error!("Writing to the stream failed: {}", e);
                        return TransportPollResult::Closed(StatusCode::BadCommunicationError);
                    }
                    TransportPollResult::OutgoingMessageSent
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        } else {
            if self.should_close {
                debug!("Closing the connection after the final CLO went out");
                return TransportPollResult::Closed(StatusCode::Good);
            }
            tokio::select! {
                outgoing = self.state.wait_for_outgoing_message() => {
                    let Some((outgoing, request_id)) = outgoing else {
                        return TransportPollResult::Closed(StatusCode::Good);
                    };
                    // Sending CLO means the connection closes right after,
                    // the server never answers it
                    if matches!(outgoing, RequestMessage::CloseSecureChannel(_)) {
                        self.should_close = true;
                    }
                    let secure_channel = trace_read_lock!(self.state.secure_channel);
                    match self.send_buffer.write(request_id, outgoing, &secure_channel) {
                        Err(e) => {
                            drop(secure_channel);
                            if let Some((request_id, request_handle)) = e.full_context() {
                                error!(
                                    "Failed to send message with request handle {}: {}",
                                    request_handle,
                                    e.status()
                                );
                                self.state.message_send_failed(request_id, e.status());
                                TransportPollResult::RecoverableError(e.status())
                            } else {
                                TransportPollResult::Closed(e.status())
                            }
                        }
                        Ok(_) => TransportPollResult::OutgoingMessage,
                    }
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        }
    }
}

impl Transport for TcpTransport {
    async fn poll(&mut self) -> TransportPollResult {
        // poll must be cancel safe. `poll_inner` only ever awaits one
        // cancel safe future per call. Closing is the exception: it is
        // made safe by re-running `close` until it completes, then
        // latching the closed state.
        match self.closed {
            TransportCloseState::Open => {}
            TransportCloseState::Closing(c) => {
                let r = self.state.close(c).await;
                self.closed = TransportCloseState::Closed(c);
                return TransportPollResult::Closed(r);
            }
            TransportCloseState::Closed(c) => {
                return TransportPollResult::Closed(c);
            }
        }

        let r = self.poll_inner().await;
        if let TransportPollResult::Closed(status) = &r {
            self.closed = TransportCloseState::Closing(*status);
            // Framing and state errors are reported to the peer before
            // teardown; a cancelled poll here just loses the ERR, the
            // Closing state already latched.
            if Self::should_notify_peer(*status) {
                self.send_error_message(*status).await;
            }
            let r = self.state.close(*status).await;
            self.closed = TransportCloseState::Closed(r);
        }
        r
    }
}
