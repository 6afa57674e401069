// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use uatp_core::{comms::secure_channel::SecureChannel, sync::RwLock};
use uatp_types::StatusCode;

use super::{
    tcp::{TcpTransport, TransportConfiguration},
    OutgoingMessage, TransportPollResult,
};

/// Trait for wrappers that establish a connection to a server, up to and
/// including the HEL/ACK exchange. Retrying is the caller's business, not
/// the connector's.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the endpoint given by `endpoint_url`. On success the
    /// returned transport must be polled to move messages.
    async fn connect(
        &self,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: tokio::sync::mpsc::Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<TcpTransport, StatusCode>;
}

/// Trait for client transports.
///
/// `poll` must be cancel safe: a dropped `poll` future must not lose data
/// or corrupt state. The practical recipe is to await only a single,
/// itself cancel safe future per call.
pub trait Transport: Send + Sync + 'static {
    /// Drive the transport one step: send a queued chunk, receive a frame,
    /// or pick up the next outgoing message.
    fn poll(&mut self) -> impl Future<Output = TransportPollResult> + Send + Sync;
}
