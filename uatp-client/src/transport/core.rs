// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Shared transport state: the in-flight request table and inbound chunk
//! assembly.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use log::{debug, error, warn};
use tokio::sync::mpsc::Receiver;

use uatp_core::{
    comms::{
        chunker::Chunker,
        message_chunk::{MessageChunk, MessageIsFinalType},
        secure_channel::SecureChannel,
        tcp_codec::Message,
    },
    sync::RwLock,
    trace_read_lock, trace_write_lock, RequestMessage, ResponseMessage,
};
use uatp_types::{DecodingOptions, StatusCode};

/// Result of one call to `Transport::poll`.
#[derive(Debug, Clone, Copy)]
pub enum TransportPollResult {
    /// A frame arrived and was processed.
    IncomingMessage,
    /// An outgoing message was chunked and queued.
    OutgoingMessage,
    /// Some queued bytes were written to the stream.
    OutgoingMessageSent,
    /// A request failed without killing the connection.
    RecoverableError(StatusCode),
    /// The connection is closed.
    Closed(StatusCode),
}

/// One outgoing request, with the responder to complete when its response
/// arrives. `None` for fire and forget messages like CLO.
pub struct OutgoingMessage {
    /// The request to send.
    pub request: RequestMessage,
    /// Completed with the response or a failure status.
    pub callback: Option<tokio::sync::oneshot::Sender<Result<ResponseMessage, StatusCode>>>,
    /// When the request gives up.
    pub deadline: Instant,
}

struct MessageState {
    callback: Option<tokio::sync::oneshot::Sender<Result<ResponseMessage, StatusCode>>>,
    deadline: Instant,
    /// Chunks of the response received so far.
    chunks: Vec<MessageChunk>,
    /// Cumulative byte size of the chunks received so far.
    cumulative_size: usize,
}

/// State shared by transport implementations: the channel, the in-flight
/// request table and inbound chunk assembly per request id.
pub struct TransportState {
    /// The secure channel owning keys and tokens.
    pub secure_channel: Arc<RwLock<SecureChannel>>,
    outgoing_recv: Receiver<OutgoingMessage>,
    /// In-flight requests and partially assembled responses, by request
    /// id.
    message_states: HashMap<u32, MessageState>,
    max_pending_incoming: usize,
    /// Largest single inbound chunk, from the HEL/ACK negotiation.
    max_inbound_chunk_size: usize,
    last_received_sequence_number: u32,
    /// Next request id handed to an outgoing message. Per channel,
    /// monotonic, never zero.
    next_request_id: u32,
    /// Chunks that arrived for a request id with no in-flight entry.
    /// A steadily growing count points at a misbehaving peer.
    stale_chunk_count: u64,
}

impl TransportState {
    /// Create transport state around a channel and outgoing queue.
    pub fn new(
        secure_channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        max_pending_incoming: usize,
        max_inbound_chunk_size: usize,
    ) -> Self {
        Self {
            secure_channel,
            outgoing_recv,
            message_states: HashMap::new(),
            max_pending_incoming,
            max_inbound_chunk_size,
            last_received_sequence_number: 0,
            next_request_id: 1,
            stale_chunk_count: 0,
        }
    }

    fn take_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Wait for the next outgoing message and register it in the in-flight
    /// table under a fresh request id. Returns `None` when the sender side
    /// is gone and the transport should close.
    pub async fn wait_for_outgoing_message(&mut self) -> Option<(RequestMessage, u32)> {
        loop {
            // Drop requests whose deadline passed while they waited
            self.sweep_expired_requests();

            let message = self.outgoing_recv.recv().await?;
            if self.message_states.len() >= self.max_pending_incoming {
                warn!("Too many pending requests, rejecting the next one");
                if let Some(cb) = message.callback {
                    let _ = cb.send(Err(StatusCode::BadTooManyOperations));
                }
                continue;
            }
            let request_id = self.take_request_id();
            self.message_states.insert(
                request_id,
                MessageState {
                    callback: message.callback,
                    deadline: message.deadline,
                    chunks: Vec::new(),
                    cumulative_size: 0,
                },
            );
            return Some((message.request, request_id));
        }
    }

    /// Fail an in-flight request after a send error.
    pub fn message_send_failed(&mut self, request_id: u32, status: StatusCode) {
        if let Some(state) = self.message_states.remove(&request_id) {
            if let Some(cb) = state.callback {
                let _ = cb.send(Err(status));
            }
        }
    }

    /// Cancel an in-flight request. Chunks already received are dropped,
    /// chunks still arriving will be discarded and counted.
    pub fn cancel_request(&mut self, request_id: u32) {
        if let Some(state) = self.message_states.remove(&request_id) {
            if let Some(cb) = state.callback {
                let _ = cb.send(Err(StatusCode::BadRequestInterrupted));
            }
        }
    }

    /// Number of chunks discarded because their request id had no
    /// in-flight entry.
    pub fn stale_chunk_count(&self) -> u64 {
        self.stale_chunk_count
    }

    /// Handle one inbound frame. Returns an error only for conditions
    /// fatal to the connection.
    pub fn handle_incoming_message(&mut self, message: Message) -> Result<(), StatusCode> {
        match message {
            Message::Hello(_) | Message::Acknowledge(_) => {
                // The handshake is over once the transport runs, these are
                // a state error now
                error!("Unexpected HEL/ACK after the handshake completed");
                Err(StatusCode::BadUnexpectedError)
            }
            Message::Error(error) => {
                let status = error.status();
                error!(
                    "Received an ERR from the server, status {}, reason \"{}\"",
                    status, error.reason
                );
                Err(status)
            }
            Message::Chunk(chunk) => self.process_chunk(chunk),
        }
    }

    fn decoding_options(&self) -> DecodingOptions {
        let secure_channel = trace_read_lock!(self.secure_channel);
        secure_channel.decoding_options()
    }

    fn process_chunk(&mut self, chunk: MessageChunk) -> Result<(), StatusCode> {
        if self.max_inbound_chunk_size > 0 && chunk.data.len() > self.max_inbound_chunk_size {
            error!(
                "Chunk of {} bytes exceeds the negotiated receive buffer of {}",
                chunk.data.len(),
                self.max_inbound_chunk_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge);
        }

        let decoding_options = self.decoding_options();

        let chunk = {
            let mut secure_channel = trace_write_lock!(self.secure_channel);
            secure_channel
                .verify_and_remove_security(&chunk.data)
                .map_err(StatusCode::from)?
        };

        let (request_id, is_final) = {
            let secure_channel = trace_read_lock!(self.secure_channel);
            let info = chunk.chunk_info(&secure_channel).map_err(StatusCode::from)?;
            (
                info.sequence_header.request_id,
                info.message_header.is_final,
            )
        };

        match is_final {
            MessageIsFinalType::FinalError => {
                // The peer aborted the message mid stream
                let Some(state) = self.message_states.remove(&request_id) else {
                    return self.note_stale_chunk(request_id);
                };
                warn!("Server aborted request {} mid message", request_id);
                if let Some(cb) = state.callback {
                    let _ = cb.send(Err(StatusCode::BadRequestInterrupted));
                }
                Ok(())
            }
            MessageIsFinalType::Intermediate => {
                let Some(state) = self.message_states.get_mut(&request_id) else {
                    return self.note_stale_chunk(request_id);
                };
                Self::accumulate_chunk(state, chunk, request_id, &decoding_options)
            }
            MessageIsFinalType::Final => {
                let Some(mut state) = self.message_states.remove(&request_id) else {
                    return self.note_stale_chunk(request_id);
                };
                Self::accumulate_chunk(&mut state, chunk, request_id, &decoding_options)?;
                self.complete_message(request_id, state)
            }
        }
    }

    // Count a chunk whose request id has no in-flight entry: cancelled, or
    // never ours. The counter makes a misbehaving peer visible.
    fn note_stale_chunk(&mut self, request_id: u32) -> Result<(), StatusCode> {
        self.stale_chunk_count += 1;
        debug!(
            "Discarding chunk for unknown request id {}, {} so far",
            request_id, self.stale_chunk_count
        );
        Ok(())
    }

    fn accumulate_chunk(
        state: &mut MessageState,
        chunk: MessageChunk,
        request_id: u32,
        decoding_options: &DecodingOptions,
    ) -> Result<(), StatusCode> {
        state.cumulative_size += chunk.data.len();
        if decoding_options.max_message_size > 0
            && state.cumulative_size > decoding_options.max_message_size
        {
            error!(
                "Reassembled message for request {} exceeds max message size {}",
                request_id, decoding_options.max_message_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge);
        }
        state.chunks.push(chunk);
        if decoding_options.max_chunk_count > 0
            && state.chunks.len() > decoding_options.max_chunk_count
        {
            error!(
                "Message for request {} exceeds max chunk count {}",
                request_id, decoding_options.max_chunk_count
            );
            return Err(StatusCode::BadEncodingLimitsExceeded);
        }
        Ok(())
    }

    fn complete_message(&mut self, request_id: u32, state: MessageState) -> Result<(), StatusCode> {
        let secure_channel = trace_read_lock!(self.secure_channel);

        let result = Chunker::validate_chunks(
            self.last_received_sequence_number.wrapping_add(1),
            &secure_channel,
            &state.chunks,
        )
        .and_then(|last_sequence_number| {
            self.last_received_sequence_number = last_sequence_number;
            Chunker::decode::<ResponseMessage>(&state.chunks, &secure_channel, None)
        });
        drop(secure_channel);

        match result {
            Ok(message) => {
                debug!("Delivering response for request {}", request_id);
                if let Some(cb) = state.callback {
                    let _ = cb.send(Ok(message));
                }
                Ok(())
            }
            Err(e) => {
                // Sequence or channel id violations are fatal, a body that
                // merely fails to decode only fails the request
                let status = e.status();
                if matches!(
                    status,
                    StatusCode::BadSequenceNumberInvalid | StatusCode::BadSecureChannelIdInvalid
                ) {
                    if let Some(cb) = state.callback {
                        let _ = cb.send(Err(status));
                    }
                    Err(status)
                } else {
                    if let Some(cb) = state.callback {
                        let _ = cb.send(Err(status));
                    }
                    Ok(())
                }
            }
        }
    }

    fn sweep_expired_requests(&mut self) {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .message_states
            .iter()
            .filter(|(_, state)| state.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            debug!("Request {} timed out", id);
            if let Some(state) = self.message_states.remove(&id) {
                if let Some(cb) = state.callback {
                    let _ = cb.send(Err(StatusCode::BadTimeout));
                }
            }
        }
    }

    /// Fail every in-flight request and close the outgoing queue.
    pub async fn close(&mut self, status: StatusCode) -> StatusCode {
        self.outgoing_recv.close();
        // Anything still queued is failed too
        while let Ok(message) = self.outgoing_recv.try_recv() {
            if let Some(cb) = message.callback {
                let _ = cb.send(Err(StatusCode::BadConnectionClosed));
            }
        }
        for (_, state) in self.message_states.drain() {
            if let Some(cb) = state.callback {
                let _ = cb.send(Err(if status.is_good() {
                    StatusCode::BadConnectionClosed
                } else {
                    status
                }));
            }
        }
        status
    }
}
