// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! [`RequestMessage`] and [`ResponseMessage`], the service messages the
//! channel itself can frame and deliver.

use std::io::Read;

use uatp_types::{BinaryEncodable, Context, EncodingResult, NodeId, ObjectId};

mod request;
mod response;

pub use request::RequestMessage;
pub use response::ResponseMessage;

use crate::comms::message_chunk::MessageChunkType;

/// Trait implemented by messages and message chunks.
pub trait MessageType {
    /// The chunk type this message travels in: OPN, CLO or MSG.
    fn message_type(&self) -> MessageChunkType;
}

/// Trait implemented by service messages.
pub trait Message: BinaryEncodable + MessageType {
    /// The request handle carried in the message header.
    fn request_handle(&self) -> u32;

    /// Decode a message given its encoding object id, which the chunker
    /// reads off the front of the reassembled body.
    fn decode_by_object_id<S: Read>(
        stream: &mut S,
        object_id: ObjectId,
        ctx: &Context<'_>,
    ) -> EncodingResult<Self>
    where
        Self: Sized;

    /// The encoding id written in front of the message body.
    fn type_id(&self) -> NodeId;
}
