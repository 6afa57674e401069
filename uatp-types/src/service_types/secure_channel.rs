// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The OpenSecureChannel and CloseSecureChannel service messages.

use std::io::{Read, Write};

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    message_info::MessageInfo,
    node_ids::{DataTypeId, ObjectId},
    request_header::RequestHeader,
    response_header::ResponseHeader,
};

use super::enums::{MessageSecurityMode, SecurityTokenRequestType};

/// The token issued with an OpenSecureChannel response. Identifies the
/// channel and bounds the lifetime of the keys derived from the exchanged
/// nonces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelSecurityToken {
    /// Channel id assigned by the server.
    pub channel_id: u32,
    /// Id of this token, unique within the channel.
    pub token_id: u32,
    /// Server time when the token was created.
    pub created_at: DateTime,
    /// Lifetime of the token in milliseconds.
    pub revised_lifetime: u32,
}

impl BinaryEncodable for ChannelSecurityToken {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        4 + 4 + self.created_at.byte_len(ctx) + 4
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.channel_id.encode(stream, ctx)?;
        self.token_id.encode(stream, ctx)?;
        self.created_at.encode(stream, ctx)?;
        self.revised_lifetime.encode(stream, ctx)
    }
}

impl BinaryDecodable for ChannelSecurityToken {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ChannelSecurityToken {
            channel_id: u32::decode(stream, ctx)?,
            token_id: u32::decode(stream, ctx)?,
            created_at: DateTime::decode(stream, ctx)?,
            revised_lifetime: u32::decode(stream, ctx)?,
        })
    }
}

/// Opens a secure channel or renews the token of an existing one. Always
/// carried in an OPN chunk with asymmetric security.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelRequest {
    /// Common request parameters.
    pub request_header: RequestHeader,
    /// Protocol version the client implements.
    pub client_protocol_version: u32,
    /// Issue or renew.
    pub request_type: SecurityTokenRequestType,
    /// The security mode requested for the channel.
    pub security_mode: MessageSecurityMode,
    /// Key derivation entropy from the client.
    pub client_nonce: ByteString,
    /// Requested token lifetime in milliseconds.
    pub requested_lifetime: u32,
}

impl MessageInfo for OpenSecureChannelRequest {
    fn type_id(&self) -> ObjectId {
        ObjectId::OpenSecureChannelRequest_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::OpenSecureChannelRequest
    }
}

impl BinaryEncodable for OpenSecureChannelRequest {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.request_header.byte_len(ctx)
            + 4
            + self.request_type.byte_len(ctx)
            + self.security_mode.byte_len(ctx)
            + self.client_nonce.byte_len(ctx)
            + 4
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.request_header.encode(stream, ctx)?;
        self.client_protocol_version.encode(stream, ctx)?;
        self.request_type.encode(stream, ctx)?;
        self.security_mode.encode(stream, ctx)?;
        self.client_nonce.encode(stream, ctx)?;
        self.requested_lifetime.encode(stream, ctx)
    }
}

impl BinaryDecodable for OpenSecureChannelRequest {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(OpenSecureChannelRequest {
            request_header: RequestHeader::decode(stream, ctx)?,
            client_protocol_version: u32::decode(stream, ctx)?,
            request_type: SecurityTokenRequestType::decode(stream, ctx)?,
            security_mode: MessageSecurityMode::decode(stream, ctx)?,
            client_nonce: ByteString::decode(stream, ctx)?,
            requested_lifetime: u32::decode(stream, ctx)?,
        })
    }
}

/// Response to an [`OpenSecureChannelRequest`], carrying the issued token
/// and the server's nonce.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelResponse {
    /// Common response parameters.
    pub response_header: ResponseHeader,
    /// Protocol version the server implements.
    pub server_protocol_version: u32,
    /// The issued or renewed token.
    pub security_token: ChannelSecurityToken,
    /// Key derivation entropy from the server.
    pub server_nonce: ByteString,
}

impl MessageInfo for OpenSecureChannelResponse {
    fn type_id(&self) -> ObjectId {
        ObjectId::OpenSecureChannelResponse_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::OpenSecureChannelResponse
    }
}

impl BinaryEncodable for OpenSecureChannelResponse {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
            + 4
            + self.security_token.byte_len(ctx)
            + self.server_nonce.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)?;
        self.server_protocol_version.encode(stream, ctx)?;
        self.security_token.encode(stream, ctx)?;
        self.server_nonce.encode(stream, ctx)
    }
}

impl BinaryDecodable for OpenSecureChannelResponse {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(OpenSecureChannelResponse {
            response_header: ResponseHeader::decode(stream, ctx)?,
            server_protocol_version: u32::decode(stream, ctx)?,
            security_token: ChannelSecurityToken::decode(stream, ctx)?,
            server_nonce: ByteString::decode(stream, ctx)?,
        })
    }
}

/// Closes a secure channel. The server sends no response; the request is
/// fire and forget by design.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelRequest {
    /// Common request parameters.
    pub request_header: RequestHeader,
}

impl MessageInfo for CloseSecureChannelRequest {
    fn type_id(&self) -> ObjectId {
        ObjectId::CloseSecureChannelRequest_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::CloseSecureChannelRequest
    }
}

impl BinaryEncodable for CloseSecureChannelRequest {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.request_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.request_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for CloseSecureChannelRequest {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(CloseSecureChannelRequest {
            request_header: RequestHeader::decode(stream, ctx)?,
        })
    }
}

/// Response to a [`CloseSecureChannelRequest`]. Defined by the standard
/// but never actually sent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelResponse {
    /// Common response parameters.
    pub response_header: ResponseHeader,
}

impl MessageInfo for CloseSecureChannelResponse {
    fn type_id(&self) -> ObjectId {
        ObjectId::CloseSecureChannelResponse_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::CloseSecureChannelResponse
    }
}

impl BinaryEncodable for CloseSecureChannelResponse {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for CloseSecureChannelResponse {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(CloseSecureChannelResponse {
            response_header: ResponseHeader::decode(stream, ctx)?,
        })
    }
}
