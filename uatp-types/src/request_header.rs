// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The header common to every service request.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    extension_object::ExtensionObject,
    node_id::NodeId,
    string::UAString,
};

/// Common parameters of every service request. The authentication token
/// identifies the session, everything else is bookkeeping and diagnostics
/// control.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestHeader {
    /// The session authentication token, null before a session exists.
    pub authentication_token: NodeId,
    /// Time the request was sent.
    pub timestamp: DateTime,
    /// Client supplied handle returned in the response.
    pub request_handle: u32,
    /// Bit mask selecting the diagnostics to return.
    pub return_diagnostics: u32,
    /// Audit log correlation id.
    pub audit_entry_id: UAString,
    /// Hint for how long the client will wait, in milliseconds.
    pub timeout_hint: u32,
    /// Reserved extension point, always null today.
    pub additional_header: ExtensionObject,
}

impl BinaryEncodable for RequestHeader {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.authentication_token.byte_len(ctx)
            + self.timestamp.byte_len(ctx)
            + 4
            + 4
            + self.audit_entry_id.byte_len(ctx)
            + 4
            + self.additional_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.authentication_token.encode(stream, ctx)?;
        self.timestamp.encode(stream, ctx)?;
        self.request_handle.encode(stream, ctx)?;
        self.return_diagnostics.encode(stream, ctx)?;
        self.audit_entry_id.encode(stream, ctx)?;
        self.timeout_hint.encode(stream, ctx)?;
        self.additional_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for RequestHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(RequestHeader {
            authentication_token: NodeId::decode(stream, ctx)?,
            timestamp: DateTime::decode(stream, ctx)?,
            request_handle: u32::decode(stream, ctx)?,
            return_diagnostics: u32::decode(stream, ctx)?,
            audit_entry_id: UAString::decode(stream, ctx)?,
            timeout_hint: u32::decode(stream, ctx)?,
            additional_header: ExtensionObject::decode(stream, ctx)?,
        })
    }
}

impl RequestHeader {
    /// Create a request header with the given token and handle.
    pub fn new(
        authentication_token: impl Into<NodeId>,
        timestamp: DateTime,
        request_handle: u32,
    ) -> RequestHeader {
        RequestHeader {
            authentication_token: authentication_token.into(),
            timestamp,
            request_handle,
            ..Default::default()
        }
    }
}
