// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The header common to every service response.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::{byte_len_array, BinaryDecodable, BinaryEncodable, EncodingResult},
    extension_object::ExtensionObject,
    status_code::StatusCode,
    string::UAString,
};

/// Common parameters of every service response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseHeader {
    /// Time the response was sent.
    pub timestamp: DateTime,
    /// The handle the client supplied in the request.
    pub request_handle: u32,
    /// The result of the service call as a whole.
    pub service_result: StatusCode,
    /// Diagnostics for the service call.
    pub service_diagnostics: DiagnosticInfo,
    /// String table referenced by diagnostic indexes.
    pub string_table: Option<Vec<UAString>>,
    /// Reserved extension point, always null today.
    pub additional_header: ExtensionObject,
}

impl BinaryEncodable for ResponseHeader {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.timestamp.byte_len(ctx)
            + 4
            + self.service_result.byte_len(ctx)
            + self.service_diagnostics.byte_len(ctx)
            + byte_len_array(&self.string_table, ctx)
            + self.additional_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.timestamp.encode(stream, ctx)?;
        self.request_handle.encode(stream, ctx)?;
        self.service_result.encode(stream, ctx)?;
        self.service_diagnostics.encode(stream, ctx)?;
        self.string_table.encode(stream, ctx)?;
        self.additional_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for ResponseHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ResponseHeader {
            timestamp: DateTime::decode(stream, ctx)?,
            request_handle: u32::decode(stream, ctx)?,
            service_result: StatusCode::decode(stream, ctx)?,
            service_diagnostics: DiagnosticInfo::decode(stream, ctx)?,
            string_table: BinaryDecodable::decode(stream, ctx)?,
            additional_header: ExtensionObject::decode(stream, ctx)?,
        })
    }
}

impl ResponseHeader {
    /// Create a good response header answering `request_handle`.
    pub fn new_good(request_handle: u32) -> ResponseHeader {
        Self::new_service_result(request_handle, StatusCode::Good)
    }

    /// Create a response header with the given service result.
    pub fn new_service_result(request_handle: u32, service_result: StatusCode) -> ResponseHeader {
        ResponseHeader {
            timestamp: DateTime::now(),
            request_handle,
            service_result,
            ..Default::default()
        }
    }
}
