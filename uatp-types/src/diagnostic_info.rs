// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Vendor specific diagnostics attached to operation results.

use std::io::{Read, Write};

use crate::{
    encoding::{
        read_i32, read_u8, write_i32, write_u8, BinaryDecodable, BinaryEncodable, EncodingResult,
        UaNullable,
    },
    status_code::StatusCode,
    string::UAString,
};

const HAS_SYMBOLIC_ID: u8 = 0x01;
const HAS_NAMESPACE: u8 = 0x02;
const HAS_LOCALIZED_TEXT: u8 = 0x04;
const HAS_LOCALE: u8 = 0x08;
const HAS_ADDITIONAL_INFO: u8 = 0x10;
const HAS_INNER_STATUS_CODE: u8 = 0x20;
const HAS_INNER_DIAGNOSTIC_INFO: u8 = 0x40;

/// Diagnostic information for an operation result. Every field is optional
/// and presence is signalled by an encoding mask byte.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct DiagnosticInfo {
    /// Index into the string table of the symbolic error id.
    pub symbolic_id: Option<i32>,
    /// Index into the string table of the namespace URI of the error.
    pub namespace_uri: Option<i32>,
    /// Index into the string table of the locale of the error text.
    pub locale: Option<i32>,
    /// Index into the string table of the error text.
    pub localized_text: Option<i32>,
    /// Vendor specific detail string.
    pub additional_info: Option<UAString>,
    /// Status code of the underlying failure.
    pub inner_status_code: Option<StatusCode>,
    /// Diagnostics of the underlying failure.
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl UaNullable for DiagnosticInfo {
    fn is_ua_null(&self) -> bool {
        self.encoding_mask() == 0
    }
}

impl BinaryEncodable for DiagnosticInfo {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size = 1;
        if self.symbolic_id.is_some() {
            size += 4;
        }
        if self.namespace_uri.is_some() {
            size += 4;
        }
        if self.locale.is_some() {
            size += 4;
        }
        if self.localized_text.is_some() {
            size += 4;
        }
        if let Some(ref info) = self.additional_info {
            size += info.byte_len(ctx);
        }
        if self.inner_status_code.is_some() {
            size += 4;
        }
        if let Some(ref inner) = self.inner_diagnostic_info {
            size += inner.byte_len(ctx);
        }
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        write_u8(stream, self.encoding_mask())?;
        if let Some(v) = self.symbolic_id {
            write_i32(stream, v)?;
        }
        if let Some(v) = self.namespace_uri {
            write_i32(stream, v)?;
        }
        if let Some(v) = self.locale {
            write_i32(stream, v)?;
        }
        if let Some(v) = self.localized_text {
            write_i32(stream, v)?;
        }
        if let Some(ref v) = self.additional_info {
            v.encode(stream, ctx)?;
        }
        if let Some(v) = self.inner_status_code {
            v.encode(stream, ctx)?;
        }
        if let Some(ref v) = self.inner_diagnostic_info {
            v.encode(stream, ctx)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for DiagnosticInfo {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        // Inner diagnostic info makes this recursive
        let _depth_lock = ctx.options().depth_lock()?;
        let mask = read_u8(stream)?;
        let mut info = DiagnosticInfo::default();
        if mask & HAS_SYMBOLIC_ID != 0 {
            info.symbolic_id = Some(read_i32(stream)?);
        }
        if mask & HAS_NAMESPACE != 0 {
            info.namespace_uri = Some(read_i32(stream)?);
        }
        if mask & HAS_LOCALE != 0 {
            info.locale = Some(read_i32(stream)?);
        }
        if mask & HAS_LOCALIZED_TEXT != 0 {
            info.localized_text = Some(read_i32(stream)?);
        }
        if mask & HAS_ADDITIONAL_INFO != 0 {
            info.additional_info = Some(UAString::decode(stream, ctx)?);
        }
        if mask & HAS_INNER_STATUS_CODE != 0 {
            info.inner_status_code = Some(StatusCode::decode(stream, ctx)?);
        }
        if mask & HAS_INNER_DIAGNOSTIC_INFO != 0 {
            info.inner_diagnostic_info = Some(Box::new(DiagnosticInfo::decode(stream, ctx)?));
        }
        Ok(info)
    }
}

impl DiagnosticInfo {
    /// The null diagnostic info with no fields set.
    pub fn null() -> DiagnosticInfo {
        DiagnosticInfo::default()
    }

    fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.symbolic_id.is_some() {
            mask |= HAS_SYMBOLIC_ID;
        }
        if self.namespace_uri.is_some() {
            mask |= HAS_NAMESPACE;
        }
        if self.locale.is_some() {
            mask |= HAS_LOCALE;
        }
        if self.localized_text.is_some() {
            mask |= HAS_LOCALIZED_TEXT;
        }
        if self.additional_info.is_some() {
            mask |= HAS_ADDITIONAL_INFO;
        }
        if self.inner_status_code.is_some() {
            mask |= HAS_INNER_STATUS_CODE;
        }
        if self.inner_diagnostic_info.is_some() {
            mask |= HAS_INNER_DIAGNOSTIC_INFO;
        }
        mask
    }
}
