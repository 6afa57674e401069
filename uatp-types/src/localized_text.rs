// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Human readable text with an optional locale.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::{
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, EncodingResult, UaNullable,
    },
    string::UAString,
};

const HAS_LOCALE: u8 = 0x1;
const HAS_TEXT: u8 = 0x2;

/// Text in a specific locale. Either field may be absent, signalled by an
/// encoding mask byte on the wire.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default)]
pub struct LocalizedText {
    /// The locale, e.g. "en-GB".
    pub locale: UAString,
    /// The text in that locale.
    pub text: UAString,
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl UaNullable for LocalizedText {
    fn is_ua_null(&self) -> bool {
        self.locale.is_null() && self.text.is_null()
    }
}

impl BinaryEncodable for LocalizedText {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size = 1;
        if !self.locale.is_null() {
            size += self.locale.byte_len(ctx);
        }
        if !self.text.is_null() {
            size += self.text.byte_len(ctx);
        }
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        let mut mask = 0u8;
        if !self.locale.is_null() {
            mask |= HAS_LOCALE;
        }
        if !self.text.is_null() {
            mask |= HAS_TEXT;
        }
        write_u8(stream, mask)?;
        if !self.locale.is_null() {
            self.locale.encode(stream, ctx)?;
        }
        if !self.text.is_null() {
            self.text.encode(stream, ctx)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for LocalizedText {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        let mask = read_u8(stream)?;
        let locale = if mask & HAS_LOCALE != 0 {
            UAString::decode(stream, ctx)?
        } else {
            UAString::null()
        };
        let text = if mask & HAS_TEXT != 0 {
            UAString::decode(stream, ctx)?
        } else {
            UAString::null()
        };
        Ok(LocalizedText { locale, text })
    }
}

impl<'a> From<&'a str> for LocalizedText {
    fn from(value: &'a str) -> Self {
        LocalizedText {
            locale: UAString::null(),
            text: value.into(),
        }
    }
}

impl LocalizedText {
    /// Create a localized text.
    pub fn new(locale: &str, text: &str) -> LocalizedText {
        LocalizedText {
            locale: locale.into(),
            text: text.into(),
        }
    }

    /// The null localized text.
    pub fn null() -> LocalizedText {
        LocalizedText::default()
    }
}
