// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The OPC UA string type, which distinguishes a null string from an
//! empty one on the wire.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::encoding::{
    process_len, read_i32, write_i32, DecodingOptions, EncodingResult, Error,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};

/// An OPC UA string is either null or a sequence of UTF-8 bytes. The wire
/// format prefixes the bytes with an i32 length where -1 means null and 0
/// means empty, and the two must stay distinguishable.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct UAString {
    value: Option<String>,
}

impl fmt::Display for UAString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(ref value) => write!(f, "{}", value),
            None => write!(f, "[null]"),
        }
    }
}

impl UaNullable for UAString {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl SimpleBinaryEncodable for UAString {
    fn byte_len(&self) -> usize {
        4 + match self.value {
            Some(ref value) => value.len(),
            None => 0,
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self.value {
            Some(ref value) => {
                write_i32(stream, value.len() as i32)?;
                stream.write_all(value.as_bytes()).map_err(Error::encoding)
            }
            None => write_i32(stream, -1),
        }
    }
}

impl SimpleBinaryDecodable for UAString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            return Ok(UAString::null());
        }
        let len = process_len(len, decoding_options.max_string_length, "String")?;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).map_err(Error::decoding)?;
        let value =
            String::from_utf8(buf).map_err(|_| Error::decoding("String is not valid UTF-8"))?;
        Ok(UAString::from(value))
    }
}

impl From<UAString> for String {
    fn from(value: UAString) -> Self {
        value.as_ref().to_string()
    }
}

impl AsRef<str> for UAString {
    fn as_ref(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl<'a> From<&'a str> for UAString {
    fn from(value: &'a str) -> Self {
        Self {
            value: Some(value.to_string()),
        }
    }
}

impl From<&String> for UAString {
    fn from(value: &String) -> Self {
        Self {
            value: Some(value.clone()),
        }
    }
}

impl From<String> for UAString {
    fn from(value: String) -> Self {
        Self { value: Some(value) }
    }
}

impl From<Option<String>> for UAString {
    fn from(value: Option<String>) -> Self {
        Self { value }
    }
}

impl PartialEq<str> for UAString {
    fn eq(&self, other: &str) -> bool {
        self.value.as_deref() == Some(other)
    }
}

impl UAString {
    /// The inner value, `None` for a null string.
    pub fn value(&self) -> &Option<String> {
        &self.value
    }

    /// Set the inner value.
    pub fn set_value(&mut self, value: Option<String>) {
        self.value = value;
    }

    /// True for the null string.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// True for null and for the zero length string.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map_or(true, |v| v.is_empty())
    }

    /// The length of the string in bytes or -1 for null.
    pub fn len(&self) -> isize {
        self.value.as_ref().map_or(-1, |v| v.len() as isize)
    }

    /// Create a null string.
    pub fn null() -> UAString {
        UAString { value: None }
    }
}

/// An XML element is carried as a string by the binary encoding.
pub type XmlElement = UAString;
