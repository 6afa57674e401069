// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! An arbitrary sequence of bytes with a distinct null form.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::encoding::{
    process_len, read_i32, write_i32, DecodingOptions, EncodingResult, Error,
    SimpleBinaryDecodable, SimpleBinaryEncodable, UaNullable,
};

/// A sequence of octets. Like [`crate::UAString`], a null byte string and an
/// empty byte string are different values on the wire.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct ByteString {
    /// The raw bytes, `None` when null.
    pub value: Option<Vec<u8>>,
}

impl UaNullable for ByteString {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }
}

impl SimpleBinaryEncodable for ByteString {
    fn byte_len(&self) -> usize {
        4 + self.value.as_ref().map_or(0, |v| v.len())
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self.value {
            Some(ref value) => {
                write_i32(stream, value.len() as i32)?;
                stream.write_all(value).map_err(Error::encoding)
            }
            None => write_i32(stream, -1),
        }
    }
}

impl SimpleBinaryDecodable for ByteString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            return Ok(ByteString::null());
        }
        let len = process_len(len, decoding_options.max_byte_string_length, "ByteString")?;
        let mut value = vec![0u8; len];
        stream.read_exact(&mut value).map_err(Error::decoding)?;
        Ok(ByteString { value: Some(value) })
    }
}

impl<'a, T> From<&'a T> for ByteString
where
    T: AsRef<[u8]> + ?Sized,
{
    fn from(value: &'a T) -> Self {
        ByteString::from(value.as_ref().to_vec())
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(value: Vec<u8>) -> Self {
        ByteString { value: Some(value) }
    }
}

impl ByteString {
    /// Create a null byte string.
    pub fn null() -> ByteString {
        ByteString { value: None }
    }

    /// True for the null byte string.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// True for null and for the zero length byte string.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map_or(true, |v| v.is_empty())
    }

    /// Create a byte string from a base64 encoded string.
    pub fn from_base64(data: &str) -> Option<ByteString> {
        STANDARD.decode(data).map(Self::from).ok()
    }

    /// The value as a base64 encoded string.
    pub fn as_base64(&self) -> String {
        STANDARD.encode(self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::ByteString;

    #[test]
    fn null_and_empty_differ() {
        let null = ByteString::null();
        let empty = ByteString::from(vec![]);
        assert!(null.is_null() && null.is_empty());
        assert!(!empty.is_null() && empty.is_empty());
        assert_ne!(null, empty);
    }

    #[test]
    fn base64() {
        let b = ByteString::from(&[0x01u8, 0x02, 0x03]);
        assert_eq!(ByteString::from_base64(&b.as_base64()), Some(b));
    }
}
