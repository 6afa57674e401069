// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

mod custom;
mod encoding;

use std::fmt::Debug;
use std::io::Cursor;

use crate::{BinaryDecodable, BinaryEncodable, ContextOwned};

/// Encode a value, check the length promise, decode it back and compare.
pub(crate) fn serialize_and_compare<T>(value: &T)
where
    T: BinaryEncodable + BinaryDecodable + PartialEq + Debug,
{
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    let buf = value.encode_to_vec(&ctx);
    assert_eq!(buf.len(), value.byte_len(&ctx));
    let mut stream = Cursor::new(&buf);
    let decoded = T::decode(&mut stream, &ctx).expect("decode failed");
    assert_eq!(&decoded, value);
    // The decoder must consume exactly what the encoder produced
    assert_eq!(stream.position() as usize, buf.len());
}

/// Encode a value and compare against the expected wire bytes.
pub(crate) fn serialize_test_expected<T>(value: &T, expected: &[u8])
where
    T: BinaryEncodable,
{
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    let buf = value.encode_to_vec(&ctx);
    assert_eq!(buf.as_slice(), expected);
}
