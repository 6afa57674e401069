// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Cryptographically secure random data, used for nonces.

use rand::Rng;
use uatp_types::ByteString;

/// Fill `bytes` with random data.
pub fn bytes(bytes: &mut [u8]) {
    rand::thread_rng().fill(bytes);
}

/// A random byte string of `number_of_bytes` length.
pub fn byte_string(number_of_bytes: usize) -> ByteString {
    let mut buf = vec![0u8; number_of_bytes];
    bytes(&mut buf);
    ByteString::from(buf)
}

#[cfg(test)]
mod tests {
    #[test]
    fn byte_string_has_requested_length() {
        let b = super::byte_string(32);
        assert_eq!(b.as_ref().len(), 32);
    }
}
