// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Certificate thumbprints.

use sha1::{Digest, Sha1};
use uatp_types::ByteString;

/// The SHA-1 digest of a certificate's DER bytes, used on the wire to name
/// the receiver's certificate in asymmetric security headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbprint {
    value: [u8; Thumbprint::THUMBPRINT_SIZE],
}

impl Thumbprint {
    /// Thumbprint length in bytes.
    pub const THUMBPRINT_SIZE: usize = 20;

    /// Compute the thumbprint of certificate DER bytes.
    pub fn new(der: &[u8]) -> Thumbprint {
        let digest = Sha1::digest(der);
        let mut value = [0u8; Self::THUMBPRINT_SIZE];
        value.copy_from_slice(&digest);
        Thumbprint { value }
    }

    /// The thumbprint bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The thumbprint as a byte string for the wire.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::Thumbprint;

    #[test]
    fn thumbprint_is_20_bytes_and_stable() {
        let a = Thumbprint::new(b"certificate bytes");
        let b = Thumbprint::new(b"certificate bytes");
        assert_eq!(a.value().len(), Thumbprint::THUMBPRINT_SIZE);
        assert_eq!(a, b);
        assert_ne!(a, Thumbprint::new(b"other bytes"));
    }
}
