// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! HMAC signing and the pseudo random function used for key derivation.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use uatp_types::{Error, StatusCode};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Output size in bytes of SHA-1.
pub const SHA1_SIZE: usize = 20;
/// Output size in bytes of SHA-256.
pub const SHA256_SIZE: usize = 32;

fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sign `data` with HMAC-SHA-1, writing the MAC into `signature`.
pub fn hmac_sha1_sign(key: &[u8], data: &[u8], signature: &mut [u8]) -> Result<(), Error> {
    if signature.len() != SHA1_SIZE {
        return Err(Error::new(
            StatusCode::BadSecurityChecksFailed,
            format!("Signature buffer is {} bytes, expected 20", signature.len()),
        ));
    }
    signature.copy_from_slice(&hmac_sha1(key, data));
    Ok(())
}

/// Verify an HMAC-SHA-1 MAC over `data`.
pub fn hmac_sha1_verify(key: &[u8], data: &[u8], signature: &[u8]) -> Result<(), Error> {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(signature)
        .map_err(|_| Error::new(StatusCode::BadSecurityChecksFailed, "HMAC-SHA-1 mismatch"))
}

/// Sign `data` with HMAC-SHA-256, writing the MAC into `signature`.
pub fn hmac_sha256_sign(key: &[u8], data: &[u8], signature: &mut [u8]) -> Result<(), Error> {
    if signature.len() != SHA256_SIZE {
        return Err(Error::new(
            StatusCode::BadSecurityChecksFailed,
            format!("Signature buffer is {} bytes, expected 32", signature.len()),
        ));
    }
    signature.copy_from_slice(&hmac_sha256(key, data));
    Ok(())
}

/// Verify an HMAC-SHA-256 MAC over `data`.
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], signature: &[u8]) -> Result<(), Error> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(signature)
        .map_err(|_| Error::new(StatusCode::BadSecurityChecksFailed, "HMAC-SHA-256 mismatch"))
}

/// The hash behind the PRF.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrfDigest {
    /// P_SHA1, used by the legacy policies.
    Sha1,
    /// P_SHA256.
    Sha256,
}

/// The TLS style pseudo random function from OPC UA Part 6.
///
/// `A(0) = seed`, `A(n) = HMAC(secret, A(n-1))`, output is the
/// concatenation of `HMAC(secret, A(n) || seed)` truncated to `length`.
pub fn prf(digest: PrfDigest, secret: &[u8], seed: &[u8], length: usize, offset: usize) -> Vec<u8> {
    let hmac = match digest {
        PrfDigest::Sha1 => hmac_sha1,
        PrfDigest::Sha256 => hmac_sha256,
    };
    let mut out = Vec::with_capacity(length + offset);
    let mut a = hmac(secret, seed);
    while out.len() < length + offset {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        out.extend_from_slice(&hmac(secret, &input));
        a = hmac(secret, &a);
    }
    out[offset..offset + length].to_vec()
}

#[cfg(test)]
mod tests {
    use super::{prf, PrfDigest};

    #[test]
    fn prf_is_deterministic_and_sized() {
        let a = prf(PrfDigest::Sha256, b"secret", b"seed", 80, 0);
        let b = prf(PrfDigest::Sha256, b"secret", b"seed", 80, 0);
        assert_eq!(a.len(), 80);
        assert_eq!(a, b);
        // A different seed produces different output
        let c = prf(PrfDigest::Sha256, b"secret", b"seeds", 80, 0);
        assert_ne!(a, c);
    }

    #[test]
    fn prf_offset_is_a_window() {
        let all = prf(PrfDigest::Sha1, b"secret", b"seed", 64, 0);
        let tail = prf(PrfDigest::Sha1, b"secret", b"seed", 32, 32);
        assert_eq!(&all[32..], tail.as_slice());
    }

    #[test]
    fn hmac_sign_verify() {
        let mut sig = [0u8; 32];
        super::hmac_sha256_sign(b"key", b"data", &mut sig).unwrap();
        super::hmac_sha256_verify(b"key", b"data", &sig).unwrap();
        assert!(super::hmac_sha256_verify(b"key", b"tampered", &sig).is_err());
    }
}
