// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! RSA key wrappers for the asymmetric channel operations.

use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    traits::PublicKeyParts,
    Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey,
};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use uatp_types::{Error, StatusCode};

/// The padding scheme of an asymmetric encryption operation. Selected by
/// the security policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RsaPadding {
    /// PKCS #1 v1.5.
    Pkcs1,
    /// OAEP with SHA-1.
    OaepSha1,
    /// OAEP with SHA-256.
    OaepSha256,
}

impl RsaPadding {
    /// Bytes of each key-sized block consumed by the padding.
    pub fn overhead(&self) -> usize {
        match self {
            RsaPadding::Pkcs1 => 11,
            RsaPadding::OaepSha1 => 42,
            RsaPadding::OaepSha256 => 66,
        }
    }
}

/// The signature scheme of an asymmetric signing operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RsaSignature {
    /// PKCS #1 v1.5 with SHA-1.
    Pkcs1Sha1,
    /// PKCS #1 v1.5 with SHA-256.
    Pkcs1Sha256,
    /// PSS with SHA-256.
    PssSha256,
}

/// Trait for things with an RSA modulus, measured in bytes.
pub trait KeySize {
    /// The key (modulus) size in bytes. This is also the size of every
    /// signature and of every ciphertext block the key produces.
    fn size(&self) -> usize;

    /// The number of plain text bytes that fit into one encrypted block
    /// under the given padding.
    fn plain_text_block_size(&self, padding: RsaPadding) -> usize {
        self.size() - padding.overhead()
    }

    /// The size of the cipher text `plain_text_size` bytes encrypt to.
    fn calculate_cipher_text_size(&self, plain_text_size: usize, padding: RsaPadding) -> usize {
        let block_size = self.plain_text_block_size(padding);
        plain_text_size.div_ceil(block_size) * self.size()
    }
}

/// A private RSA key, used to decrypt inbound OPN chunks and sign
/// outbound ones.
#[derive(Clone)]
pub struct PrivateKey {
    key: RsaPrivateKey,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material
        write!(f, "PrivateKey({} bytes)", self.size())
    }
}

impl KeySize for PrivateKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl PrivateKey {
    /// Generate a fresh key, mostly useful for tests.
    pub fn new_rsa(bit_size: usize) -> Result<PrivateKey, Error> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), bit_size)
            .map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(PrivateKey { key })
    }

    /// Load a key from PKCS #8 PEM.
    pub fn from_pem(pem: &str) -> Result<PrivateKey, Error> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        Ok(PrivateKey { key })
    }

    /// Load a key from PKCS #8 DER bytes.
    pub fn from_der(der: &[u8]) -> Result<PrivateKey, Error> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        Ok(PrivateKey { key })
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.to_public_key(),
        }
    }

    /// Sign `data`, writing `self.size()` bytes into `signature`.
    pub fn sign(
        &self,
        scheme: RsaSignature,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, Error> {
        let sig = match scheme {
            RsaSignature::Pkcs1Sha1 => {
                let digest = Sha1::digest(data);
                self.key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            }
            RsaSignature::Pkcs1Sha256 => {
                let digest = Sha256::digest(data);
                self.key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            }
            RsaSignature::PssSha256 => {
                let digest = Sha256::digest(data);
                self.key
                    .sign_with_rng(&mut rand::thread_rng(), Pss::new::<Sha256>(), &digest)
            }
        }
        .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
        if signature.len() != sig.len() {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Signature buffer is {} bytes, key produces {}",
                    signature.len(),
                    sig.len()
                ),
            ));
        }
        signature.copy_from_slice(&sig);
        Ok(sig.len())
    }

    /// Decrypt `src` into `dst` block by block, returning the plain text
    /// size. The plain text is shorter than the cipher text, padding is
    /// stripped per block.
    pub fn decrypt(
        &self,
        padding: RsaPadding,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let block_size = self.size();
        if src.len() % block_size != 0 {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Cipher text length {} is not a whole number of {} byte blocks",
                    src.len(),
                    block_size
                ),
            ));
        }
        let mut written = 0;
        for block in src.chunks(block_size) {
            let plain = match padding {
                RsaPadding::Pkcs1 => self.key.decrypt(Pkcs1v15Encrypt, block),
                RsaPadding::OaepSha1 => self.key.decrypt(Oaep::new::<Sha1>(), block),
                RsaPadding::OaepSha256 => self.key.decrypt(Oaep::new::<Sha256>(), block),
            }
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
            dst[written..written + plain.len()].copy_from_slice(&plain);
            written += plain.len();
        }
        Ok(written)
    }
}

/// A public RSA key, extracted from a certificate, used to encrypt
/// outbound OPN chunks and verify inbound ones.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl KeySize for PublicKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl PublicKey {
    /// Load a public key from SubjectPublicKeyInfo DER bytes.
    pub fn from_der(der: &[u8]) -> Result<PublicKey, Error> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
        Ok(PublicKey { key })
    }

    /// Verify a signature over `data`.
    pub fn verify(
        &self,
        scheme: RsaSignature,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let result = match scheme {
            RsaSignature::Pkcs1Sha1 => {
                let digest = Sha1::digest(data);
                self.key
                    .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
            }
            RsaSignature::Pkcs1Sha256 => {
                let digest = Sha256::digest(data);
                self.key
                    .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            }
            RsaSignature::PssSha256 => {
                let digest = Sha256::digest(data);
                self.key.verify(Pss::new::<Sha256>(), &digest, signature)
            }
        };
        result.map_err(|_| {
            Error::new(
                StatusCode::BadSecurityChecksFailed,
                "Asymmetric signature verification failed",
            )
        })
    }

    /// Encrypt `src` into `dst` block by block, returning the cipher text
    /// size. Each plain text block grows to the key size.
    pub fn encrypt(
        &self,
        padding: RsaPadding,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let plain_block = self.plain_text_block_size(padding);
        let cipher_block = self.size();
        let mut rng = rand::thread_rng();
        let mut written = 0;
        for block in src.chunks(plain_block) {
            let cipher = match padding {
                RsaPadding::Pkcs1 => self.key.encrypt(&mut rng, Pkcs1v15Encrypt, block),
                RsaPadding::OaepSha1 => self.key.encrypt(&mut rng, Oaep::new::<Sha1>(), block),
                RsaPadding::OaepSha256 => {
                    self.key.encrypt(&mut rng, Oaep::new::<Sha256>(), block)
                }
            }
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
            if written + cipher.len() > dst.len() {
                return Err(Error::new(
                    StatusCode::BadEncodingLimitsExceeded,
                    "Destination buffer too small for cipher text",
                ));
            }
            dst[written..written + cipher.len()].copy_from_slice(&cipher);
            written += cipher.len();
        }
        debug_assert_eq!(written % cipher_block, 0);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PrivateKey {
        PrivateKey::new_rsa(2048).unwrap()
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = test_key();
        let public = key.public_key();
        let mut signature = vec![0u8; key.size()];
        key.sign(RsaSignature::Pkcs1Sha256, b"message", &mut signature)
            .unwrap();
        public
            .verify(RsaSignature::Pkcs1Sha256, b"message", &signature)
            .unwrap();
        assert!(public
            .verify(RsaSignature::Pkcs1Sha256, b"other", &signature)
            .is_err());
    }

    #[test]
    fn encrypt_decrypt_multi_block() {
        let key = test_key();
        let public = key.public_key();
        // Larger than one plain text block, forces chunking
        let src = vec![3u8; 400];
        let cipher_size = public.calculate_cipher_text_size(src.len(), RsaPadding::OaepSha1);
        let mut cipher = vec![0u8; cipher_size];
        let n = public
            .encrypt(RsaPadding::OaepSha1, &src, &mut cipher)
            .unwrap();
        assert_eq!(n, cipher_size);

        let mut plain = vec![0u8; n];
        let m = key.decrypt(RsaPadding::OaepSha1, &cipher[..n], &mut plain).unwrap();
        assert_eq!(&plain[..m], &src[..]);
    }
}
