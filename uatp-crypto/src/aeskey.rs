// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Symmetric encryption and decryption.

use aes::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};
use uatp_types::{Error, StatusCode};

use crate::security_policy::SecurityPolicy;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block and IV size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;
const AES128_KEY_SIZE: usize = 16;
const AES256_KEY_SIZE: usize = 32;

type Block128 = GenericArray<u8, <aes::Aes128 as aes::cipher::BlockSizeUser>::BlockSize>;
type Key256 = GenericArray<u8, <aes::Aes256 as aes::cipher::KeySizeUser>::KeySize>;

/// A symmetric key bound to the policy it was derived for, which fixes the
/// AES variant and block size.
#[derive(Debug, Clone)]
pub struct AesKey {
    value: Vec<u8>,
    security_policy: SecurityPolicy,
}

impl AesKey {
    /// Wrap raw key material for the given policy.
    pub fn new(security_policy: SecurityPolicy, value: &[u8]) -> AesKey {
        AesKey {
            value: value.to_vec(),
            security_policy,
        }
    }

    /// The raw key material.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The AES block size for this key's policy, 0 for policies without
    /// symmetric encryption.
    pub fn block_size(&self) -> usize {
        match self.security_policy {
            SecurityPolicy::None | SecurityPolicy::Unknown => 0,
            _ => AES_BLOCK_SIZE,
        }
    }

    /// The IV length for this key's policy.
    pub fn iv_length(&self) -> usize {
        self.block_size()
    }

    /// The key length in bytes for this key's policy.
    pub fn key_length(&self) -> usize {
        match self.security_policy {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => AES128_KEY_SIZE,
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes256Sha256RsaPss => AES256_KEY_SIZE,
            _ => 0,
        }
    }

    fn validate_args(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<(), Error> {
        if dst.len() < src.len() + self.block_size() {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "Destination buffer too small, {} for {} + block",
                    dst.len(),
                    src.len()
                ),
            ))
        } else if iv.len() != self.iv_length() {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!("IV has unexpected size {}", iv.len()),
            ))
        } else if src.len() % self.block_size() != 0 {
            Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "Input length {} is not a whole number of {} byte blocks",
                    src.len(),
                    self.block_size()
                ),
            ))
        } else {
            Ok(())
        }
    }

    /// Encrypt `src` into `dst` with AES-CBC, returning the ciphertext
    /// length. `src` must already be padded to a whole number of blocks.
    pub fn encrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<usize, Error> {
        self.validate_args(src, iv, dst)?;
        let result = match self.security_policy {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => {
                Aes128CbcEnc::new(Block128::from_slice(&self.value), Block128::from_slice(iv))
                    .encrypt_padded_b2b_mut::<NoPadding>(src, dst)
            }
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes256Sha256RsaPss => {
                Aes256CbcEnc::new(Key256::from_slice(&self.value), Block128::from_slice(iv))
                    .encrypt_padded_b2b_mut::<NoPadding>(src, dst)
            }
            _ => {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    "Policy has no symmetric encryption",
                ))
            }
        };
        result.map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }

    /// Decrypt `src` into `dst` with AES-CBC, returning the plaintext
    /// length.
    pub fn decrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<usize, Error> {
        self.validate_args(src, iv, dst)?;
        let result = match self.security_policy {
            SecurityPolicy::Basic128Rsa15 | SecurityPolicy::Aes128Sha256RsaOaep => {
                Aes128CbcDec::new(Block128::from_slice(&self.value), Block128::from_slice(iv))
                    .decrypt_padded_b2b_mut::<NoPadding>(src, dst)
            }
            SecurityPolicy::Basic256
            | SecurityPolicy::Basic256Sha256
            | SecurityPolicy::Aes256Sha256RsaPss => {
                Aes256CbcDec::new(Key256::from_slice(&self.value), Block128::from_slice(iv))
                    .decrypt_padded_b2b_mut::<NoPadding>(src, dst)
            }
            _ => {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    "Policy has no symmetric encryption",
                ))
            }
        };
        result.map_err(|e| Error::new(StatusCode::BadUnexpectedError, e.to_string()))?;
        Ok(src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let mut key_data = [0u8; 32];
        random::bytes(&mut key_data);
        let mut iv = [0u8; 16];
        random::bytes(&mut iv);
        let key = AesKey::new(SecurityPolicy::Basic256Sha256, &key_data);

        let src = [7u8; 64];
        let mut cipher = vec![0u8; src.len() + AES_BLOCK_SIZE];
        let n = key.encrypt(&src, &iv, &mut cipher).unwrap();
        assert_eq!(n, src.len());
        assert_ne!(&cipher[..n], &src[..]);

        let mut plain = vec![0u8; n + AES_BLOCK_SIZE];
        let n2 = key.decrypt(&cipher[..n], &iv, &mut plain).unwrap();
        assert_eq!(&plain[..n2], &src[..]);
    }

    #[test]
    fn unpadded_input_is_rejected() {
        let key = AesKey::new(SecurityPolicy::Basic128Rsa15, &[0u8; 16]);
        let mut dst = vec![0u8; 64];
        assert!(key.encrypt(&[1u8; 17], &[0u8; 16], &mut dst).is_err());
    }
}
