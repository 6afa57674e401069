// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! Security policies for the secure channel.
//!
//! A [`SecurityPolicy`] names an algorithm suite. The secure channel never
//! touches an algorithm directly, it calls through the policy so the suite
//! can be swapped without the channel noticing. The `None` policy turns
//! every primitive into a no-op, which lets every channel code path run
//! without real cryptography.

pub mod aeskey;
pub mod hash;
pub mod pkey;
pub mod random;
pub mod thumbprint;
pub mod x509;

mod security_policy;

pub use aeskey::AesKey;
pub use pkey::{KeySize, PrivateKey, PublicKey, RsaPadding};
pub use security_policy::SecurityPolicy;
pub use thumbprint::Thumbprint;
pub use x509::X509;

/// The kind of key material derived for one direction of a channel:
/// signing key, encryption key, initialization vector.
pub type SecureChannelKeys = (Vec<u8>, AesKey, Vec<u8>);
