// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The secure channel: token and key state plus the code that applies and
//! removes security on chunks.

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    ops::{Deref, Range},
    sync::Arc,
    time::Instant,
};

use bytes::Buf;
use chrono::Duration;
use log::{error, trace};
use parking_lot::RwLock;

use uatp_crypto::{
    random, AesKey, KeySize, PrivateKey, PublicKey, SecureChannelKeys, SecurityPolicy, X509,
};
use uatp_types::{
    write_bytes, write_u32, write_u8, ByteString, ChannelSecurityToken, ContextOwned, DateTime,
    DecodingOptions, Error, MessageSecurityMode, NamespaceMap, SimpleBinaryDecodable, StatusCode,
};

use super::{
    message_chunk::{MessageChunk, MessageChunkHeader, MessageChunkType, MESSAGE_SIZE_OFFSET},
    security_header::{AsymmetricSecurityHeader, SecurityHeader, SymmetricSecurityHeader},
};

/// Which side of the channel this instance is.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Role {
    /// Not yet determined.
    Unknown,
    /// The connecting side.
    Client,
    /// The accepting side.
    Server,
}

// Inbound keys for one token. Kept per token id so messages under the
// previous token still verify during renewal overlap.
#[derive(Debug)]
struct RemoteKeys {
    keys: SecureChannelKeys,
    expires_at: DateTime,
}

/// All security state of one channel: negotiated policy and mode, the
/// active token, derived key material for both directions, nonces and
/// certificates. One instance per connection, never shared between
/// channels.
#[derive(Debug)]
pub struct SecureChannel {
    role: Role,
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    /// Channel id, assigned by the server on the first OPN.
    secure_channel_id: u32,
    token_id: u32,
    token_created_at: DateTime,
    /// Token lifetime in milliseconds.
    token_lifetime: u32,
    /// Our certificate, if any.
    cert: Option<X509>,
    /// Our private key, if any.
    private_key: Option<PrivateKey>,
    /// The peer's certificate.
    remote_cert: Option<X509>,
    local_nonce: Vec<u8>,
    remote_nonce: Vec<u8>,
    /// Inbound keys by token id. More than one entry only during renewal
    /// overlap.
    remote_keys: HashMap<u32, RemoteKeys>,
    /// Outbound keys, always for the newest token.
    local_keys: Option<SecureChannelKeys>,
    encoding_context: Arc<RwLock<ContextOwned>>,
}

impl SecureChannel {
    /// A channel with no certificate or key, for tests.
    pub fn new_no_certificate_store() -> SecureChannel {
        SecureChannel::new(Role::Unknown, None, None, Default::default())
    }

    /// Create a channel for the given role with the application identity
    /// loaded externally. The certificate and key stay opaque until a
    /// secured policy needs them.
    pub fn new(
        role: Role,
        cert: Option<X509>,
        private_key: Option<PrivateKey>,
        encoding_context: Arc<RwLock<ContextOwned>>,
    ) -> SecureChannel {
        SecureChannel {
            role,
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            secure_channel_id: 0,
            token_id: 0,
            token_created_at: DateTime::now(),
            token_lifetime: 0,
            cert,
            private_key,
            remote_cert: None,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            remote_keys: HashMap::new(),
            local_keys: None,
            encoding_context,
        }
    }

    /// True when this is the client end.
    pub fn is_client_role(&self) -> bool {
        self.role == Role::Client
    }

    /// Set our certificate.
    pub fn set_cert(&mut self, cert: Option<X509>) {
        self.cert = cert;
    }

    /// Our certificate.
    pub fn cert(&self) -> Option<X509> {
        self.cert.clone()
    }

    /// Set our private key.
    pub fn set_private_key(&mut self, private_key: Option<PrivateKey>) {
        self.private_key = private_key;
    }

    /// Set the peer certificate.
    pub fn set_remote_cert(&mut self, remote_cert: Option<X509>) {
        self.remote_cert = remote_cert;
    }

    /// The peer certificate.
    pub fn remote_cert(&self) -> Option<X509> {
        self.remote_cert.clone()
    }

    /// Set the peer certificate from wire bytes. A null byte string clears
    /// it.
    pub fn set_remote_cert_from_byte_string(
        &mut self,
        remote_cert: &ByteString,
    ) -> Result<(), Error> {
        self.remote_cert = if remote_cert.is_null() {
            None
        } else {
            Some(X509::from_byte_string(remote_cert)?)
        };
        Ok(())
    }

    /// The peer certificate as wire bytes.
    pub fn remote_cert_as_byte_string(&self) -> ByteString {
        self.remote_cert
            .as_ref()
            .map(|c| c.as_byte_string())
            .unwrap_or_else(ByteString::null)
    }

    /// The channel security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    /// Set the channel security mode.
    pub fn set_security_mode(&mut self, security_mode: MessageSecurityMode) {
        self.security_mode = security_mode;
    }

    /// The channel security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// Set the channel security policy.
    pub fn set_security_policy(&mut self, security_policy: SecurityPolicy) {
        self.security_policy = security_policy;
    }

    /// Clear the token, returning the channel to its pre-OPN state.
    pub fn clear_security_token(&mut self) {
        self.secure_channel_id = 0;
        self.token_id = 0;
        self.token_created_at = DateTime::now();
        self.token_lifetime = 0;
    }

    /// Install a token from an OPN response.
    pub fn set_security_token(&mut self, token: ChannelSecurityToken) {
        self.secure_channel_id = token.channel_id;
        self.token_id = token.token_id;
        self.token_created_at = token.created_at;
        self.token_lifetime = token.revised_lifetime;
    }

    /// Set the channel id. The server chooses it.
    pub fn set_secure_channel_id(&mut self, secure_channel_id: u32) {
        self.secure_channel_id = secure_channel_id;
    }

    /// The channel id.
    pub fn secure_channel_id(&self) -> u32 {
        self.secure_channel_id
    }

    /// When the active token was created.
    pub fn token_created_at(&self) -> DateTime {
        self.token_created_at
    }

    /// Lifetime in milliseconds of the active token.
    pub fn token_lifetime(&self) -> u32 {
        self.token_lifetime
    }

    /// Set the lifetime of the active token.
    pub fn set_token_lifetime(&mut self, token_lifetime: u32) {
        self.token_lifetime = token_lifetime;
    }

    /// Set the id of the active token.
    pub fn set_token_id(&mut self, token_id: u32) {
        self.token_id = token_id;
    }

    /// The id of the active token.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    /// A borrow of the encoding context.
    pub fn context(&self) -> impl Deref<Target = ContextOwned> + '_ {
        self.encoding_context.read()
    }

    /// The shared encoding context.
    pub fn context_arc(&self) -> Arc<RwLock<ContextOwned>> {
        self.encoding_context.clone()
    }

    /// Replace the namespace map of the encoding context.
    pub fn set_namespaces(&self, namespaces: NamespaceMap) {
        *self.encoding_context.write().namespaces_mut() = namespaces;
    }

    /// Replace the decoding options, typically after limit negotiation.
    pub fn set_decoding_options(&mut self, decoding_options: DecodingOptions) {
        *self.encoding_context.write().options_mut() = decoding_options;
    }

    /// The current decoding options.
    pub fn decoding_options(&self) -> DecodingOptions {
        self.context().options().clone()
    }

    /// True once 75% of the token lifetime has elapsed, the point at which
    /// the holder renews.
    pub fn should_renew_security_token(&self) -> bool {
        if self.token_id() == 0 {
            false
        } else {
            let renew_after = Duration::milliseconds((self.token_lifetime as i64) * 3 / 4);
            DateTime::now() - self.token_created_at > renew_after
        }
    }

    /// The instant at which the token, renewal grace included, is dead.
    /// Servers close the channel when this passes without a renewal.
    pub fn token_renewal_deadline(&self) -> Instant {
        let deadline =
            self.token_created_at + Duration::milliseconds((self.token_lifetime as i64) * 5 / 4);
        let until_expiry = (deadline - DateTime::now()).num_milliseconds();
        if until_expiry < 0 {
            Instant::now()
        } else {
            Instant::now() + std::time::Duration::from_millis(until_expiry as u64)
        }
    }

    /// The security header for an outbound chunk of the given type.
    pub fn make_security_header(&self, message_type: MessageChunkType) -> SecurityHeader {
        match message_type {
            MessageChunkType::OpenSecureChannel => {
                let header = if self.security_policy == SecurityPolicy::None {
                    AsymmetricSecurityHeader::none()
                } else {
                    let receiver_certificate_thumbprint = self
                        .remote_cert
                        .as_ref()
                        .map(|c| c.thumbprint().as_byte_string())
                        .unwrap_or_else(ByteString::null);
                    AsymmetricSecurityHeader::new(
                        self.security_policy,
                        self.cert.as_ref().expect("OPN under a secured policy requires a certificate"),
                        receiver_certificate_thumbprint,
                    )
                };
                SecurityHeader::Asymmetric(header)
            }
            _ => SecurityHeader::Symmetric(SymmetricSecurityHeader {
                token_id: self.token_id,
            }),
        }
    }

    /// Generate a fresh local nonce of the policy's length.
    pub fn create_random_nonce(&mut self) {
        self.local_nonce
            .resize(self.security_policy.secure_channel_nonce_length(), 0);
        if self.security_policy != SecurityPolicy::None {
            random::bytes(&mut self.local_nonce);
        }
    }

    /// The local nonce.
    pub fn local_nonce(&self) -> &[u8] {
        &self.local_nonce
    }

    /// Set the local nonce.
    pub fn set_local_nonce(&mut self, local_nonce: &[u8]) {
        self.local_nonce = local_nonce.to_vec();
    }

    /// The local nonce as wire bytes.
    pub fn local_nonce_as_byte_string(&self) -> ByteString {
        if self.local_nonce.is_empty() {
            ByteString::null()
        } else {
            ByteString::from(&self.local_nonce)
        }
    }

    /// Set the remote nonce.
    pub fn set_remote_nonce(&mut self, remote_nonce: &[u8]) {
        self.remote_nonce = remote_nonce.to_vec();
    }

    /// The remote nonce.
    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }

    /// Set the remote nonce from wire bytes, validating its length against
    /// the policy.
    pub fn set_remote_nonce_from_byte_string(
        &mut self,
        remote_nonce: &ByteString,
    ) -> Result<(), Error> {
        if let Some(ref nonce) = remote_nonce.value {
            if self.security_policy != SecurityPolicy::None
                && nonce.len() != self.security_policy.secure_channel_nonce_length()
            {
                return Err(Error::new(
                    StatusCode::BadNonceInvalid,
                    format!(
                        "Remote nonce has length {}, expected {}",
                        nonce.len(),
                        self.security_policy.secure_channel_nonce_length()
                    ),
                ));
            }
            self.remote_nonce = nonce.to_vec();
            Ok(())
        } else if self.security_policy != SecurityPolicy::None {
            Err(Error::new(
                StatusCode::BadNonceInvalid,
                "Remote nonce is null",
            ))
        } else {
            Ok(())
        }
    }

    /// Derive the symmetric keys for both directions from the exchanged
    /// nonces and install them for the active token. Called on issue and
    /// on every renew.
    ///
    /// Per Part 6 the keys securing our own messages are derived with the
    /// remote nonce as secret and the local nonce as seed; the peer's keys
    /// use the arguments swapped. The derived block is split into signing
    /// key, encryption key and IV, in that order.
    pub fn derive_keys(&mut self) {
        self.insert_remote_keys(
            self.security_policy
                .make_secure_channel_keys(&self.local_nonce, &self.remote_nonce),
        );
        self.local_keys = Some(
            self.security_policy
                .make_secure_channel_keys(&self.remote_nonce, &self.local_nonce),
        );
        trace!("Derived keys for token {}", self.token_id);
    }

    fn insert_remote_keys(&mut self, keys: SecureChannelKeys) {
        // Drop keys whose overlap window has passed
        self.remote_keys
            .retain(|_, v| DateTime::now() < v.expires_at);

        // The previous token stays valid for up to 25% past its lifetime
        let expires_at = Duration::milliseconds((self.token_lifetime as i64) * 5 / 4);
        self.remote_keys.insert(
            self.token_id,
            RemoteKeys {
                keys,
                expires_at: self.token_created_at + expires_at,
            },
        );
    }

    // A message verified under the newest token ends the overlap window:
    // everything older is discarded at once.
    fn expire_superseded_tokens(&mut self, used_token_id: u32) {
        if used_token_id == self.token_id && self.remote_keys.len() > 1 {
            self.remote_keys.retain(|id, _| *id == used_token_id);
        }
    }

    fn local_keys(&self) -> &SecureChannelKeys {
        self.local_keys.as_ref().expect("keys are derived before use")
    }

    fn signing_key(&self) -> &[u8] {
        &self.local_keys().0
    }

    fn encryption_keys(&self) -> (&AesKey, &[u8]) {
        let keys = self.local_keys();
        (&keys.1, &keys.2)
    }

    fn remote_keys_for(&self, token_id: u32) -> Option<&SecureChannelKeys> {
        self.remote_keys.get(&token_id).map(|k| &k.keys)
    }

    fn verification_key(&self, token_id: u32) -> Option<&[u8]> {
        Some(&self.remote_keys_for(token_id)?.0)
    }

    fn decryption_keys(&self, token_id: u32) -> Option<(&AesKey, &[u8])> {
        let keys = self.remote_keys_for(token_id)?;
        Some((&keys.1, &keys.2))
    }

    /// The signature size in bytes implied by a security header.
    pub fn signature_size(&self, security_header: &SecurityHeader) -> usize {
        match security_header {
            SecurityHeader::Asymmetric(header) => {
                if header.sender_certificate.is_null() {
                    0
                } else {
                    match X509::from_byte_string(&header.sender_certificate)
                        .and_then(|x509| x509.public_key())
                    {
                        Ok(pk) => pk.size(),
                        Err(_) => 0,
                    }
                }
            }
            SecurityHeader::Symmetric(_) => self.security_policy.symmetric_signature_size(),
        }
    }

    // Keys longer than 2048 bits need a two byte padding size field.
    fn minimum_padding(key_length: usize) -> usize {
        if key_length <= 256 {
            1
        } else {
            2
        }
    }

    /// The plain text block size and minimum padding for chunks of the
    /// given type, or (0, 0) when the chunk is not encrypted.
    pub fn get_padding_block_sizes(
        &self,
        security_header: &SecurityHeader,
        signature_size: usize,
        message_type: MessageChunkType,
    ) -> (usize, usize) {
        if self.security_policy == SecurityPolicy::None
            || self.security_mode != MessageSecurityMode::SignAndEncrypt
                && !message_type.is_open_secure_channel()
        {
            return (0, 0);
        }
        match security_header {
            SecurityHeader::Asymmetric(header) => {
                if header.sender_certificate.is_null() {
                    (self.security_policy.plain_block_size(), signature_size)
                } else {
                    let padding = self.security_policy.asymmetric_encryption_padding();
                    let Some(pk) = self
                        .remote_cert
                        .as_ref()
                        .and_then(|c| c.public_key().ok())
                    else {
                        error!("Missing remote certificate while calculating padding");
                        return (self.security_policy.plain_block_size(), signature_size);
                    };
                    (
                        pk.plain_text_block_size(padding),
                        Self::minimum_padding(pk.size()),
                    )
                }
            }
            SecurityHeader::Symmetric(_) => (
                self.security_policy.plain_block_size(),
                Self::minimum_padding(signature_size),
            ),
        }
    }

    /// The number of padding bytes for a chunk body, and the size of the
    /// padding size field itself.
    ///
    /// Padding brings sequence header + body + padding field + signature
    /// up to a whole number of cipher blocks.
    pub fn padding_size(
        &self,
        security_header: &SecurityHeader,
        body_size: usize,
        signature_size: usize,
        message_type: MessageChunkType,
    ) -> (usize, usize) {
        let (plain_text_block_size, minimum_padding) =
            self.get_padding_block_sizes(security_header, signature_size, message_type);
        if plain_text_block_size == 0 {
            return (0, 0);
        }
        let encrypt_size = 8 + body_size + signature_size + minimum_padding;
        let padding_size = if encrypt_size % plain_text_block_size != 0 {
            plain_text_block_size - (encrypt_size % plain_text_block_size)
        } else {
            0
        };
        (minimum_padding + padding_size, minimum_padding)
    }

    // Append padding bytes and space for the signature to an unsecured
    // chunk, rewriting the size in its header.
    fn add_space_for_padding_and_signature(
        &self,
        message_chunk: &MessageChunk,
    ) -> Result<Vec<u8>, Error> {
        let chunk_info = message_chunk.chunk_info(self)?;
        let data = &message_chunk.data[..];
        let security_header = chunk_info.security_header;

        let signature_size = self.signature_size(&security_header);
        let (padding_size, minimum_padding) = self.padding_size(
            &security_header,
            chunk_info.body_length,
            signature_size,
            chunk_info.message_header.message_type,
        );

        let mut stream =
            Cursor::new(Vec::with_capacity(data.len() + padding_size + signature_size));
        stream.write_all(data).map_err(Error::encoding)?;

        if padding_size > 0 {
            // Every padding byte carries the padding size so the receiver
            // can verify it
            if minimum_padding == 1 {
                let padding_byte = ((padding_size - 1) & 0xff) as u8;
                write_bytes(&mut stream, padding_byte, padding_size)?;
            } else {
                let padding_byte = ((padding_size - 2) & 0xff) as u8;
                let extra_padding_byte = ((padding_size - 2) >> 8) as u8;
                write_bytes(&mut stream, padding_byte, padding_size - 1)?;
                write_u8(&mut stream, extra_padding_byte)?;
            }
        }

        // Zeroes where the signature will go
        write_bytes(&mut stream, 0u8, signature_size)?;

        let message_size = data.len() + padding_size + signature_size;
        Self::update_message_size_and_truncate(stream.into_inner(), message_size)
    }

    fn update_message_size(data: &mut [u8], message_size: usize) -> Result<(), Error> {
        let mut stream = Cursor::new(data);
        stream.advance(MESSAGE_SIZE_OFFSET);
        write_u32(&mut stream, message_size as u32)
    }

    /// Rewrite the message size in a chunk's header and truncate the data
    /// to fit.
    pub fn update_message_size_and_truncate(
        mut data: Vec<u8>,
        message_size: usize,
    ) -> Result<Vec<u8>, Error> {
        Self::update_message_size(&mut data[..], message_size)?;
        data.truncate(message_size);
        Ok(data)
    }

    /// Apply security to an outbound chunk, writing the secured bytes into
    /// `dst` and returning their size.
    ///
    /// The chunk layout after this:
    ///
    /// ```text
    /// S - Message header
    /// S - Security header
    /// S - Sequence header - E
    /// S - Body            - E
    /// S - Padding         - E
    ///     Signature       - E
    /// ```
    pub fn apply_security(
        &self,
        message_chunk: &MessageChunk,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        if self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt)
        {
            let encrypted_data_offset =
                message_chunk.encrypted_data_offset(&self.decoding_options())?;

            let mut data = self.add_space_for_padding_and_signature(message_chunk)?;
            crate::debug::log_buffer("Chunk after padding", &data[..]);

            let encrypted_range = encrypted_data_offset..data.len();
            let encrypted_size = if message_chunk.is_open_secure_channel(&self.decoding_options())
            {
                self.asymmetric_sign_and_encrypt(&mut data, encrypted_range, dst)?
            } else {
                let signed_range =
                    0..(data.len() - self.security_policy.symmetric_signature_size());
                self.symmetric_sign_and_encrypt(&mut data, signed_range, encrypted_range, dst)?
            };
            crate::debug::log_buffer("Chunk after encryption", &dst[..encrypted_size]);
            Ok(encrypted_size)
        } else {
            let size = message_chunk.data.len();
            if size > dst.len() {
                return Err(Error::new(
                    StatusCode::BadEncodingLimitsExceeded,
                    format!(
                        "Secured chunk of {} bytes exceeds the {} byte buffer",
                        size,
                        dst.len()
                    ),
                ));
            }
            dst[..size].copy_from_slice(&message_chunk.data[..]);
            Ok(size)
        }
    }

    /// Verify and decrypt an inbound chunk, returning it with security
    /// stripped.
    ///
    /// On success under the newest token, keys of any previous token are
    /// discarded: the overlap window ends the moment the peer demonstrably
    /// switched tokens.
    pub fn verify_and_remove_security(&mut self, src: &[u8]) -> Result<MessageChunk, Error> {
        let decoding_options = self.decoding_options();
        let (message_header, security_header, encrypted_data_offset) = {
            let mut stream = Cursor::new(&src);
            let message_header = MessageChunkHeader::decode(&mut stream, &decoding_options)?;
            let security_header = SecurityHeader::decode_from_stream(
                &mut stream,
                message_header.message_type.is_open_secure_channel(),
                &decoding_options,
            )?;
            (message_header, security_header, stream.position() as usize)
        };

        let message_size = message_header.message_size as usize;
        if message_size != src.len() {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "Chunk header says {} bytes but the buffer holds {}",
                    message_size,
                    src.len()
                ),
            ));
        }

        if message_header.message_type.is_open_secure_channel() {
            let SecurityHeader::Asymmetric(security_header) = security_header else {
                return Err(Error::new(
                    StatusCode::BadUnexpectedError,
                    "OPN chunk without an asymmetric security header",
                ));
            };

            // The policy comes off the wire here, the OPN chunk is the
            // first secured thing we see
            let security_policy_uri = security_header.security_policy_uri.as_ref();
            let security_policy = SecurityPolicy::from_uri(security_policy_uri);
            match security_policy {
                SecurityPolicy::Unknown => {
                    return Err(Error::new(
                        StatusCode::BadSecurityPolicyRejected,
                        format!("Security policy \"{}\" is unknown", security_policy_uri),
                    ));
                }
                SecurityPolicy::None => {
                    return Ok(MessageChunk { data: src.to_vec() });
                }
                _ => {}
            }
            self.security_policy = security_policy;

            // OPN chunks are always signed and encrypted when the policy
            // is secured, even in Sign mode
            if security_header.sender_certificate.is_null() {
                return Err(Error::new(
                    StatusCode::BadCertificateInvalid,
                    "Sender certificate is null",
                ));
            }
            let sender_certificate = X509::from_byte_string(&security_header.sender_certificate)?;
            let verification_key = sender_certificate.public_key()?;

            let encrypted_range = encrypted_data_offset..message_size;
            let mut decrypted_data = vec![0u8; message_size];
            let decrypted_size = self.asymmetric_decrypt_and_verify(
                security_policy,
                &verification_key,
                &security_header.receiver_certificate_thumbprint,
                src,
                encrypted_range,
                &mut decrypted_data,
            )?;

            Ok(MessageChunk {
                data: Self::update_message_size_and_truncate(decrypted_data, decrypted_size)?,
            })
        } else if self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt)
        {
            let SecurityHeader::Symmetric(security_header) = security_header else {
                return Err(Error::new(
                    StatusCode::BadUnexpectedError,
                    "Symmetric chunk with an asymmetric security header",
                ));
            };

            let signature_size = self.security_policy.symmetric_signature_size();
            if message_size < encrypted_data_offset + signature_size {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    "Chunk is too small to carry a signature",
                ));
            }
            let encrypted_range = encrypted_data_offset..message_size;
            let signed_range = 0..(message_size - signature_size);

            let mut decrypted_data = vec![0u8; message_size];
            let decrypted_size = self.symmetric_decrypt_and_verify(
                src,
                signed_range,
                encrypted_range,
                security_header.token_id,
                &mut decrypted_data,
            )?;

            self.expire_superseded_tokens(security_header.token_id);

            Ok(MessageChunk {
                data: Self::update_message_size_and_truncate(decrypted_data, decrypted_size)?,
            })
        } else {
            Ok(MessageChunk { data: src.to_vec() })
        }
    }

    // Sign with our private key, then encrypt with the peer's public key.
    // Used for OPN chunks only.
    fn asymmetric_sign_and_encrypt(
        &self,
        src: &mut [u8],
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let header_size = encrypted_range.start;

        let signing_key = self.private_key.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadConfigurationError,
                "Channel has no private key",
            )
        })?;
        let signing_key_size = signing_key.size();

        let signed_range = 0..(encrypted_range.end - signing_key_size);
        let signature_range = signed_range.end..encrypted_range.end;

        let encryption_key = self
            .remote_cert
            .as_ref()
            .ok_or_else(|| {
                Error::new(
                    StatusCode::BadCertificateInvalid,
                    "Channel has no remote certificate",
                )
            })?
            .public_key()?;

        // Encryption grows the chunk, the header must carry the grown size
        // before it is signed
        let padding = self.security_policy.asymmetric_encryption_padding();
        let plain_text_size = encrypted_range.end - encrypted_range.start;
        let cipher_text_size = encryption_key.calculate_cipher_text_size(plain_text_size, padding);
        Self::update_message_size(src, header_size + cipher_text_size)?;
        dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

        // Sign everything up to the signature
        let (signed, rest) = src.split_at_mut(signed_range.end);
        self.security_policy.asymmetric_sign(
            signing_key,
            signed,
            &mut rest[0..signing_key_size],
        )?;
        debug_assert_eq!(encrypted_range.end, signature_range.end);

        let encrypted_size = self.security_policy.asymmetric_encrypt(
            &encryption_key,
            &src[encrypted_range.clone()],
            &mut dst[encrypted_range.start..],
        )?;
        if encrypted_size != cipher_text_size {
            return Err(Error::new(
                StatusCode::BadUnexpectedError,
                format!(
                    "Encrypted block is {} bytes, calculated cipher text size was {}",
                    encrypted_size, cipher_text_size
                ),
            ));
        }

        Ok(header_size + encrypted_size)
    }

    fn check_padding_bytes(
        padding_bytes: &[u8],
        expected_padding_byte: u8,
        padding_range_start: usize,
    ) -> Result<(), Error> {
        for (i, b) in padding_bytes.iter().enumerate() {
            if *b != expected_padding_byte {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!(
                        "Expected padding byte {}, got {} at index {}",
                        expected_padding_byte,
                        *b,
                        padding_range_start + i
                    ),
                ));
            }
        }
        Ok(())
    }

    // Verify the padding trailer that sits right before `padding_end` and
    // return its range so the caller can strip it.
    fn verify_padding(
        &self,
        src: &[u8],
        key_size: usize,
        padding_end: usize,
    ) -> Result<Range<usize>, Error> {
        let bad_padding = || {
            Error::new(
                StatusCode::BadSecurityChecksFailed,
                "Padding is malformed",
            )
        };
        if padding_end < 2 || padding_end > src.len() {
            return Err(bad_padding());
        }
        let padding_range = if key_size > 256 {
            let padding_byte = src[padding_end - 2];
            let extra_padding_byte = src[padding_end - 1];
            let padding_size = ((extra_padding_byte as usize) << 8) + (padding_byte as usize);
            let start = padding_end
                .checked_sub(padding_size + 2)
                .ok_or_else(bad_padding)?;
            let padding_range = start..padding_end;
            Self::check_padding_bytes(
                &src[padding_range.start..(padding_range.end - 1)],
                padding_byte,
                padding_range.start,
            )?;
            if src[padding_range.end - 1] != extra_padding_byte {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    "Extra padding byte does not match",
                ));
            }
            padding_range
        } else {
            let padding_byte = src[padding_end - 1];
            let padding_size = padding_byte as usize;
            let start = padding_end
                .checked_sub(padding_size + 1)
                .ok_or_else(bad_padding)?;
            let padding_range = start..padding_end;
            Self::check_padding_bytes(
                &src[padding_range.clone()],
                padding_byte,
                padding_range.start,
            )?;
            padding_range
        };
        Ok(padding_range)
    }

    // Decrypt with our private key, verify with the sender's public key.
    // Used for OPN chunks only.
    fn asymmetric_decrypt_and_verify(
        &self,
        security_policy: SecurityPolicy,
        verification_key: &PublicKey,
        receiver_thumbprint: &ByteString,
        src: &[u8],
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        // The receiver thumbprint names which of our certificates the peer
        // encrypted for. With a single application certificate it either
        // matches or the chunk is not for us.
        let our_cert = self.cert.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadConfigurationError,
                "Channel has no certificate",
            )
        })?;
        if our_cert.thumbprint().value() != receiver_thumbprint.as_ref() {
            return Err(Error::new(
                StatusCode::BadNoValidCertificates,
                "Receiver thumbprint does not match our certificate",
            ));
        }

        dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

        let private_key = self.private_key.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadConfigurationError,
                "Channel has no private key",
            )
        })?;
        let mut decrypted_tmp = vec![0u8; encrypted_range.end - encrypted_range.start];
        let decrypted_size = security_policy.asymmetric_decrypt(
            private_key,
            &src[encrypted_range.clone()],
            &mut decrypted_tmp,
        )?;
        dst[encrypted_range.start..(encrypted_range.start + decrypted_size)]
            .copy_from_slice(&decrypted_tmp[..decrypted_size]);

        // Plain text layout: [signed data][signature], the signature is as
        // long as the sender's key
        let signature_size = verification_key.size();
        let signature_start = (encrypted_range.start + decrypted_size)
            .checked_sub(signature_size)
            .ok_or_else(|| {
                Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    "Decrypted block is smaller than the signature",
                )
            })?;
        security_policy.asymmetric_verify_signature(
            verification_key,
            &dst[..signature_start],
            &dst[signature_start..(signature_start + signature_size)],
        )?;

        let padding_range = self.verify_padding(dst, signature_size, signature_start)?;
        Ok(padding_range.start)
    }

    /// Sign and encrypt a symmetric chunk from `src` into `dst`, returning
    /// the secured size.
    pub fn symmetric_sign_and_encrypt(
        &self,
        src: &mut [u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        match self.security_mode {
            MessageSecurityMode::None => {
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            MessageSecurityMode::Sign => {
                let size = self.symmetric_sign_in_place(src, signed_range)?;
                dst[..size].copy_from_slice(&src[..size]);
                Ok(size)
            }
            MessageSecurityMode::SignAndEncrypt => {
                self.symmetric_sign_in_place(src, signed_range)?;

                let (key, iv) = self.encryption_keys();
                let encrypted_size = self.security_policy.symmetric_encrypt(
                    key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut dst[encrypted_range.start..],
                )?;
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);
                Ok(encrypted_range.start + encrypted_size)
            }
            MessageSecurityMode::Invalid => Err(Error::new(
                StatusCode::BadSecurityModeRejected,
                "Message security mode is invalid",
            )),
        }
    }

    fn symmetric_sign_in_place(
        &self,
        buf: &mut [u8],
        signed_range: Range<usize>,
    ) -> Result<usize, Error> {
        let signature_size = self.security_policy.symmetric_signature_size();
        let signing_key = self.signing_key();
        let (signed, rest) = buf.split_at_mut(signed_range.end);
        self.security_policy
            .symmetric_sign(signing_key, signed, &mut rest[0..signature_size])?;
        Ok(signed_range.end + signature_size)
    }

    /// Decrypt and verify a symmetric chunk from `src` into `dst`,
    /// returning the size of the plain data with padding and signature
    /// stripped.
    ///
    /// The token id must belong to the current token or to a previous one
    /// still inside its overlap window.
    pub fn symmetric_decrypt_and_verify(
        &self,
        src: &[u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        token_id: u32,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        match self.security_mode {
            MessageSecurityMode::None => {
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            MessageSecurityMode::Sign => {
                dst[..src.len()].copy_from_slice(src);
                let signature_range = signed_range.end..src.len();
                let verification_key = self.verification_key(token_id).ok_or_else(|| {
                    Error::new(
                        StatusCode::BadSecureChannelTokenUnknown,
                        format!("No verification key for token {}", token_id),
                    )
                })?;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range.clone()],
                    &dst[signature_range],
                )?;
                Ok(signed_range.end)
            }
            MessageSecurityMode::SignAndEncrypt => {
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

                let ciphertext_size = encrypted_range.end - encrypted_range.start;
                // The temporary gets one extra block, the cipher needs the
                // slack
                let mut decrypted_tmp = vec![0u8; ciphertext_size + 16];
                let (key, iv) = self.decryption_keys(token_id).ok_or_else(|| {
                    Error::new(
                        StatusCode::BadSecureChannelTokenUnknown,
                        format!("No decryption keys for token {}", token_id),
                    )
                })?;
                let decrypted_size = self.security_policy.symmetric_decrypt(
                    key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut decrypted_tmp,
                )?;

                let encrypted_range =
                    encrypted_range.start..(encrypted_range.start + decrypted_size);
                dst[encrypted_range.clone()].copy_from_slice(&decrypted_tmp[..decrypted_size]);

                let signature_range = (encrypted_range.end
                    - self.security_policy.symmetric_signature_size())
                    ..encrypted_range.end;
                let verification_key = self.verification_key(token_id).ok_or_else(|| {
                    Error::new(
                        StatusCode::BadSecureChannelTokenUnknown,
                        format!("No verification key for token {}", token_id),
                    )
                })?;
                let signature_start = signature_range.start;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range],
                    &dst[signature_range],
                )?;

                let key_size = key.key_length();
                let padding_range = self.verify_padding(dst, key_size, signature_start)?;
                Ok(padding_range.start)
            }
            MessageSecurityMode::Invalid => Err(Error::new(
                StatusCode::BadSecurityModeRejected,
                "Message security mode is invalid",
            )),
        }
    }
}
