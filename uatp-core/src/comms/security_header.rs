// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The security header carried in every chunk. OPN chunks use the
//! asymmetric form, MSG and CLO chunks the symmetric form.

use std::io::{Read, Write};

use uatp_crypto::{SecurityPolicy, Thumbprint, X509};
use uatp_types::{
    constants,
    encoding::{DecodingOptions, EncodingResult, SimpleBinaryDecodable, SimpleBinaryEncodable},
    status_code::StatusCode,
    ByteString, Error, UAString,
};

/// The security header of a chunk, in one of its two forms.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityHeader {
    /// Asymmetric form, on OPN chunks.
    Asymmetric(AsymmetricSecurityHeader),
    /// Symmetric form, on MSG and CLO chunks.
    Symmetric(SymmetricSecurityHeader),
}

impl SimpleBinaryEncodable for SecurityHeader {
    fn byte_len(&self) -> usize {
        match self {
            SecurityHeader::Asymmetric(value) => value.byte_len(),
            SecurityHeader::Symmetric(value) => value.byte_len(),
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self {
            SecurityHeader::Asymmetric(value) => value.encode(stream),
            SecurityHeader::Symmetric(value) => value.encode(stream),
        }
    }
}

impl SecurityHeader {
    /// Decode the right form of header given the chunk's message type,
    /// which is why this is not a plain `SimpleBinaryDecodable`.
    pub fn decode_from_stream<S: Read + ?Sized>(
        stream: &mut S,
        is_open_secure_channel: bool,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        if is_open_secure_channel {
            let security_header = AsymmetricSecurityHeader::decode(stream, decoding_options)?;
            let security_policy = if security_header.security_policy_uri.is_null() {
                SecurityPolicy::None
            } else {
                SecurityPolicy::from_uri(security_header.security_policy_uri.as_ref())
            };
            if security_policy == SecurityPolicy::Unknown {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    format!(
                        "Security policy of chunk is unknown, policy = {:?}",
                        security_header.security_policy_uri
                    ),
                ));
            }
            Ok(SecurityHeader::Asymmetric(security_header))
        } else {
            Ok(SecurityHeader::Symmetric(SymmetricSecurityHeader::decode(
                stream,
                decoding_options,
            )?))
        }
    }
}

/// Symmetric security header: just the token id the chunk is secured
/// under.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricSecurityHeader {
    /// Id of the security token the chunk's keys were derived for.
    pub token_id: u32,
}

impl SimpleBinaryEncodable for SymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.token_id.encode(stream)
    }
}

impl SimpleBinaryDecodable for SymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SymmetricSecurityHeader {
            token_id: u32::decode(stream, decoding_options)?,
        })
    }
}

/// Asymmetric security header: the policy URI, the sender's certificate,
/// and the thumbprint of the receiver certificate used for encryption.
#[derive(Debug, Clone, PartialEq)]
pub struct AsymmetricSecurityHeader {
    /// URI of the security policy securing the OPN exchange.
    pub security_policy_uri: UAString,
    /// DER certificate of the sender, null under the None policy.
    pub sender_certificate: ByteString,
    /// Thumbprint naming the receiver certificate, null under None.
    pub receiver_certificate_thumbprint: ByteString,
}

impl SimpleBinaryEncodable for AsymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        self.security_policy_uri.byte_len()
            + self.sender_certificate.byte_len()
            + self.receiver_certificate_thumbprint.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.security_policy_uri.encode(stream)?;
        self.sender_certificate.encode(stream)?;
        self.receiver_certificate_thumbprint.encode(stream)
    }
}

impl SimpleBinaryDecodable for AsymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let security_policy_uri = UAString::decode(stream, decoding_options)?;
        let sender_certificate = ByteString::decode(stream, decoding_options)?;
        let receiver_certificate_thumbprint = ByteString::decode(stream, decoding_options)?;

        if sender_certificate
            .value
            .as_ref()
            .is_some_and(|v| v.len() >= constants::MAX_CERTIFICATE_LENGTH)
        {
            return Err(Error::new(
                StatusCode::BadEncodingLimitsExceeded,
                format!(
                    "Sender certificate is {} bytes, larger than the maximum {}",
                    sender_certificate.value.as_ref().map(|v| v.len()).unwrap_or_default(),
                    constants::MAX_CERTIFICATE_LENGTH
                ),
            ));
        }
        let thumbprint_len = receiver_certificate_thumbprint
            .value
            .as_ref()
            .map(|v| v.len())
            .unwrap_or_default();
        if thumbprint_len > 0 && thumbprint_len != Thumbprint::THUMBPRINT_SIZE {
            return Err(Error::decoding(format!(
                "Receiver certificate thumbprint is {} bytes, expected {}",
                thumbprint_len,
                Thumbprint::THUMBPRINT_SIZE
            )));
        }
        Ok(AsymmetricSecurityHeader {
            security_policy_uri,
            sender_certificate,
            receiver_certificate_thumbprint,
        })
    }
}

impl AsymmetricSecurityHeader {
    /// The asymmetric header of the None policy: no certificate, no
    /// thumbprint.
    pub fn none() -> AsymmetricSecurityHeader {
        AsymmetricSecurityHeader {
            security_policy_uri: UAString::from(SecurityPolicy::None.to_uri()),
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::null(),
        }
    }

    /// An asymmetric header for a secured policy.
    pub fn new(
        security_policy: SecurityPolicy,
        sender_certificate: &X509,
        receiver_certificate_thumbprint: ByteString,
    ) -> AsymmetricSecurityHeader {
        AsymmetricSecurityHeader {
            security_policy_uri: UAString::from(security_policy.to_uri()),
            sender_certificate: sender_certificate.as_byte_string(),
            receiver_certificate_thumbprint,
        }
    }
}

/// The sequence header: the chunk's sequence number and the request it
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceHeader {
    /// Per channel, per direction monotonic chunk counter.
    pub sequence_number: u32,
    /// The request this chunk is a part of.
    pub request_id: u32,
}

impl SimpleBinaryEncodable for SequenceHeader {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.sequence_number.encode(stream)?;
        self.request_id.encode(stream)
    }
}

impl SimpleBinaryDecodable for SequenceHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SequenceHeader {
            sequence_number: u32::decode(stream, decoding_options)?,
            request_id: u32::decode(stream, decoding_options)?,
        })
    }
}
