// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A thin X.509 certificate wrapper. The channel treats certificates as
//! opaque DER bytes, this type exists to pull the public key out and to
//! compute thumbprints.

use x509_cert::{
    der::{Decode, Encode},
    Certificate,
};

use uatp_types::{ByteString, Error, StatusCode};

use crate::{pkey::PublicKey, thumbprint::Thumbprint};

/// A parsed certificate together with the DER bytes it came from. The DER
/// bytes are kept verbatim, the wire form and the thumbprint must not
/// depend on a re-encoding round trip.
#[derive(Debug, Clone)]
pub struct X509 {
    der: Vec<u8>,
    certificate: Certificate,
}

impl PartialEq for X509 {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl X509 {
    /// Parse a certificate from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<X509, Error> {
        let certificate = Certificate::from_der(der)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
        Ok(X509 {
            der: der.to_vec(),
            certificate,
        })
    }

    /// Parse a certificate from a byte string off the wire.
    pub fn from_byte_string(data: &ByteString) -> Result<X509, Error> {
        if data.is_null() {
            return Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "Certificate byte string is null",
            ));
        }
        Self::from_der(data.as_ref())
    }

    /// The certificate as a byte string for the wire.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(&self.der)
    }

    /// The DER bytes of the certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The SHA-1 thumbprint of the DER bytes.
    pub fn thumbprint(&self) -> Thumbprint {
        Thumbprint::new(&self.der)
    }

    /// The RSA public key of the certificate subject.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let spki_der = self
            .certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))?;
        PublicKey::from_der(&spki_der)
    }
}
