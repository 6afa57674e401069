// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! OPC UA status codes. Only the codes used by this stack are named, any
//! other value read off the wire is preserved as-is.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::encoding::{
    read_u32, write_u32, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};

/// A 32 bit status code. The top byte carries the severity, the rest of the
/// upper half the sub code, the lower half flags and info bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(u32);

macro_rules! status_codes {
    ($($name:ident = $value:literal),+ $(,)?) => {
        #[allow(missing_docs)]
        impl StatusCode {
            $(pub const $name: StatusCode = StatusCode($value);)+

            /// The symbolic name of this status code, or `"Unknown"` for a
            /// value this stack has no name for.
            pub fn name(&self) -> &'static str {
                match self.0 {
                    $($value => stringify!($name),)+
                    _ => "Unknown",
                }
            }
        }
    };
}

status_codes! {
    Good = 0x0000_0000,
    Uncertain = 0x4000_0000,
    Bad = 0x8000_0000,
    BadUnexpectedError = 0x8001_0000,
    BadInternalError = 0x8002_0000,
    BadOutOfMemory = 0x8003_0000,
    BadResourceUnavailable = 0x8004_0000,
    BadCommunicationError = 0x8005_0000,
    BadEncodingError = 0x8006_0000,
    BadDecodingError = 0x8007_0000,
    BadEncodingLimitsExceeded = 0x8008_0000,
    BadRequestTooLarge = 0x80B8_0000,
    BadResponseTooLarge = 0x80B9_0000,
    BadUnknownResponse = 0x8009_0000,
    BadTimeout = 0x800A_0000,
    BadServiceUnsupported = 0x800B_0000,
    BadShutdown = 0x800C_0000,
    BadServerNotConnected = 0x800D_0000,
    BadNothingToDo = 0x800F_0000,
    BadTooManyOperations = 0x8010_0000,
    BadCertificateInvalid = 0x8012_0000,
    BadSecurityChecksFailed = 0x8013_0000,
    BadCertificateTimeInvalid = 0x8014_0000,
    BadCertificateUntrusted = 0x801A_0000,
    BadCertificateRevoked = 0x801B_0000,
    BadUserAccessDenied = 0x801F_0000,
    BadIdentityTokenInvalid = 0x8020_0000,
    BadIdentityTokenRejected = 0x8021_0000,
    BadSecureChannelIdInvalid = 0x8022_0000,
    BadInvalidTimestamp = 0x8023_0000,
    BadNonceInvalid = 0x8024_0000,
    BadSessionIdInvalid = 0x8025_0000,
    BadSessionClosed = 0x8026_0000,
    BadSessionNotActivated = 0x8027_0000,
    BadNoCommunication = 0x8031_0000,
    BadNodeIdInvalid = 0x8033_0000,
    BadNodeIdUnknown = 0x8034_0000,
    BadAttributeIdInvalid = 0x8035_0000,
    BadNotReadable = 0x803A_0000,
    BadNotWritable = 0x803B_0000,
    BadInvalidArgument = 0x803E_0000,
    BadDataEncodingInvalid = 0x8038_0000,
    BadDataEncodingUnsupported = 0x8039_0000,
    BadNoValidCertificates = 0x8059_0000,
    BadInvalidState = 0x80AF_0000,
    BadTcpServerTooBusy = 0x807D_0000,
    BadTcpMessageTypeInvalid = 0x807E_0000,
    BadTcpSecureChannelUnknown = 0x807F_0000,
    BadTcpMessageTooLarge = 0x8080_0000,
    BadTcpNotEnoughResources = 0x8081_0000,
    BadTcpInternalError = 0x8082_0000,
    BadTcpEndpointUrlInvalid = 0x8083_0000,
    BadRequestInterrupted = 0x8084_0000,
    BadRequestTimeout = 0x8085_0000,
    BadSecureChannelClosed = 0x8086_0000,
    BadSecureChannelTokenUnknown = 0x8087_0000,
    BadSequenceNumberInvalid = 0x8088_0000,
    BadProtocolVersionUnsupported = 0x80BE_0000,
    BadConnectionClosed = 0x80AE_0000,
    BadConnectionRejected = 0x80AC_0000,
    BadDisconnect = 0x80AD_0000,
    BadNotConnected = 0x808A_0000,
    BadMessageNotAvailable = 0x805F_0000,
    BadSecurityModeRejected = 0x8054_0000,
    BadSecurityPolicyRejected = 0x8055_0000,
    BadSequenceNumberUnknown = 0x807A_0000,
    BadMaxConnectionsReached = 0x80B7_0000,
    BadConfigurationError = 0x8089_0000,
}

impl StatusCode {
    /// Construct a status code from a raw u32 value.
    pub fn from_u32(value: u32) -> Self {
        StatusCode(value)
    }

    /// The raw u32 value of this status code.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True if the severity is good.
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// True if the severity is uncertain.
    pub fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// True if the severity is bad.
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// The code with all info bits stripped, leaving severity and sub code.
    pub fn sub_code(&self) -> StatusCode {
        StatusCode(self.0 & 0xFFFF_0000)
    }
}

impl UaNullable for StatusCode {
    fn is_ua_null(&self) -> bool {
        *self == StatusCode::Good
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        if name == "Unknown" {
            write!(f, "StatusCode({:#010X})", self.0)
        } else {
            write!(f, "{}", name)
        }
    }
}

impl std::error::Error for StatusCode {}

impl SimpleBinaryEncodable for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u32(stream, self.0)
    }
}

impl SimpleBinaryDecodable for StatusCode {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(StatusCode(read_u32(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn severity() {
        assert!(StatusCode::Good.is_good());
        assert!(!StatusCode::Good.is_bad());
        assert!(StatusCode::Uncertain.is_uncertain());
        assert!(StatusCode::BadDecodingError.is_bad());
    }

    #[test]
    fn unknown_values_round_trip() {
        let code = StatusCode::from_u32(0x8123_4567);
        assert_eq!(code.name(), "Unknown");
        assert_eq!(code.bits(), 0x8123_4567);
        assert_eq!(code.sub_code(), StatusCode::from_u32(0x8123_0000));
    }
}
