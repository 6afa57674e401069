// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Enumerations used by the service messages. Enumerations are encoded as
//! Int32 on the wire.

use std::io::{Read, Write};

use crate::encoding::{
    read_i32, write_i32, BinaryDecodable, BinaryEncodable, EncodingResult, Error, UaNullable,
};

macro_rules! ua_enum {
    ($(#[$doc:meta])* $name:ident { $($(#[$vdoc:meta])* $variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vdoc])* #[allow(missing_docs)] $variant = $value),+
        }

        impl UaNullable for $name {}

        impl BinaryEncodable for $name {
            fn byte_len(&self, _ctx: &crate::Context<'_>) -> usize {
                4
            }

            fn encode<S: Write + ?Sized>(
                &self,
                stream: &mut S,
                _ctx: &crate::Context<'_>,
            ) -> EncodingResult<()> {
                write_i32(stream, *self as i32)
            }
        }

        impl BinaryDecodable for $name {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                _ctx: &crate::Context<'_>,
            ) -> EncodingResult<Self> {
                let value = read_i32(stream)?;
                match value {
                    $($value => Ok(Self::$variant),)+
                    r => Err(Error::decoding(format!(
                        concat!("Invalid ", stringify!($name), " value {}"), r
                    ))),
                }
            }
        }
    };
}

ua_enum! {
    /// How messages on a channel are secured.
    MessageSecurityMode {
        /// No valid mode, seen when an endpoint is misconfigured.
        #[default]
        Invalid = 0,
        /// Messages are neither signed nor encrypted.
        None = 1,
        /// Messages are signed but not encrypted.
        Sign = 2,
        /// Messages are signed and encrypted.
        SignAndEncrypt = 3,
    }
}

ua_enum! {
    /// Whether an OpenSecureChannel call creates a channel or renews the
    /// token of an existing one.
    SecurityTokenRequestType {
        #[default]
        Issue = 0,
        Renew = 1,
    }
}

ua_enum! {
    /// Which timestamps to return with read results.
    TimestampsToReturn {
        #[default]
        Source = 0,
        Server = 1,
        Both = 2,
        Neither = 3,
        Invalid = 4,
    }
}

ua_enum! {
    /// The encoding shape of a structured data type.
    StructureType {
        /// Every field is always present.
        #[default]
        Structure = 0,
        /// Some fields are optional, presence driven by a leading bit mask.
        StructureWithOptionalFields = 1,
        /// Exactly one field is present, selected by a leading switch value.
        Union = 2,
    }
}

impl MessageSecurityMode {
    /// Parse from the string form used in endpoint descriptions.
    pub fn from_str_name(name: &str) -> MessageSecurityMode {
        match name {
            "None" => MessageSecurityMode::None,
            "Sign" => MessageSecurityMode::Sign,
            "SignAndEncrypt" => MessageSecurityMode::SignAndEncrypt,
            _ => MessageSecurityMode::Invalid,
        }
    }
}
