// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Well known numeric node ids in namespace zero. Only the ids this stack
//! actually dispatches on are listed.

macro_rules! numeric_id_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[allow(missing_docs)]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<u32> for $name {
            type Error = ();

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

numeric_id_enum! {
    /// Object ids, including the default-binary encoding ids of the
    /// messages this stack can frame.
    ObjectId {
        ServiceFault_Encoding_DefaultBinary = 397,
        OpenSecureChannelRequest_Encoding_DefaultBinary = 446,
        OpenSecureChannelResponse_Encoding_DefaultBinary = 449,
        CloseSecureChannelRequest_Encoding_DefaultBinary = 452,
        CloseSecureChannelResponse_Encoding_DefaultBinary = 455,
        ReadRequest_Encoding_DefaultBinary = 631,
        ReadResponse_Encoding_DefaultBinary = 634,
    }
}

numeric_id_enum! {
    /// Data type ids.
    DataTypeId {
        ServiceFault = 395,
        OpenSecureChannelRequest = 444,
        OpenSecureChannelResponse = 447,
        CloseSecureChannelRequest = 450,
        CloseSecureChannelResponse = 453,
        ReadRequest = 629,
        ReadResponse = 632,
        ChannelSecurityToken = 344,
        StructureDefinition = 99,
        StructureField = 101,
    }
}
