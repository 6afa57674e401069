// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A 16 byte globally unique identifier.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use uuid::Uuid;

use crate::encoding::{
    read_u16, read_u32, write_u16, write_u32, BinaryDecodable, BinaryEncodable, EncodingResult,
    Error, UaNullable,
};

/// A Guid is a 16 byte identifier. On the wire the first three groups are
/// little-endian, the remaining 8 bytes verbatim.
#[derive(Eq, PartialEq, Clone, Hash, Default)]
pub struct Guid {
    uuid: Uuid,
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl UaNullable for Guid {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl BinaryEncodable for Guid {
    fn byte_len(&self, _ctx: &crate::Context<'_>) -> usize {
        16
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        _ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        let (data1, data2, data3, data4) = self.uuid.as_fields();
        write_u32(stream, data1)?;
        write_u16(stream, data2)?;
        write_u16(stream, data3)?;
        stream.write_all(data4).map_err(Error::encoding)
    }
}

impl BinaryDecodable for Guid {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        _ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        let data1 = read_u32(stream)?;
        let data2 = read_u16(stream)?;
        let data3 = read_u16(stream)?;
        let mut data4 = [0u8; 8];
        stream.read_exact(&mut data4).map_err(Error::decoding)?;
        Ok(Guid {
            uuid: Uuid::from_fields(data1, data2, data3, &data4),
        })
    }
}

impl FromStr for Guid {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(|uuid| Guid { uuid }).map_err(|_| ())
    }
}

impl From<Uuid> for Guid {
    fn from(uuid: Uuid) -> Self {
        Guid { uuid }
    }
}

impl Guid {
    /// The null Guid, all zeroes.
    pub fn null() -> Guid {
        Guid { uuid: Uuid::nil() }
    }

    /// True for the all-zero Guid.
    pub fn is_null(&self) -> bool {
        self.uuid.is_nil()
    }

    /// Create a new random Guid.
    pub fn new() -> Guid {
        Guid {
            uuid: Uuid::new_v4(),
        }
    }

    /// The raw bytes of the Guid.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.uuid.as_bytes()
    }
}
