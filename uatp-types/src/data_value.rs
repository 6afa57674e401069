// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A value with associated status and timestamps, as read from or written
//! to an attribute.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    encoding::{
        read_u16, read_u8, write_u16, write_u8, BinaryDecodable, BinaryEncodable, EncodingResult,
        UaNullable,
    },
    status_code::StatusCode,
    variant::Variant,
};

const HAS_VALUE: u8 = 0x1;
const HAS_STATUS: u8 = 0x2;
const HAS_SOURCE_TIMESTAMP: u8 = 0x4;
const HAS_SERVER_TIMESTAMP: u8 = 0x8;
const HAS_SOURCE_PICOSECONDS: u8 = 0x10;
const HAS_SERVER_PICOSECONDS: u8 = 0x20;

/// A value together with the status and timestamps describing it. Every
/// field is optional; the wire form leads with a presence mask byte. An
/// absent status means Good.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value itself.
    pub value: Option<Variant>,
    /// Status of the value. `None` encodes as omitted and means Good.
    pub status: Option<StatusCode>,
    /// When the source produced the value.
    pub source_timestamp: Option<DateTime>,
    /// 10 picosecond resolution addition to the source timestamp.
    pub source_picoseconds: Option<u16>,
    /// When the server obtained the value.
    pub server_timestamp: Option<DateTime>,
    /// 10 picosecond resolution addition to the server timestamp.
    pub server_picoseconds: Option<u16>,
}

impl UaNullable for DataValue {
    fn is_ua_null(&self) -> bool {
        self.encoding_mask() == 0
    }
}

impl BinaryEncodable for DataValue {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size = 1;
        if let Some(ref value) = self.value {
            size += value.byte_len(ctx);
        }
        if let Some(ref status) = self.status {
            size += status.byte_len(ctx);
        }
        if let Some(ref ts) = self.source_timestamp {
            size += ts.byte_len(ctx);
            if self.source_picoseconds.is_some() {
                size += 2;
            }
        }
        if let Some(ref ts) = self.server_timestamp {
            size += ts.byte_len(ctx);
            if self.server_picoseconds.is_some() {
                size += 2;
            }
        }
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        write_u8(stream, self.encoding_mask())?;
        if let Some(ref value) = self.value {
            value.encode(stream, ctx)?;
        }
        if let Some(ref status) = self.status {
            status.encode(stream, ctx)?;
        }
        // Picoseconds are only written when their timestamp is present
        if let Some(ref ts) = self.source_timestamp {
            ts.encode(stream, ctx)?;
            if let Some(ps) = self.source_picoseconds {
                write_u16(stream, ps)?;
            }
        }
        if let Some(ref ts) = self.server_timestamp {
            ts.encode(stream, ctx)?;
            if let Some(ps) = self.server_picoseconds {
                write_u16(stream, ps)?;
            }
        }
        Ok(())
    }
}

impl BinaryDecodable for DataValue {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        let mask = read_u8(stream)?;
        let value = if mask & HAS_VALUE != 0 {
            Some(Variant::decode(stream, ctx)?)
        } else {
            None
        };
        let status = if mask & HAS_STATUS != 0 {
            Some(StatusCode::decode(stream, ctx)?)
        } else {
            None
        };
        let source_timestamp = if mask & HAS_SOURCE_TIMESTAMP != 0 {
            Some(DateTime::decode(stream, ctx)?)
        } else {
            None
        };
        let source_picoseconds = if mask & HAS_SOURCE_PICOSECONDS != 0 {
            Some(read_u16(stream)?)
        } else {
            None
        };
        let server_timestamp = if mask & HAS_SERVER_TIMESTAMP != 0 {
            Some(DateTime::decode(stream, ctx)?)
        } else {
            None
        };
        let server_picoseconds = if mask & HAS_SERVER_PICOSECONDS != 0 {
            Some(read_u16(stream)?)
        } else {
            None
        };
        Ok(DataValue {
            value,
            status,
            source_timestamp,
            source_picoseconds,
            server_timestamp,
            server_picoseconds,
        })
    }
}

impl From<Variant> for DataValue {
    fn from(value: Variant) -> Self {
        DataValue {
            value: Some(value),
            ..Default::default()
        }
    }
}

impl DataValue {
    /// Create a data value carrying `value`, stamped with the current time.
    pub fn new_now(value: impl Into<Variant>) -> DataValue {
        let now = DateTime::now();
        DataValue {
            value: Some(value.into()),
            status: Some(StatusCode::Good),
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// The status of this value, treating an absent status as Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Good)
    }

    fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.value.is_some() {
            mask |= HAS_VALUE;
        }
        if self.status.is_some() {
            mask |= HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= HAS_SOURCE_TIMESTAMP;
            if self.source_picoseconds.is_some() {
                mask |= HAS_SOURCE_PICOSECONDS;
            }
        }
        if self.server_timestamp.is_some() {
            mask |= HAS_SERVER_TIMESTAMP;
            if self.server_picoseconds.is_some() {
                mask |= HAS_SERVER_PICOSECONDS;
            }
        }
        mask
    }
}
