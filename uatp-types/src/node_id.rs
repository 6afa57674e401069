// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Node identifiers, addressing a node in a server's address space.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use crate::{
    byte_string::ByteString,
    encoding::{
        read_u16, read_u32, read_u8, write_u16, write_u32, write_u8, BinaryDecodable,
        BinaryEncodable, EncodingResult, Error, UaNullable,
    },
    guid::Guid,
    node_ids::{DataTypeId, ObjectId},
    string::UAString,
};

/// The identifier part of a [`NodeId`].
#[derive(Eq, PartialEq, Clone, Debug, Hash)]
pub enum Identifier {
    /// Numeric identifier, `i=123`.
    Numeric(u32),
    /// String identifier, `s=...`.
    String(UAString),
    /// Guid identifier, `g=...`.
    Guid(Guid),
    /// Opaque identifier, `b=...`.
    ByteString(ByteString),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={}", *v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={:?}", v),
            Identifier::ByteString(v) => write!(f, "b={}", v.as_base64()),
        }
    }
}

impl FromStr for Identifier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 2 {
            return Err(());
        }
        let (kind, value) = s.split_at(2);
        match kind {
            "i=" => value.parse::<u32>().map(Identifier::Numeric).map_err(|_| ()),
            "s=" => Ok(Identifier::String(value.into())),
            "g=" => Guid::from_str(value).map(Identifier::Guid).map_err(|_| ()),
            "b=" => ByteString::from_base64(value)
                .map(Identifier::ByteString)
                .ok_or(()),
            _ => Err(()),
        }
    }
}

impl From<u32> for Identifier {
    fn from(v: u32) -> Self {
        Identifier::Numeric(v)
    }
}

impl<'a> From<&'a str> for Identifier {
    fn from(v: &'a str) -> Self {
        Identifier::String(v.into())
    }
}

impl From<UAString> for Identifier {
    fn from(v: UAString) -> Self {
        Identifier::String(v)
    }
}

impl From<Guid> for Identifier {
    fn from(v: Guid) -> Self {
        Identifier::Guid(v)
    }
}

impl From<ByteString> for Identifier {
    fn from(v: ByteString) -> Self {
        Identifier::ByteString(v)
    }
}

#[derive(Debug)]
/// Error returned from working with node IDs.
pub struct NodeIdError;

impl fmt::Display for NodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdError")
    }
}

impl std::error::Error for NodeIdError {}

/// An identifier for a node in the address space of a server.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct NodeId {
    /// The namespace index.
    pub namespace: u16,
    /// The node's identifier within the namespace.
    pub identifier: Identifier,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};{}", self.namespace, self.identifier)
        } else {
            write!(f, "{}", self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::null()
    }
}

impl UaNullable for NodeId {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

// The byte preceding the identifier selects the most compact of six wire
// forms. The encoder always picks the smallest form that fits.
const FORM_TWO_BYTE: u8 = 0x0;
const FORM_FOUR_BYTE: u8 = 0x1;
const FORM_NUMERIC: u8 = 0x2;
const FORM_STRING: u8 = 0x3;
const FORM_GUID: u8 = 0x4;
const FORM_BYTE_STRING: u8 = 0x5;

impl BinaryEncodable for NodeId {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        match &self.identifier {
            Identifier::Numeric(value) => {
                if self.namespace == 0 && *value <= 255 {
                    2
                } else if self.namespace <= 255 && *value <= 65535 {
                    4
                } else {
                    7
                }
            }
            Identifier::String(value) => 3 + value.byte_len(ctx),
            Identifier::Guid(value) => 3 + value.byte_len(ctx),
            Identifier::ByteString(value) => 3 + value.byte_len(ctx),
        }
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        match &self.identifier {
            Identifier::Numeric(value) => {
                if self.namespace == 0 && *value <= 255 {
                    write_u8(stream, FORM_TWO_BYTE)?;
                    write_u8(stream, *value as u8)
                } else if self.namespace <= 255 && *value <= 65535 {
                    write_u8(stream, FORM_FOUR_BYTE)?;
                    write_u8(stream, self.namespace as u8)?;
                    write_u16(stream, *value as u16)
                } else {
                    write_u8(stream, FORM_NUMERIC)?;
                    write_u16(stream, self.namespace)?;
                    write_u32(stream, *value)
                }
            }
            Identifier::String(value) => {
                write_u8(stream, FORM_STRING)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream, ctx)
            }
            Identifier::Guid(value) => {
                write_u8(stream, FORM_GUID)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream, ctx)
            }
            Identifier::ByteString(value) => {
                write_u8(stream, FORM_BYTE_STRING)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream, ctx)
            }
        }
    }
}

impl BinaryDecodable for NodeId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        // The high bits carry ExpandedNodeId flags, not legal here
        match encoding & 0x0f {
            FORM_TWO_BYTE => {
                let value = read_u8(stream)?;
                Ok(NodeId::new(0, u32::from(value)))
            }
            FORM_FOUR_BYTE => {
                let namespace = read_u8(stream)?;
                let value = read_u16(stream)?;
                Ok(NodeId::new(u16::from(namespace), u32::from(value)))
            }
            FORM_NUMERIC => {
                let namespace = read_u16(stream)?;
                let value = read_u32(stream)?;
                Ok(NodeId::new(namespace, value))
            }
            FORM_STRING => {
                let namespace = read_u16(stream)?;
                let value = UAString::decode(stream, ctx)?;
                Ok(NodeId::new(namespace, value))
            }
            FORM_GUID => {
                let namespace = read_u16(stream)?;
                let value = Guid::decode(stream, ctx)?;
                Ok(NodeId::new(namespace, value))
            }
            FORM_BYTE_STRING => {
                let namespace = read_u16(stream)?;
                let value = ByteString::decode(stream, ctx)?;
                Ok(NodeId::new(namespace, value))
            }
            r => Err(Error::decoding(format!(
                "Invalid node id encoding byte {:#x}",
                r
            ))),
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, identifier) = if let Some(rest) = s.strip_prefix("ns=") {
            let Some((ns, id)) = rest.split_once(';') else {
                return Err(NodeIdError);
            };
            (ns.parse::<u16>().map_err(|_| NodeIdError)?, id)
        } else {
            (0, s)
        };
        let identifier = Identifier::from_str(identifier).map_err(|_| NodeIdError)?;
        Ok(NodeId {
            namespace,
            identifier,
        })
    }
}

impl From<ObjectId> for NodeId {
    fn from(value: ObjectId) -> Self {
        NodeId::new(0, value as u32)
    }
}

impl From<DataTypeId> for NodeId {
    fn from(value: DataTypeId) -> Self {
        NodeId::new(0, value as u32)
    }
}

impl NodeId {
    /// Construct a node id from a namespace index and anything that can be
    /// turned into an identifier.
    pub fn new<T>(namespace: u16, value: T) -> NodeId
    where
        T: Into<Identifier>,
    {
        NodeId {
            namespace,
            identifier: value.into(),
        }
    }

    /// The null node id, `ns=0;i=0`.
    pub fn null() -> NodeId {
        NodeId::new(0, 0u32)
    }

    /// True for the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && matches!(self.identifier, Identifier::Numeric(0))
    }

    /// The numeric identifier value, if this is a numeric node id.
    pub fn as_u32(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(value) => Some(value),
            _ => None,
        }
    }

    /// Interpret this node id as a well known object id.
    pub fn as_object_id(&self) -> Result<ObjectId, NodeIdError> {
        match self.identifier {
            Identifier::Numeric(value) if self.namespace == 0 => {
                ObjectId::try_from(value).map_err(|_| NodeIdError)
            }
            _ => Err(NodeIdError),
        }
    }

    /// Interpret this node id as a well known data type id.
    pub fn as_data_type_id(&self) -> Result<DataTypeId, NodeIdError> {
        match self.identifier {
            Identifier::Numeric(value) if self.namespace == 0 => {
                DataTypeId::try_from(value).map_err(|_| NodeIdError)
            }
            _ => Err(NodeIdError),
        }
    }
}
