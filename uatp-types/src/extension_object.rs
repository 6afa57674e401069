// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The extension object, the wire container for "any structured value".

use std::{
    any::{Any, TypeId},
    fmt,
    io::{Read, Write},
};

use crate::{
    encoding::{
        read_u8, write_i32, write_u8, BinaryDecodable, BinaryEncodable, EncodingResult, Error,
        UaNullable,
    },
    expanded_node_id::ExpandedNodeId,
    message_info::ExpandedMessageInfo,
    node_id::NodeId,
    node_ids::ObjectId,
    string::UAString,
};

#[derive(Debug)]
/// Error returned when working with extension objects.
pub struct ExtensionObjectError;

impl fmt::Display for ExtensionObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionObjectError")
    }
}

impl std::error::Error for ExtensionObjectError {}

/// A structure that can be encoded back to binary without its concrete type
/// being known to the caller. Blanket implemented for everything that is
/// [`BinaryEncodable`] + [`ExpandedMessageInfo`] + `Clone` + `PartialEq` +
/// `Debug` + `Send` + `Sync`.
pub trait DynEncodable: Any + Send + Sync + std::fmt::Debug {
    /// Encode the structure using OPC UA binary encoding.
    fn encode_binary(
        &self,
        stream: &mut dyn std::io::Write,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()>;

    /// The binary byte length of this structure.
    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize;

    /// The binary encoding id of this structure.
    fn binary_type_id(&self) -> ExpandedNodeId;

    /// The data type id of this structure.
    fn data_type_id(&self) -> ExpandedNodeId;

    /// Cast to a boxed `Any`, required for downcasting by value.
    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static>;

    /// Cast to an `Any` trait object, required for downcasting by reference.
    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync);

    /// Clone into a box, so `ExtensionObject` can implement `Clone`.
    fn clone_box(&self) -> Box<dyn DynEncodable>;

    /// Compare with another dynamic structure of possibly different type.
    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool;

    /// The Rust type name, useful for debugging.
    fn type_name(&self) -> &'static str;
}

impl<T> DynEncodable for T
where
    T: BinaryEncodable
        + ExpandedMessageInfo
        + Any
        + std::fmt::Debug
        + Send
        + Sync
        + Clone
        + PartialEq,
{
    fn encode_binary(
        &self,
        stream: &mut dyn std::io::Write,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        BinaryEncodable::encode(self, stream, ctx)
    }

    fn byte_len_dyn(&self, ctx: &crate::Context<'_>) -> usize {
        BinaryEncodable::byte_len(self, ctx)
    }

    fn binary_type_id(&self) -> ExpandedNodeId {
        self.full_type_id()
    }

    fn data_type_id(&self) -> ExpandedNodeId {
        self.full_data_type_id()
    }

    fn as_dyn_any(self: Box<Self>) -> Box<dyn Any + Send + Sync + 'static> {
        self
    }

    fn as_dyn_any_ref(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn clone_box(&self) -> Box<dyn DynEncodable> {
        Box::new(self.clone())
    }

    fn dyn_eq(&self, other: &dyn DynEncodable) -> bool {
        if let Some(o) = other.as_dyn_any_ref().downcast_ref::<Self>() {
            o == self
        } else {
            false
        }
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl PartialEq for dyn DynEncodable {
    fn eq(&self, other: &dyn DynEncodable) -> bool {
        self.dyn_eq(other)
    }
}

// Wire encoding selector byte values.
const BODY_NONE: u8 = 0x0;
const BODY_BYTE_STRING: u8 = 0x1;
const BODY_XML: u8 = 0x2;

/// An extension object wraps any structured value for transport inside a
/// variant or message field. Decoding resolves the body through the type
/// loaders in the context; encoding writes the resolved encoding id and the
/// length prefixed body.
#[derive(PartialEq, Debug, Default)]
pub struct ExtensionObject {
    /// The decoded body, `None` for the null extension object.
    pub body: Option<Box<dyn DynEncodable>>,
}

impl Clone for ExtensionObject {
    fn clone(&self) -> Self {
        Self {
            body: self.body.as_ref().map(|b| b.clone_box()),
        }
    }
}

impl UaNullable for ExtensionObject {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl BinaryEncodable for ExtensionObject {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let type_id = self.binary_type_id();
        // Default to the 2 byte null node id here and fail in encode
        let mut size = type_id
            .try_resolve(ctx.namespaces())
            .map(|n| n.byte_len(ctx))
            .unwrap_or(2);
        size += match &self.body {
            Some(b) => 5 + b.byte_len_dyn(ctx),
            None => 1,
        };
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        mut stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        let type_id = self.binary_type_id();
        let Some(id) = type_id.try_resolve(ctx.namespaces()) else {
            return Err(Error::encoding(format!("Unknown encoding ID: {type_id}")));
        };
        id.as_ref().encode(stream, ctx)?;
        match &self.body {
            Some(b) => {
                write_u8(stream, BODY_BYTE_STRING)?;
                write_i32(stream, b.byte_len_dyn(ctx) as i32)?;
                b.encode_binary(&mut stream as &mut dyn Write, ctx)
            }
            None => write_u8(stream, BODY_NONE),
        }
    }
}

impl BinaryDecodable for ExtensionObject {
    fn decode<S: Read + ?Sized>(
        mut stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        // Depth limited, extension objects can nest through their bodies
        let _depth_lock = ctx.options().depth_lock()?;
        let node_id = NodeId::decode(stream, ctx)?;
        let encoding_type = read_u8(stream)?;
        let body = match encoding_type {
            BODY_NONE => None,
            BODY_BYTE_STRING => {
                let size = i32::decode(stream, ctx)?;
                if size <= 0 {
                    None
                } else {
                    Some(ctx.load_from_binary(&node_id, &mut stream)?)
                }
            }
            BODY_XML => {
                // Binary only stack, skip over an XML body
                let body = UAString::decode(stream, ctx)?;
                log::warn!(
                    "Skipped XML encoded extension object body for {}, {} bytes",
                    node_id,
                    body.len().max(0)
                );
                None
            }
            _ => {
                return Err(Error::decoding(format!(
                    "Invalid extension object encoding type {} in stream",
                    encoding_type
                )));
            }
        };
        Ok(body.unwrap_or_else(ExtensionObject::null))
    }
}

impl ExtensionObject {
    /// Create an extension object wrapping `encodable`.
    pub fn new<T>(encodable: T) -> ExtensionObject
    where
        T: DynEncodable,
    {
        Self {
            body: Some(Box::new(encodable)),
        }
    }

    /// The null extension object, carrying no value.
    pub fn null() -> ExtensionObject {
        ExtensionObject { body: None }
    }

    /// True for the null extension object.
    pub fn is_null(&self) -> bool {
        self.body.is_none()
    }

    /// The binary encoding id of the wrapped value.
    pub fn binary_type_id(&self) -> ExpandedNodeId {
        self.body
            .as_ref()
            .map(|b| b.binary_type_id())
            .unwrap_or_else(ExpandedNodeId::null)
    }

    /// The object id of the wrapped value, when it is a well known id.
    pub fn object_id(&self) -> Result<ObjectId, ExtensionObjectError> {
        self.body
            .as_ref()
            .ok_or(ExtensionObjectError)?
            .binary_type_id()
            .node_id
            .as_object_id()
            .map_err(|_| ExtensionObjectError)
    }

    /// Consume self, returning the body downcast to `T` if it is one.
    pub fn into_inner_as<T: Send + Sync + 'static>(self) -> Option<Box<T>> {
        self.body.and_then(|b| b.as_dyn_any().downcast().ok())
    }

    /// The body downcast to `T` by reference, if it is one.
    pub fn inner_as<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.body
            .as_ref()
            .and_then(|b| b.as_dyn_any_ref().downcast_ref())
    }

    /// The Rust [`TypeId`] of the body, unless null.
    pub fn type_id(&self) -> Option<TypeId> {
        self.body.as_ref().map(|b| (**b).type_id())
    }

    /// True if the body is an instance of `T`.
    pub fn inner_is<T: 'static>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// The Rust type name of the body, unless null.
    pub fn type_name(&self) -> Option<&'static str> {
        self.body.as_ref().map(|b| b.type_name())
    }
}
