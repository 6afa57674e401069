// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A node identifier that may point into another server's address space.

use std::{
    borrow::Cow,
    fmt,
    io::{Read, Write},
};

use crate::{
    encoding::{
        read_u32, read_u8, write_u32, BinaryDecodable, BinaryEncodable, EncodingResult, Error,
        UaNullable,
    },
    namespaces::NamespaceMap,
    node_id::NodeId,
    string::UAString,
};

// Flag bits added to the node id encoding byte.
const FLAG_NAMESPACE_URI: u8 = 0x80;
const FLAG_SERVER_INDEX: u8 = 0x40;

/// A [`NodeId`] extended with an optional namespace URI and server index.
/// When the namespace URI is present it replaces the numeric namespace
/// index of the inner node id.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Default)]
pub struct ExpandedNodeId {
    /// The inner node id.
    pub node_id: NodeId,
    /// Namespace URI, null unless the namespace is identified by URI.
    pub namespace_uri: UAString,
    /// Index of the server holding the node, 0 for the local server.
    pub server_index: u32,
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_null() {
            write!(f, "{}", self.node_id)
        } else {
            write!(f, "nsu={};{}", self.namespace_uri, self.node_id.identifier)
        }
    }
}

impl UaNullable for ExpandedNodeId {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl BinaryEncodable for ExpandedNodeId {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        let mut size = self.node_id.byte_len(ctx);
        if !self.namespace_uri.is_null() {
            size += self.namespace_uri.byte_len(ctx);
        }
        if self.server_index != 0 {
            size += 4;
        }
        size
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        // Encode the node id into a scratch buffer so the flag bits can be
        // merged into its leading encoding byte.
        let mut buf = Vec::with_capacity(self.node_id.byte_len(ctx));
        self.node_id.encode(&mut buf, ctx)?;
        debug_assert!(!buf.is_empty());
        if !self.namespace_uri.is_null() {
            buf[0] |= FLAG_NAMESPACE_URI;
        }
        if self.server_index != 0 {
            buf[0] |= FLAG_SERVER_INDEX;
        }
        stream.write_all(&buf).map_err(Error::encoding)?;
        if !self.namespace_uri.is_null() {
            self.namespace_uri.encode(stream, ctx)?;
        }
        if self.server_index != 0 {
            write_u32(stream, self.server_index)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for ExpandedNodeId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        // Peek the encoding byte for the flags, then hand the node id
        // decoder a stream with the flags stripped.
        let encoding = read_u8(stream)?;
        let mut prefixed = PrefixRead {
            first: Some(encoding & 0x0f),
            inner: stream,
        };
        let node_id = NodeId::decode(&mut prefixed, ctx)?;
        let namespace_uri = if encoding & FLAG_NAMESPACE_URI != 0 {
            UAString::decode(stream, ctx)?
        } else {
            UAString::null()
        };
        let server_index = if encoding & FLAG_SERVER_INDEX != 0 {
            read_u32(stream)?
        } else {
            0
        };
        Ok(ExpandedNodeId {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

/// Reader that yields one substituted byte before the wrapped stream.
struct PrefixRead<'a, R: ?Sized> {
    first: Option<u8>,
    inner: &'a mut R,
}

impl<R: Read + ?Sized> Read for PrefixRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.first.take() {
            buf[0] = b;
            return Ok(1);
        }
        self.inner.read(buf)
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        ExpandedNodeId {
            node_id,
            namespace_uri: UAString::null(),
            server_index: 0,
        }
    }
}

impl ExpandedNodeId {
    /// Create an expanded node id referring to the local server.
    pub fn new(node_id: impl Into<NodeId>) -> ExpandedNodeId {
        ExpandedNodeId {
            node_id: node_id.into(),
            namespace_uri: UAString::null(),
            server_index: 0,
        }
    }

    /// The null expanded node id.
    pub fn null() -> ExpandedNodeId {
        Self::new(NodeId::null())
    }

    /// True for the null expanded node id.
    pub fn is_null(&self) -> bool {
        self.node_id.is_null() && self.namespace_uri.is_null() && self.server_index == 0
    }

    /// Resolve this into a plain node id, looking the namespace URI up in
    /// `namespaces` when one is present. Returns `None` when the URI is not
    /// registered or the node lives on a remote server.
    pub fn try_resolve<'a>(&'a self, namespaces: &NamespaceMap) -> Option<Cow<'a, NodeId>> {
        if self.server_index != 0 {
            return None;
        }
        if self.namespace_uri.is_null() {
            Some(Cow::Borrowed(&self.node_id))
        } else {
            let index = namespaces.get_index(self.namespace_uri.as_ref())?;
            Some(Cow::Owned(NodeId {
                namespace: index,
                identifier: self.node_id.identifier.clone(),
            }))
        }
    }
}
