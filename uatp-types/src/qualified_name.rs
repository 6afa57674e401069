// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A name qualified by a namespace index.

use std::io::{Read, Write};

use crate::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult, UaNullable},
    string::UAString,
};

/// A name qualified by the index of the namespace it belongs to.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default)]
pub struct QualifiedName {
    /// Namespace index the name belongs to.
    pub namespace_index: u16,
    /// The name itself.
    pub name: UAString,
}

impl UaNullable for QualifiedName {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl BinaryEncodable for QualifiedName {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        2 + self.name.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.namespace_index.encode(stream, ctx)?;
        self.name.encode(stream, ctx)
    }
}

impl BinaryDecodable for QualifiedName {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        let namespace_index = u16::decode(stream, ctx)?;
        let name = UAString::decode(stream, ctx)?;
        Ok(QualifiedName {
            namespace_index,
            name,
        })
    }
}

impl<'a> From<&'a str> for QualifiedName {
    fn from(value: &'a str) -> Self {
        QualifiedName {
            namespace_index: 0,
            name: value.into(),
        }
    }
}

impl QualifiedName {
    /// Create a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<UAString>) -> QualifiedName {
        QualifiedName {
            namespace_index,
            name: name.into(),
        }
    }

    /// The null qualified name.
    pub fn null() -> QualifiedName {
        QualifiedName::default()
    }

    /// True for the null qualified name.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && self.name.is_null()
    }
}
