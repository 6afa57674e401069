// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Data type definitions, the raw material the runtime type descriptors
//! are parsed from.

use std::io::{Read, Write};

use crate::{
    encoding::{byte_len_array, BinaryDecodable, BinaryEncodable, EncodingResult},
    localized_text::LocalizedText,
    node_id::NodeId,
    string::UAString,
};

use super::enums::StructureType;

/// One field of a structured data type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructureField {
    /// Field name.
    pub name: UAString,
    /// Human readable description.
    pub description: LocalizedText,
    /// Data type of the field.
    pub data_type: NodeId,
    /// -1 for a scalar, 1 for an array, > 1 for a multi-dimensional array.
    pub value_rank: i32,
    /// Fixed dimensions for multi-dimensional arrays, when constrained.
    pub array_dimensions: Option<Vec<u32>>,
    /// Maximum string length for string valued fields, 0 for unlimited.
    pub max_string_length: u32,
    /// True when the field may be absent on the wire.
    pub is_optional: bool,
}

impl BinaryEncodable for StructureField {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.name.byte_len(ctx)
            + self.description.byte_len(ctx)
            + self.data_type.byte_len(ctx)
            + 4
            + byte_len_array(&self.array_dimensions, ctx)
            + 4
            + 1
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.name.encode(stream, ctx)?;
        self.description.encode(stream, ctx)?;
        self.data_type.encode(stream, ctx)?;
        self.value_rank.encode(stream, ctx)?;
        self.array_dimensions.encode(stream, ctx)?;
        self.max_string_length.encode(stream, ctx)?;
        self.is_optional.encode(stream, ctx)
    }
}

impl BinaryDecodable for StructureField {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(StructureField {
            name: UAString::decode(stream, ctx)?,
            description: LocalizedText::decode(stream, ctx)?,
            data_type: NodeId::decode(stream, ctx)?,
            value_rank: i32::decode(stream, ctx)?,
            array_dimensions: BinaryDecodable::decode(stream, ctx)?,
            max_string_length: u32::decode(stream, ctx)?,
            is_optional: bool::decode(stream, ctx)?,
        })
    }
}

/// The definition of a structured data type: its encoding id, base type,
/// shape, and ordered fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructureDefinition {
    /// Node id of the default binary encoding of the type.
    pub default_encoding_id: NodeId,
    /// Node id of the base data type.
    pub base_data_type: NodeId,
    /// The encoding shape of the type.
    pub structure_type: StructureType,
    /// The fields, in declaration order.
    pub fields: Option<Vec<StructureField>>,
}

impl BinaryEncodable for StructureDefinition {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.default_encoding_id.byte_len(ctx)
            + self.base_data_type.byte_len(ctx)
            + self.structure_type.byte_len(ctx)
            + byte_len_array(&self.fields, ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.default_encoding_id.encode(stream, ctx)?;
        self.base_data_type.encode(stream, ctx)?;
        self.structure_type.encode(stream, ctx)?;
        self.fields.encode(stream, ctx)
    }
}

impl BinaryDecodable for StructureDefinition {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(StructureDefinition {
            default_encoding_id: NodeId::decode(stream, ctx)?,
            base_data_type: NodeId::decode(stream, ctx)?,
            structure_type: StructureType::decode(stream, ctx)?,
            fields: BinaryDecodable::decode(stream, ctx)?,
        })
    }
}
