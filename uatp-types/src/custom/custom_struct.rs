// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A structure decoded and encoded entirely through its type descriptor.

use std::{io::Write, sync::Arc};

use crate::{
    encoding::{
        read_i32, read_u32, write_i32, write_u32, BinaryDecodable, BinaryEncodable,
        EncodingResult, Error, UaNullable,
    },
    expanded_node_id::ExpandedNodeId,
    extension_object::DynEncodable,
    message_info::ExpandedMessageInfo,
    service_types::StructureType,
    status_code::StatusCode,
    type_loader::{TypeLoader, TypeLoaderPriority},
    variant::{Variant, VariantScalarTypeId},
    Array, Context, NodeId,
};

use super::type_tree::{DataTypeTree, ParsedStructureField, StructTypeInfo};

/// A structured value held as an ordered list of variants, encoded and
/// decoded by walking a [`StructTypeInfo`] descriptor. Supports plain
/// structures, structures with optional fields, and unions; none of which
/// need to be known at compile time.
#[derive(Debug, Clone)]
pub struct DynamicStructure {
    type_def: Arc<StructTypeInfo>,
    type_tree: Arc<DataTypeTree>,
    /// Selects the active union field, one based. Zero means the union is
    /// empty. Unused for structures.
    discriminant: u32,
    data: Vec<Variant>,
}

impl PartialEq for DynamicStructure {
    fn eq(&self, other: &Self) -> bool {
        self.type_def.node_id == other.type_def.node_id
            && self.discriminant == other.discriminant
            && self.data == other.data
    }
}

impl ExpandedMessageInfo for DynamicStructure {
    fn full_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(self.type_def.encoding_ids.binary_id.clone())
    }

    fn full_data_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(self.type_def.node_id.clone())
    }
}

impl UaNullable for DynamicStructure {
    fn is_ua_null(&self) -> bool {
        self.type_def.structure_type == StructureType::Union && self.discriminant == 0
    }
}

impl DynamicStructure {
    /// Create a structure value, validating the fields against the
    /// descriptor.
    pub fn new_struct(
        type_def: Arc<StructTypeInfo>,
        type_tree: Arc<DataTypeTree>,
        data: Vec<Variant>,
    ) -> Result<Self, Error> {
        if matches!(type_def.structure_type, StructureType::Union) {
            return Err(Error::new(
                StatusCode::BadInvalidArgument,
                "Cannot construct a union with new_struct, use new_union",
            ));
        }
        if data.len() != type_def.fields.len() {
            return Err(Error::new(
                StatusCode::BadInvalidArgument,
                format!(
                    "Invalid number of fields, got {}, expected {}",
                    data.len(),
                    type_def.fields.len()
                ),
            ));
        }
        for (value, field) in data.iter().zip(type_def.fields.iter()) {
            field.validate(value)?;
        }
        Ok(Self {
            type_def,
            type_tree,
            discriminant: 0,
            data,
        })
    }

    /// Create a union value with the field selected by the one based
    /// `discriminant`.
    pub fn new_union(
        type_def: Arc<StructTypeInfo>,
        type_tree: Arc<DataTypeTree>,
        data: Variant,
        discriminant: u32,
    ) -> Result<Self, Error> {
        if !matches!(type_def.structure_type, StructureType::Union) {
            return Err(Error::new(
                StatusCode::BadInvalidArgument,
                "Cannot construct a struct with new_union, use new_struct",
            ));
        }
        if discriminant == 0 {
            return Err(Error::new(
                StatusCode::BadInvalidArgument,
                "Discriminant must be non-zero",
            ));
        }
        let Some(field) = type_def.fields.get(discriminant as usize - 1) else {
            return Err(Error::new(
                StatusCode::BadInvalidArgument,
                format!("Invalid discriminant {}", discriminant),
            ));
        };
        field.validate(&data)?;
        Ok(Self {
            type_def,
            type_tree,
            discriminant,
            data: vec![data],
        })
    }

    /// Create an empty union value.
    pub fn new_null_union(type_def: Arc<StructTypeInfo>, type_tree: Arc<DataTypeTree>) -> Self {
        Self {
            type_def,
            type_tree,
            discriminant: 0,
            data: Vec::new(),
        }
    }

    /// The descriptor of this value.
    pub fn type_def(&self) -> &Arc<StructTypeInfo> {
        &self.type_def
    }

    /// The active union discriminant, zero for an empty union.
    pub fn discriminant(&self) -> u32 {
        self.discriminant
    }

    /// The field values in declaration order.
    pub fn values(&self) -> &[Variant] {
        &self.data
    }

    /// The field at `index`.
    pub fn get_field(&self, index: usize) -> Option<&Variant> {
        self.data.get(index)
    }

    /// The field with the given name.
    pub fn get_field_by_name(&self, name: &str) -> Option<&Variant> {
        self.type_def
            .index_by_name
            .get(name)
            .and_then(|i| self.data.get(*i))
    }

    fn field_byte_len(
        &self,
        value: &Variant,
        field: &ParsedStructureField,
        ctx: &Context<'_>,
    ) -> usize {
        match value {
            Variant::ExtensionObject(o) => {
                // A concrete structured field encodes as a bare body, an
                // abstract one keeps the extension object wrapper.
                let Some(field_ty) = self.type_tree.get_struct_type(&field.type_id) else {
                    return o.byte_len(ctx);
                };
                if field_ty.is_abstract {
                    o.byte_len(ctx)
                } else {
                    o.body.as_ref().map_or(0, |b| b.byte_len_dyn(ctx))
                }
            }
            Variant::Array(a) => {
                let mut size = if field.value_rank > 1 {
                    4 + 4 * a.dimensions.as_ref().map_or(0, |d| d.len())
                } else {
                    4
                };
                for v in &a.values {
                    size += self.field_byte_len(v, field, ctx);
                }
                size
            }
            v => v.value_byte_len(ctx),
        }
    }

    fn encode_field<S: Write + ?Sized>(
        &self,
        mut stream: &mut S,
        value: &Variant,
        field: &ParsedStructureField,
        ctx: &Context<'_>,
    ) -> EncodingResult<()> {
        match value {
            Variant::ExtensionObject(o) => {
                let Some(field_ty) = self.type_tree.get_struct_type(&field.type_id) else {
                    return Err(Error::encoding(format!(
                        "Field type missing from type tree: {}",
                        field.type_id
                    )));
                };
                if field_ty.is_abstract {
                    o.encode(stream, ctx)
                } else {
                    let Some(body) = &o.body else {
                        return Err(Error::encoding(
                            "Structured field is missing its extension object body",
                        ));
                    };
                    body.encode_binary(&mut stream, ctx)
                }
            }
            Variant::Array(a) => {
                if field.value_rank > 1 {
                    let Some(dims) = &a.dimensions else {
                        return Err(Error::encoding(
                            "Array dimensions are required for fields with rank > 1",
                        ));
                    };
                    // Dimensions are Int32 on the wire
                    write_i32(stream, dims.len() as i32)?;
                    for dim in dims {
                        write_i32(stream, *dim as i32)?;
                    }
                } else {
                    write_i32(stream, a.values.len() as i32)?;
                }
                for v in &a.values {
                    self.encode_field(stream, v, field, ctx)?;
                }
                Ok(())
            }
            Variant::Empty => Err(Error::encoding("Empty variant value in structure")),
            v => v.encode_value(stream, ctx),
        }
    }
}

impl BinaryEncodable for DynamicStructure {
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        let def = &self.type_def;
        match def.structure_type {
            StructureType::Structure => self
                .data
                .iter()
                .zip(def.fields.iter())
                .map(|(value, field)| self.field_byte_len(value, field, ctx))
                .sum(),
            StructureType::StructureWithOptionalFields => {
                let mut size = 4;
                for (value, field) in self.data.iter().zip(def.fields.iter()) {
                    if !field.is_optional || !matches!(value, Variant::Empty) {
                        size += self.field_byte_len(value, field, ctx);
                    }
                }
                size
            }
            StructureType::Union => {
                let mut size = 4;
                if self.discriminant != 0 {
                    if let (Some(value), Some(field)) = (
                        self.data.first(),
                        def.fields.get(self.discriminant as usize - 1),
                    ) {
                        size += self.field_byte_len(value, field, ctx);
                    }
                }
                size
            }
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        let def = &self.type_def;
        match def.structure_type {
            StructureType::Structure => {
                for (value, field) in self.data.iter().zip(def.fields.iter()) {
                    self.encode_field(stream, value, field, ctx)?;
                }
                Ok(())
            }
            StructureType::StructureWithOptionalFields => {
                // One mask bit per optional field, in declaration order
                let mut mask = 0u32;
                let mut optional_idx = 0;
                for (value, field) in self.data.iter().zip(def.fields.iter()) {
                    if field.is_optional {
                        if !matches!(value, Variant::Empty) {
                            mask |= 1 << optional_idx;
                        }
                        optional_idx += 1;
                    }
                }
                write_u32(stream, mask)?;
                for (value, field) in self.data.iter().zip(def.fields.iter()) {
                    if !field.is_optional || !matches!(value, Variant::Empty) {
                        self.encode_field(stream, value, field, ctx)?;
                    }
                }
                Ok(())
            }
            StructureType::Union => {
                write_u32(stream, self.discriminant)?;
                if self.discriminant != 0 {
                    let (Some(value), Some(field)) = (
                        self.data.first(),
                        def.fields.get(self.discriminant as usize - 1),
                    ) else {
                        return Err(Error::encoding(
                            "Union discriminant out of range of known fields",
                        ));
                    };
                    self.encode_field(stream, value, field, ctx)?;
                }
                Ok(())
            }
        }
    }
}

/// Type loader that decodes registered types through their descriptors,
/// producing [`DynamicStructure`] values.
pub struct DynamicTypeLoader {
    type_tree: Arc<DataTypeTree>,
}

impl DynamicTypeLoader {
    /// Create a loader over the given descriptor registry.
    pub fn new(type_tree: Arc<DataTypeTree>) -> Self {
        Self { type_tree }
    }

    fn decode_field_value(
        &self,
        field: &ParsedStructureField,
        stream: &mut dyn std::io::Read,
        ctx: &Context<'_>,
    ) -> EncodingResult<Variant> {
        type T = VariantScalarTypeId;
        Ok(match field.scalar_type {
            T::Boolean => Variant::from(bool::decode(stream, ctx)?),
            T::SByte => Variant::from(i8::decode(stream, ctx)?),
            T::Byte => Variant::from(u8::decode(stream, ctx)?),
            T::Int16 => Variant::from(i16::decode(stream, ctx)?),
            T::UInt16 => Variant::from(u16::decode(stream, ctx)?),
            T::Int32 => Variant::from(i32::decode(stream, ctx)?),
            T::UInt32 => Variant::from(u32::decode(stream, ctx)?),
            T::Int64 => Variant::from(i64::decode(stream, ctx)?),
            T::UInt64 => Variant::from(u64::decode(stream, ctx)?),
            T::Float => Variant::from(f32::decode(stream, ctx)?),
            T::Double => Variant::from(f64::decode(stream, ctx)?),
            T::String => Variant::from(crate::UAString::decode(stream, ctx)?),
            T::DateTime => Variant::from(crate::DateTime::decode(stream, ctx)?),
            T::Guid => Variant::from(crate::Guid::decode(stream, ctx)?),
            T::ByteString => Variant::from(crate::ByteString::decode(stream, ctx)?),
            T::XmlElement => Variant::XmlElement(crate::XmlElement::decode(stream, ctx)?),
            T::NodeId => Variant::from(crate::NodeId::decode(stream, ctx)?),
            T::ExpandedNodeId => Variant::from(crate::ExpandedNodeId::decode(stream, ctx)?),
            T::StatusCode => Variant::from(crate::StatusCode::decode(stream, ctx)?),
            T::QualifiedName => Variant::from(crate::QualifiedName::decode(stream, ctx)?),
            T::LocalizedText => Variant::from(crate::LocalizedText::decode(stream, ctx)?),
            T::ExtensionObject => {
                let Some(field_ty) = self.type_tree.get_struct_type(&field.type_id) else {
                    return Err(Error::decoding(format!(
                        "Field type missing from type tree: {}",
                        field.type_id
                    )));
                };
                if field_ty.is_abstract {
                    Variant::from(crate::ExtensionObject::decode(stream, ctx)?)
                } else {
                    Variant::from(ctx.load_from_binary(&field_ty.node_id, stream)?)
                }
            }
            T::DataValue => Variant::from(crate::DataValue::decode(stream, ctx)?),
            T::Variant => Variant::Variant(Box::new(Variant::decode(stream, ctx)?)),
            T::DiagnosticInfo => Variant::from(crate::DiagnosticInfo::decode(stream, ctx)?),
        })
    }

    fn decode_field(
        &self,
        field: &ParsedStructureField,
        stream: &mut dyn std::io::Read,
        ctx: &Context<'_>,
    ) -> EncodingResult<Variant> {
        if field.value_rank < 1 {
            return self.decode_field_value(field, stream, ctx);
        }
        let (len, dims) = if field.value_rank > 1 {
            let Some(dims) = <Option<Vec<i32>>>::decode(stream, ctx)? else {
                return Err(Error::decoding("Array has invalid dimensions"));
            };
            if dims.len() != field.value_rank as usize {
                return Err(Error::decoding(
                    "Array dimension count must match the field's value rank",
                ));
            }
            let mut len = 1usize;
            let mut final_dims = Vec::with_capacity(dims.len());
            for dim in dims {
                if dim <= 0 {
                    return Err(Error::decoding("Array dimensions must all be positive"));
                }
                len *= dim as usize;
                final_dims.push(dim as u32);
            }
            (len, Some(final_dims))
        } else {
            let len = read_i32(stream)?;
            if len < 0 {
                return Err(Error::decoding("Array length is negative and invalid"));
            }
            (len as usize, None)
        };
        if len > ctx.options().max_array_length {
            return Err(Error::decoding(format!(
                "Array length {} exceeds decoding limit {}",
                len,
                ctx.options().max_array_length
            )));
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.decode_field_value(field, stream, ctx)?);
        }
        let array = match dims {
            Some(dims) => {
                Array::new_multi(field.scalar_type, values, dims).map_err(Error::decoding)?
            }
            None => Array::new(field.scalar_type, values).map_err(Error::decoding)?,
        };
        Ok(Variant::Array(Box::new(array)))
    }

    fn decode_type_inner(
        &self,
        stream: &mut dyn std::io::Read,
        ctx: &Context<'_>,
        t: &Arc<StructTypeInfo>,
    ) -> EncodingResult<Box<dyn DynEncodable>> {
        match t.structure_type {
            StructureType::Structure => {
                let mut values = Vec::with_capacity(t.fields.len());
                for field in &t.fields {
                    values.push(self.decode_field(field, stream, ctx)?);
                }
                Ok(Box::new(DynamicStructure {
                    type_def: t.clone(),
                    type_tree: self.type_tree.clone(),
                    discriminant: 0,
                    data: values,
                }))
            }
            StructureType::StructureWithOptionalFields => {
                let mask = read_u32(stream)?;
                let mut values = Vec::with_capacity(t.fields.len());
                let mut optional_idx = 0;
                for field in &t.fields {
                    if field.is_optional {
                        if mask & (1 << optional_idx) != 0 {
                            values.push(self.decode_field(field, stream, ctx)?);
                        } else {
                            values.push(Variant::Empty);
                        }
                        optional_idx += 1;
                    } else {
                        values.push(self.decode_field(field, stream, ctx)?);
                    }
                }
                Ok(Box::new(DynamicStructure {
                    type_def: t.clone(),
                    type_tree: self.type_tree.clone(),
                    discriminant: 0,
                    data: values,
                }))
            }
            StructureType::Union => {
                let discriminant = read_u32(stream)?;
                if discriminant == 0 {
                    return Ok(Box::new(DynamicStructure::new_null_union(
                        t.clone(),
                        self.type_tree.clone(),
                    )));
                }
                let Some(field) = t.fields.get(discriminant as usize - 1) else {
                    return Err(Error::decoding(format!(
                        "Invalid union discriminant {}",
                        discriminant
                    )));
                };
                let values = vec![self.decode_field(field, stream, ctx)?];
                Ok(Box::new(DynamicStructure {
                    type_def: t.clone(),
                    type_tree: self.type_tree.clone(),
                    discriminant,
                    data: values,
                }))
            }
        }
    }
}

impl TypeLoader for DynamicTypeLoader {
    fn load_from_binary(
        &self,
        node_id: &NodeId,
        stream: &mut dyn std::io::Read,
        ctx: &Context<'_>,
    ) -> Option<EncodingResult<Box<dyn DynEncodable>>> {
        let t = self.type_tree.get_struct_type(node_id)?;
        Some(self.decode_type_inner(stream, ctx, t))
    }

    fn priority(&self) -> TypeLoaderPriority {
        TypeLoaderPriority::Dynamic(2)
    }
}
