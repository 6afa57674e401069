// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The type descriptor registry.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::{
    node_id::NodeId, service_types::{StructureDefinition, StructureType},
    status_code::StatusCode, variant::{Variant, VariantScalarTypeId}, Error,
};

/// The encoding ids of a described type.
#[derive(Debug, Clone, Default)]
pub struct EncodingIds {
    /// Node id of the default binary encoding.
    pub binary_id: NodeId,
}

/// One field of a described structure, resolved to the scalar type the
/// codec dispatches on.
#[derive(Debug, Clone)]
pub struct ParsedStructureField {
    /// Field name.
    pub name: String,
    /// Node id of the field's data type.
    pub type_id: NodeId,
    /// The built-in type the field encodes as. Structured fields encode as
    /// extension objects.
    pub scalar_type: VariantScalarTypeId,
    /// -1 or 0 for a scalar, 1 for an array, > 1 for a multi-dimensional
    /// array with that many dimensions.
    pub value_rank: i32,
    /// True when the field may be absent on the wire.
    pub is_optional: bool,
}

impl ParsedStructureField {
    /// Check that `value` is a legal value for this field.
    pub fn validate(&self, value: &Variant) -> Result<(), Error> {
        let type_error = || {
            Error::new(
                StatusCode::BadInvalidArgument,
                format!(
                    "Invalid value for field {}, expected {:?} with rank {}",
                    self.name, self.scalar_type, self.value_rank
                ),
            )
        };
        match value {
            Variant::Empty => {
                if self.is_optional {
                    Ok(())
                } else {
                    Err(type_error())
                }
            }
            Variant::Array(a) => {
                if self.value_rank < 1 || a.value_type != self.scalar_type {
                    return Err(type_error());
                }
                if self.value_rank > 1 {
                    let Some(dims) = &a.dimensions else {
                        return Err(type_error());
                    };
                    if dims.len() != self.value_rank as usize {
                        return Err(type_error());
                    }
                }
                Ok(())
            }
            scalar => {
                if self.value_rank > 0 || scalar.scalar_type_id() != Some(self.scalar_type) {
                    Err(type_error())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Descriptor of one structured type: identity, shape, and ordered fields.
#[derive(Debug)]
pub struct StructTypeInfo {
    /// Name of the type.
    pub name: String,
    /// Node id of the data type.
    pub node_id: NodeId,
    /// Encoding ids of the type.
    pub encoding_ids: EncodingIds,
    /// The encoding shape.
    pub structure_type: StructureType,
    /// The fields in declaration order.
    pub fields: Vec<ParsedStructureField>,
    /// Index into `fields` by field name.
    pub index_by_name: HashMap<String, usize>,
    /// Abstract types are carried as full extension objects when used as a
    /// field, since the concrete type varies per value.
    pub is_abstract: bool,
}

/// Registry of type descriptors, keyed by data type id and by binary
/// encoding id. Immutable once built, so it can be shared behind an `Arc`
/// and read concurrently without synchronization.
#[derive(Debug, Default)]
pub struct DataTypeTree {
    by_node_id: HashMap<NodeId, Arc<StructTypeInfo>>,
}

impl DataTypeTree {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a [`StructureDefinition`] into a descriptor and register it
    /// under its data type id and its binary encoding id.
    pub fn add_type(
        &mut self,
        name: impl Into<String>,
        node_id: NodeId,
        is_abstract: bool,
        definition: &StructureDefinition,
    ) -> Result<Arc<StructTypeInfo>, Error> {
        let name = name.into();
        let mut fields = Vec::new();
        for field in definition.fields.iter().flatten() {
            let field_name = field.name.as_ref().to_string();
            let scalar_type = self.resolve_field_type(&field.data_type).ok_or_else(|| {
                Error::new(
                    StatusCode::BadInvalidArgument,
                    format!(
                        "Field {} of type {} has unknown data type {}",
                        field_name, name, field.data_type
                    ),
                )
            })?;
            fields.push(ParsedStructureField {
                name: field_name,
                type_id: field.data_type.clone(),
                scalar_type,
                value_rank: field.value_rank,
                is_optional: field.is_optional,
            });
        }
        let index_by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let info = Arc::new(StructTypeInfo {
            name,
            node_id: node_id.clone(),
            encoding_ids: EncodingIds {
                binary_id: definition.default_encoding_id.clone(),
            },
            structure_type: definition.structure_type,
            fields,
            index_by_name,
            is_abstract,
        });
        self.by_node_id.insert(node_id, info.clone());
        self.by_node_id
            .insert(definition.default_encoding_id.clone(), info.clone());
        Ok(info)
    }

    /// Look a descriptor up by data type id or binary encoding id.
    pub fn get_struct_type(&self, node_id: &NodeId) -> Option<&Arc<StructTypeInfo>> {
        self.by_node_id.get(node_id)
    }

    /// Map a field data type to the built-in type it encodes as: a
    /// namespace zero built-in id maps to itself, a registered structure
    /// encodes as an extension object.
    fn resolve_field_type(&self, data_type: &NodeId) -> Option<VariantScalarTypeId> {
        if data_type.namespace == 0 {
            if let Some(scalar) = data_type
                .as_u32()
                .and_then(|id| u8::try_from(id).ok())
                .and_then(|id| VariantScalarTypeId::try_from(id).ok())
            {
                return Some(scalar);
            }
        }
        if self.by_node_id.contains_key(data_type) {
            Some(VariantScalarTypeId::ExtensionObject)
        } else {
            None
        }
    }
}
