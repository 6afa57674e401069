// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Traits exposing the encoding and data type ids of message structs.

use crate::{expanded_node_id::ExpandedNodeId, node_ids::{DataTypeId, ObjectId}};

/// Implemented by messages and structures in namespace zero whose ids are
/// known at compile time.
pub trait MessageInfo {
    /// The binary encoding id of this type.
    fn type_id(&self) -> ObjectId;
    /// The data type id of this type.
    fn data_type_id(&self) -> DataTypeId;
}

/// Ids of a type as expanded node ids, for types whose namespace may not be
/// namespace zero. Blanket implemented for everything with [`MessageInfo`].
pub trait ExpandedMessageInfo {
    /// The binary encoding id of this type.
    fn full_type_id(&self) -> ExpandedNodeId;
    /// The data type id of this type.
    fn full_data_type_id(&self) -> ExpandedNodeId;
}

impl<T> ExpandedMessageInfo for T
where
    T: MessageInfo,
{
    fn full_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(self.type_id())
    }

    fn full_data_type_id(&self) -> ExpandedNodeId {
        ExpandedNodeId::new(self.data_type_id())
    }
}
