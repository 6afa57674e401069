// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Hand written service message structures for the services this stack
//! frames itself, plus the descriptor types they are built from.

mod enums;
mod fault;
mod read;
mod secure_channel;
mod structure_def;

pub use enums::{MessageSecurityMode, SecurityTokenRequestType, StructureType, TimestampsToReturn};
pub use fault::ServiceFault;
pub use read::{ReadRequest, ReadResponse, ReadValueId};
pub use secure_channel::{
    ChannelSecurityToken, CloseSecureChannelRequest, CloseSecureChannelResponse,
    OpenSecureChannelRequest, OpenSecureChannelResponse,
};
pub use structure_def::{StructureDefinition, StructureField};

use std::sync::LazyLock;

use crate::{
    node_ids::{DataTypeId, ObjectId},
    type_loader::{
        binary_decode_to_enc, TypeLoader, TypeLoaderInstance, TypeLoaderPriority,
    },
    Context, DynEncodable, EncodingResult, NodeId,
};

static CORE_TYPES: LazyLock<TypeLoaderInstance> = LazyLock::new(|| {
    let mut inst = TypeLoaderInstance::new();
    inst.add_binary_type(
        DataTypeId::ServiceFault as u32,
        ObjectId::ServiceFault_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<ServiceFault>,
    );
    inst.add_binary_type(
        DataTypeId::OpenSecureChannelRequest as u32,
        ObjectId::OpenSecureChannelRequest_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<OpenSecureChannelRequest>,
    );
    inst.add_binary_type(
        DataTypeId::OpenSecureChannelResponse as u32,
        ObjectId::OpenSecureChannelResponse_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<OpenSecureChannelResponse>,
    );
    inst.add_binary_type(
        DataTypeId::CloseSecureChannelRequest as u32,
        ObjectId::CloseSecureChannelRequest_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<CloseSecureChannelRequest>,
    );
    inst.add_binary_type(
        DataTypeId::CloseSecureChannelResponse as u32,
        ObjectId::CloseSecureChannelResponse_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<CloseSecureChannelResponse>,
    );
    inst.add_binary_type(
        DataTypeId::ReadRequest as u32,
        ObjectId::ReadRequest_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<ReadRequest>,
    );
    inst.add_binary_type(
        DataTypeId::ReadResponse as u32,
        ObjectId::ReadResponse_Encoding_DefaultBinary as u32,
        binary_decode_to_enc::<ReadResponse>,
    );
    inst
});

/// Type loader for the namespace zero types defined in this crate.
pub struct CoreTypeLoader;

impl TypeLoader for CoreTypeLoader {
    fn load_from_binary(
        &self,
        node_id: &NodeId,
        stream: &mut dyn std::io::Read,
        ctx: &Context<'_>,
    ) -> Option<EncodingResult<Box<dyn DynEncodable>>> {
        if node_id.namespace != 0 {
            return None;
        }
        let num_id = node_id.as_u32()?;
        CORE_TYPES.decode_binary(num_id, stream, ctx)
    }

    fn priority(&self) -> TypeLoaderPriority {
        TypeLoaderPriority::Core
    }
}
