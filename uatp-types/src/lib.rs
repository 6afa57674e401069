// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! Data types and the OPC UA binary codec.
//!
//! This crate contains the built-in OPC UA types, the binary
//! encoding/decoding traits, and the runtime type-descriptor machinery
//! used to encode and decode structures that are only known at runtime.

/// Limits used as defaults when decoding and encoding messages.
pub mod constants {
    /// Maximum number of elements in an array.
    pub const MAX_ARRAY_LENGTH: usize = 1000;
    /// Maximum size of a string in bytes.
    pub const MAX_STRING_LENGTH: usize = 65535;
    /// Maximum size of a byte string in bytes.
    pub const MAX_BYTE_STRING_LENGTH: usize = 65535;
    /// Maximum size of a certificate to send.
    pub const MAX_CERTIFICATE_LENGTH: usize = 32767;
    /// Maximum size of a message in bytes.
    pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;
    /// Maximum number of chunks in a message.
    pub const MAX_CHUNK_COUNT: usize = 64;
    /// Maximum nesting depth of recursive values such as variants
    /// and extension objects.
    pub const MAX_DECODING_DEPTH: u64 = 10;
}

pub mod encoding;
pub mod status_code;

mod array;
mod byte_string;
mod data_value;
mod date_time;
mod diagnostic_info;
mod expanded_node_id;
mod extension_object;
mod guid;
mod localized_text;
mod message_info;
mod namespaces;
mod node_id;
mod node_ids;
mod qualified_name;
mod request_header;
mod response_header;
mod service_types;
mod string;
mod type_loader;
mod variant;

pub mod custom;

#[cfg(test)]
mod tests;

pub use crate::{
    array::{Array, ArrayError},
    byte_string::ByteString,
    data_value::DataValue,
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::*,
    expanded_node_id::ExpandedNodeId,
    extension_object::{DynEncodable, ExtensionObject},
    guid::Guid,
    localized_text::LocalizedText,
    message_info::{ExpandedMessageInfo, MessageInfo},
    namespaces::NamespaceMap,
    node_id::{Identifier, NodeId},
    node_ids::{DataTypeId, ObjectId},
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    service_types::*,
    status_code::StatusCode,
    string::{UAString, XmlElement},
    type_loader::{
        Context, ContextOwned, TypeLoader, TypeLoaderCollection, TypeLoaderInstance,
        TypeLoaderPriority,
    },
    variant::{Variant, VariantScalarTypeId, VariantTypeId},
};
