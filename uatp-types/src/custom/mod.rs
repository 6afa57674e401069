// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Runtime type descriptors and the generic codec driven by them.
//!
//! Statically defined Rust structs are the fast path through the codec.
//! This module is the generic path: a [`DataTypeTree`] of descriptors
//! parsed from [`crate::StructureDefinition`]s, and [`DynamicStructure`],
//! a value that encodes and decodes itself by walking its descriptor.

mod custom_struct;
mod type_tree;

pub use custom_struct::{DynamicStructure, DynamicTypeLoader};
pub use type_tree::{DataTypeTree, EncodingIds, ParsedStructureField, StructTypeInfo};
