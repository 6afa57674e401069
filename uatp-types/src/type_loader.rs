// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! Dynamic decoding of extension object bodies.
//!
//! Extension objects can carry any structure, including ones defined by
//! extensions to the standard. Each set of types registers a [`TypeLoader`]
//! that knows how to decode its members by encoding id; the loaders travel
//! with the encoding [`Context`].

use std::{io::Read, sync::Arc};

use hashbrown::HashMap;

use crate::{
    encoding::{BinaryDecodable, DecodingOptions, EncodingResult, Error},
    extension_object::{DynEncodable, ExtensionObject},
    namespaces::NamespaceMap,
    node_id::NodeId,
    service_types::CoreTypeLoader,
};

type BinaryLoadFun = fn(&mut dyn Read, &Context<'_>) -> EncodingResult<Box<dyn DynEncodable>>;

/// Table mapping numeric ids to decoding functions, used by type loaders
/// whose namespace is known at compile time.
#[derive(Default)]
pub struct TypeLoaderInstance {
    binary_types: HashMap<u32, BinaryLoadFun>,
}

/// Decode a concrete type into a boxed [`DynEncodable`].
pub fn binary_decode_to_enc<T: DynEncodable + BinaryDecodable>(
    stream: &mut dyn Read,
    ctx: &Context<'_>,
) -> EncodingResult<Box<dyn DynEncodable>> {
    Ok(Box::new(T::decode(stream, ctx)?))
}

impl TypeLoaderInstance {
    /// Create an empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoding function under both the data type id and the
    /// binary encoding id.
    pub fn add_binary_type(&mut self, data_type: u32, encoding_type: u32, fun: BinaryLoadFun) {
        self.binary_types.insert(data_type, fun);
        self.binary_types.insert(encoding_type, fun);
    }

    /// Decode the type registered under `ty`, or `None` if unknown.
    pub fn decode_binary(
        &self,
        ty: u32,
        stream: &mut dyn Read,
        ctx: &Context<'_>,
    ) -> Option<EncodingResult<Box<dyn DynEncodable>>> {
        let fun = self.binary_types.get(&ty)?;
        Some(fun(stream, ctx))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Ordering of type loaders. Lower sorts first, so more specific loaders
/// win over dynamic fallbacks when both claim a type.
pub enum TypeLoaderPriority {
    /// Reserved for the core namespace.
    Core,
    /// Any generated or hand written type set.
    Generated,
    /// A dynamic loader with a custom priority greater than 1.
    Dynamic(u32),
    /// Always sorted last.
    Fallback,
}

impl TypeLoaderPriority {
    /// The priority as a number.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Core => 0,
            Self::Generated => 1,
            Self::Dynamic(v) => *v,
            Self::Fallback => u32::MAX,
        }
    }
}

impl PartialOrd for TypeLoaderPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeLoaderPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

/// A collection of types that can be decoded by id. `load_from_binary`
/// returns `None` when the id belongs to some other loader, and an error
/// only when the id matched but decoding failed.
pub trait TypeLoader: Send + Sync {
    /// Decode the type with the given encoding id from the stream.
    fn load_from_binary(
        &self,
        node_id: &NodeId,
        stream: &mut dyn Read,
        ctx: &Context<'_>,
    ) -> Option<EncodingResult<Box<dyn DynEncodable>>>;

    /// The priority of this loader in the collection.
    fn priority(&self) -> TypeLoaderPriority {
        TypeLoaderPriority::Generated
    }
}

/// Vector of type loaders kept sorted by priority.
#[derive(Clone)]
pub struct TypeLoaderCollection {
    loaders: Vec<Arc<dyn TypeLoader>>,
}

impl Default for TypeLoaderCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeLoaderCollection {
    /// Create a collection containing the core type loader.
    pub fn new() -> Self {
        Self {
            loaders: vec![Arc::new(CoreTypeLoader)],
        }
    }

    /// Create a collection with no loaders at all. Mostly useful for tests
    /// that assert unknown-type behavior.
    pub fn new_empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Add a type loader, keeping the collection sorted.
    pub fn add_type_loader(&mut self, loader: impl TypeLoader + 'static) {
        self.add(Arc::new(loader));
    }

    /// Add a type loader, keeping the collection sorted.
    pub fn add(&mut self, loader: Arc<dyn TypeLoader>) {
        let priority = loader.priority();
        for i in 0..self.loaders.len() {
            if self.loaders[i].priority() > priority {
                self.loaders.insert(i, loader);
                return;
            }
        }
        self.loaders.push(loader);
    }

    /// Iterate over the loaders in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TypeLoader>> {
        self.loaders.iter()
    }
}

/// Owned encoding context. Clients and servers hold one of these and call
/// [`ContextOwned::context`] to produce the borrowed [`Context`] handed to
/// the codec.
pub struct ContextOwned {
    namespaces: NamespaceMap,
    loaders: TypeLoaderCollection,
    options: DecodingOptions,
}

impl std::fmt::Debug for ContextOwned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextOwned")
            .field("namespaces", &self.namespaces)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for ContextOwned {
    fn default() -> Self {
        Self::new(Default::default(), Default::default(), Default::default())
    }
}

impl ContextOwned {
    /// Create a new owned context.
    pub fn new(
        namespaces: NamespaceMap,
        loaders: TypeLoaderCollection,
        options: DecodingOptions,
    ) -> Self {
        Self {
            namespaces,
            loaders,
            options,
        }
    }

    /// Create a new owned context with the core type loader.
    pub fn new_default(namespaces: NamespaceMap, options: DecodingOptions) -> Self {
        Self::new(namespaces, TypeLoaderCollection::new(), options)
    }

    /// Borrow a context for encoding or decoding.
    pub fn context(&self) -> Context<'_> {
        Context {
            namespaces: &self.namespaces,
            loaders: &self.loaders,
            options: self.options.clone(),
        }
    }

    /// The namespace map.
    pub fn namespaces(&self) -> &NamespaceMap {
        &self.namespaces
    }

    /// The namespace map, mutably.
    pub fn namespaces_mut(&mut self) -> &mut NamespaceMap {
        &mut self.namespaces
    }

    /// The decoding options.
    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// The decoding options, mutably.
    pub fn options_mut(&mut self) -> &mut DecodingOptions {
        &mut self.options
    }

    /// The type loaders, mutably.
    pub fn loaders_mut(&mut self) -> &mut TypeLoaderCollection {
        &mut self.loaders
    }
}

/// Borrowed encoding context: the namespace map, the registered type
/// loaders and the decoding options. Lifetime is typically tied to a
/// [`ContextOwned`].
#[derive(Clone)]
pub struct Context<'a> {
    namespaces: &'a NamespaceMap,
    loaders: &'a TypeLoaderCollection,
    options: DecodingOptions,
}

impl<'a> Context<'a> {
    /// Construct a context. Prefer [`ContextOwned`] unless you are juggling
    /// the parts yourself.
    pub fn new(
        namespaces: &'a NamespaceMap,
        loaders: &'a TypeLoaderCollection,
        options: DecodingOptions,
    ) -> Self {
        Self {
            namespaces,
            loaders,
            options,
        }
    }

    /// Decode a type dynamically from binary, trying each registered loader
    /// until one claims the id. An unknown id is a decoding error.
    pub fn load_from_binary(
        &self,
        node_id: &NodeId,
        stream: &mut dyn Read,
    ) -> EncodingResult<ExtensionObject> {
        for loader in self.loaders.iter() {
            if let Some(r) = loader.load_from_binary(node_id, stream, self) {
                return Ok(ExtensionObject { body: Some(r?) });
            }
        }
        Err(Error::decoding(format!(
            "No type loader defined for {node_id}"
        )))
    }

    /// The decoding options.
    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// The namespace map.
    pub fn namespaces(&self) -> &'a NamespaceMap {
        self.namespaces
    }
}
