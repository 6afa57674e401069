// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The [`Variant`] type, a tagged union over every built-in type.

use std::io::{Read, Write};

use crate::{
    array::Array,
    byte_string::ByteString,
    data_value::DataValue,
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::{
        read_i32, read_u8, write_i32, write_u8, BinaryDecodable, BinaryEncodable, EncodingResult,
        Error, UaNullable,
    },
    expanded_node_id::ExpandedNodeId,
    extension_object::ExtensionObject,
    guid::Guid,
    localized_text::LocalizedText,
    node_id::NodeId,
    qualified_name::QualifiedName,
    status_code::StatusCode,
    string::{UAString, XmlElement},
};

/// The set of built-in scalar types a variant can hold, with their numeric
/// encoding ids.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VariantScalarTypeId {
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    XmlElement = 16,
    NodeId = 17,
    ExpandedNodeId = 18,
    StatusCode = 19,
    QualifiedName = 20,
    LocalizedText = 21,
    ExtensionObject = 22,
    DataValue = 23,
    Variant = 24,
    DiagnosticInfo = 25,
}

impl TryFrom<u8> for VariantScalarTypeId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use VariantScalarTypeId::*;
        Ok(match value {
            1 => Boolean,
            2 => SByte,
            3 => Byte,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Float,
            11 => Double,
            12 => String,
            13 => DateTime,
            14 => Guid,
            15 => ByteString,
            16 => XmlElement,
            17 => NodeId,
            18 => ExpandedNodeId,
            19 => StatusCode,
            20 => QualifiedName,
            21 => LocalizedText,
            22 => ExtensionObject,
            23 => DataValue,
            24 => Variant,
            25 => DiagnosticInfo,
            _ => return Err(()),
        })
    }
}

/// The type held by a variant: nothing, a scalar, or an array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VariantTypeId {
    /// The variant is empty.
    Empty,
    /// A scalar value.
    Scalar(VariantScalarTypeId),
    /// An array of scalar values.
    Array(VariantScalarTypeId),
}

/// A value of any built-in type: nothing, one scalar, or an array with an
/// optional multi-dimensional shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// An empty variant. Maps to a null value on the wire.
    #[default]
    Empty,
    /// Boolean value.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// Signed 16 bit integer.
    Int16(i16),
    /// Unsigned 16 bit integer.
    UInt16(u16),
    /// Signed 32 bit integer.
    Int32(i32),
    /// Unsigned 32 bit integer.
    UInt32(u32),
    /// Signed 64 bit integer.
    Int64(i64),
    /// Unsigned 64 bit integer.
    UInt64(u64),
    /// IEEE-754 binary32. NaN and infinities round-trip bit-exactly.
    Float(f32),
    /// IEEE-754 binary64. NaN and infinities round-trip bit-exactly.
    Double(f64),
    /// String value.
    String(UAString),
    /// Timestamp.
    DateTime(Box<DateTime>),
    /// Guid.
    Guid(Box<Guid>),
    /// Byte string.
    ByteString(ByteString),
    /// XML element, carried as a string.
    XmlElement(XmlElement),
    /// Node id.
    NodeId(Box<NodeId>),
    /// Expanded node id.
    ExpandedNodeId(Box<ExpandedNodeId>),
    /// Status code.
    StatusCode(StatusCode),
    /// Qualified name.
    QualifiedName(Box<QualifiedName>),
    /// Localized text.
    LocalizedText(Box<LocalizedText>),
    /// Any structured value, wrapped in an extension object.
    ExtensionObject(ExtensionObject),
    /// A nested variant. Only legal as an array element.
    Variant(Box<Variant>),
    /// A data value.
    DataValue(Box<DataValue>),
    /// Diagnostic info.
    DiagnosticInfo(Box<DiagnosticInfo>),
    /// An array of values.
    Array(Box<Array>),
}

const ARRAY_DIMENSIONS_BIT: u8 = 1 << 6;
const ARRAY_VALUES_BIT: u8 = 1 << 7;

impl UaNullable for Variant {
    fn is_ua_null(&self) -> bool {
        self.is_empty()
    }
}

macro_rules! variant_from {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$t> for Variant {
                fn from(value: $t) -> Self {
                    Variant::$variant(value)
                }
            }
        )+
    };
}

macro_rules! variant_from_boxed {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$t> for Variant {
                fn from(value: $t) -> Self {
                    Variant::$variant(Box::new(value))
                }
            }
        )+
    };
}

variant_from! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    UAString => String,
    ByteString => ByteString,
    StatusCode => StatusCode,
    ExtensionObject => ExtensionObject,
}

variant_from_boxed! {
    DateTime => DateTime,
    Guid => Guid,
    NodeId => NodeId,
    ExpandedNodeId => ExpandedNodeId,
    QualifiedName => QualifiedName,
    LocalizedText => LocalizedText,
    DataValue => DataValue,
    DiagnosticInfo => DiagnosticInfo,
    Array => Array,
}

impl<'a> From<&'a str> for Variant {
    fn from(value: &'a str) -> Self {
        Variant::String(value.into())
    }
}

impl Variant {
    /// True for the empty variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// The type of this variant.
    pub fn type_id(&self) -> VariantTypeId {
        match self {
            Variant::Empty => VariantTypeId::Empty,
            Variant::Array(a) => VariantTypeId::Array(a.value_type),
            other => VariantTypeId::Scalar(
                other
                    .scalar_type_id()
                    .expect("scalar variant without scalar type"),
            ),
        }
    }

    /// The scalar type of this variant, `None` for empty and array values.
    pub fn scalar_type_id(&self) -> Option<VariantScalarTypeId> {
        type T = VariantScalarTypeId;
        Some(match self {
            Variant::Empty | Variant::Array(_) => return None,
            Variant::Boolean(_) => T::Boolean,
            Variant::SByte(_) => T::SByte,
            Variant::Byte(_) => T::Byte,
            Variant::Int16(_) => T::Int16,
            Variant::UInt16(_) => T::UInt16,
            Variant::Int32(_) => T::Int32,
            Variant::UInt32(_) => T::UInt32,
            Variant::Int64(_) => T::Int64,
            Variant::UInt64(_) => T::UInt64,
            Variant::Float(_) => T::Float,
            Variant::Double(_) => T::Double,
            Variant::String(_) => T::String,
            Variant::DateTime(_) => T::DateTime,
            Variant::Guid(_) => T::Guid,
            Variant::ByteString(_) => T::ByteString,
            Variant::XmlElement(_) => T::XmlElement,
            Variant::NodeId(_) => T::NodeId,
            Variant::ExpandedNodeId(_) => T::ExpandedNodeId,
            Variant::StatusCode(_) => T::StatusCode,
            Variant::QualifiedName(_) => T::QualifiedName,
            Variant::LocalizedText(_) => T::LocalizedText,
            Variant::ExtensionObject(_) => T::ExtensionObject,
            Variant::Variant(_) => T::Variant,
            Variant::DataValue(_) => T::DataValue,
            Variant::DiagnosticInfo(_) => T::DiagnosticInfo,
        })
    }

    fn encoding_mask(&self) -> u8 {
        match self {
            Variant::Empty => 0,
            Variant::Array(a) => {
                let mut mask = a.value_type as u8 | ARRAY_VALUES_BIT;
                if a.dimensions.is_some() {
                    mask |= ARRAY_DIMENSIONS_BIT;
                }
                mask
            }
            other => other.scalar_type_id().map(|t| t as u8).unwrap_or(0),
        }
    }

    /// The length in bytes of just the value, without the encoding mask or
    /// any array length prefix. Used by the descriptor driven codec where
    /// structure fields are encoded without the variant wrapper.
    pub fn value_byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        match self {
            Variant::Empty => 0,
            Variant::Boolean(_) | Variant::SByte(_) | Variant::Byte(_) => 1,
            Variant::Int16(_) | Variant::UInt16(_) => 2,
            Variant::Int32(_) | Variant::UInt32(_) | Variant::Float(_) => 4,
            Variant::Int64(_) | Variant::UInt64(_) | Variant::Double(_) => 8,
            Variant::String(v) => v.byte_len(ctx),
            Variant::DateTime(v) => v.byte_len(ctx),
            Variant::Guid(v) => v.byte_len(ctx),
            Variant::ByteString(v) => v.byte_len(ctx),
            Variant::XmlElement(v) => v.byte_len(ctx),
            Variant::NodeId(v) => v.byte_len(ctx),
            Variant::ExpandedNodeId(v) => v.byte_len(ctx),
            Variant::StatusCode(v) => v.byte_len(ctx),
            Variant::QualifiedName(v) => v.byte_len(ctx),
            Variant::LocalizedText(v) => v.byte_len(ctx),
            Variant::ExtensionObject(v) => v.byte_len(ctx),
            Variant::Variant(v) => v.byte_len(ctx),
            Variant::DataValue(v) => v.byte_len(ctx),
            Variant::DiagnosticInfo(v) => v.byte_len(ctx),
            Variant::Array(a) => {
                let mut size = 4;
                size += a
                    .values
                    .iter()
                    .map(|v| v.value_byte_len(ctx))
                    .sum::<usize>();
                if let Some(ref dims) = a.dimensions {
                    size += 4 + 4 * dims.len();
                }
                size
            }
        }
    }

    /// Encode just the value, without the encoding mask or array length
    /// prefix. The counterpart of [`Variant::value_byte_len`].
    pub fn encode_value<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        match self {
            Variant::Empty => Ok(()),
            Variant::Boolean(v) => v.encode(stream, ctx),
            Variant::SByte(v) => v.encode(stream, ctx),
            Variant::Byte(v) => v.encode(stream, ctx),
            Variant::Int16(v) => v.encode(stream, ctx),
            Variant::UInt16(v) => v.encode(stream, ctx),
            Variant::Int32(v) => v.encode(stream, ctx),
            Variant::UInt32(v) => v.encode(stream, ctx),
            Variant::Int64(v) => v.encode(stream, ctx),
            Variant::UInt64(v) => v.encode(stream, ctx),
            Variant::Float(v) => v.encode(stream, ctx),
            Variant::Double(v) => v.encode(stream, ctx),
            Variant::String(v) => v.encode(stream, ctx),
            Variant::DateTime(v) => v.encode(stream, ctx),
            Variant::Guid(v) => v.encode(stream, ctx),
            Variant::ByteString(v) => v.encode(stream, ctx),
            Variant::XmlElement(v) => v.encode(stream, ctx),
            Variant::NodeId(v) => v.encode(stream, ctx),
            Variant::ExpandedNodeId(v) => v.encode(stream, ctx),
            Variant::StatusCode(v) => v.encode(stream, ctx),
            Variant::QualifiedName(v) => v.encode(stream, ctx),
            Variant::LocalizedText(v) => v.encode(stream, ctx),
            Variant::ExtensionObject(v) => v.encode(stream, ctx),
            Variant::Variant(v) => v.encode(stream, ctx),
            Variant::DataValue(v) => v.encode(stream, ctx),
            Variant::DiagnosticInfo(v) => v.encode(stream, ctx),
            Variant::Array(a) => {
                write_i32(stream, a.values.len() as i32)?;
                for value in &a.values {
                    value.encode_value(stream, ctx)?;
                }
                if let Some(ref dims) = a.dimensions {
                    write_i32(stream, dims.len() as i32)?;
                    for dim in dims {
                        write_i32(stream, *dim as i32)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn decode_scalar_value<S: Read + ?Sized>(
        stream: &mut S,
        type_id: VariantScalarTypeId,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Variant> {
        type T = VariantScalarTypeId;
        Ok(match type_id {
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
            T::String => Variant::from(UAString::decode(stream, ctx)?),
            T::DateTime => Variant::from(DateTime::decode(stream, ctx)?),
            T::Guid => Variant::from(Guid::decode(stream, ctx)?),
            T::ByteString => Variant::from(ByteString::decode(stream, ctx)?),
            T::XmlElement => Variant::XmlElement(XmlElement::decode(stream, ctx)?),
            T::NodeId => Variant::from(NodeId::decode(stream, ctx)?),
            T::ExpandedNodeId => Variant::from(ExpandedNodeId::decode(stream, ctx)?),
            T::StatusCode => Variant::from(StatusCode::decode(stream, ctx)?),
            T::QualifiedName => Variant::from(QualifiedName::decode(stream, ctx)?),
            T::LocalizedText => Variant::from(LocalizedText::decode(stream, ctx)?),
            T::ExtensionObject => Variant::from(ExtensionObject::decode(stream, ctx)?),
            T::Variant => Variant::Variant(Box::new(Variant::decode(stream, ctx)?)),
            T::DataValue => Variant::from(DataValue::decode(stream, ctx)?),
            T::DiagnosticInfo => Variant::from(DiagnosticInfo::decode(stream, ctx)?),
        })
    }
}

impl BinaryEncodable for Variant {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        1 + self.value_byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        write_u8(stream, self.encoding_mask())?;
        self.encode_value(stream, ctx)
    }
}

impl BinaryDecodable for Variant {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        // Variants can contain variants, and array elements are decoded
        // recursively, so decoding is depth limited.
        let _depth_lock = ctx.options().depth_lock()?;
        let encoding_mask = read_u8(stream)?;
        if encoding_mask == 0 {
            return Ok(Variant::Empty);
        }
        let Ok(type_id) = VariantScalarTypeId::try_from(encoding_mask & 0x3f) else {
            return Err(Error::decoding(format!(
                "Unrecognized variant type id {}",
                encoding_mask & 0x3f
            )));
        };

        if encoding_mask & ARRAY_VALUES_BIT == 0 {
            return Self::decode_scalar_value(stream, type_id, ctx);
        }

        let len = read_i32(stream)?;
        if len == -1 {
            // A null array decodes to an empty variant
            return Ok(Variant::Empty);
        }
        if len < -1 {
            return Err(Error::decoding("Array length is negative and invalid"));
        }
        if len as usize > ctx.options().max_array_length {
            return Err(Error::decoding(format!(
                "Array length {} exceeds decoding limit {}",
                len,
                ctx.options().max_array_length
            )));
        }
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(Self::decode_scalar_value(stream, type_id, ctx)?);
        }
        let array = if encoding_mask & ARRAY_DIMENSIONS_BIT != 0 {
            let Some(dimensions) = <Option<Vec<i32>>>::decode(stream, ctx)? else {
                return Err(Error::decoding("Variant array dimensions are null"));
            };
            if dimensions.iter().any(|d| *d <= 0) {
                return Err(Error::decoding(
                    "Variant array dimensions must all be positive",
                ));
            }
            let dimensions: Vec<u32> = dimensions.into_iter().map(|d| d as u32).collect();
            Array::new_multi(type_id, values, dimensions).map_err(Error::decoding)?
        } else {
            Array::new(type_id, values).map_err(Error::decoding)?
        };
        Ok(Variant::Array(Box::new(array)))
    }
}
