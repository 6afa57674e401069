// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The Read service messages. Included to exercise the symmetric message
//! path end to end, the service itself is handled outside this stack.

use std::io::{Read, Write};

use crate::{
    data_value::DataValue,
    diagnostic_info::DiagnosticInfo,
    encoding::{byte_len_array, BinaryDecodable, BinaryEncodable, EncodingResult},
    message_info::MessageInfo,
    node_id::NodeId,
    node_ids::{DataTypeId, ObjectId},
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    string::UAString,
};

use super::enums::TimestampsToReturn;

/// Identifies one attribute of one node to read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadValueId {
    /// The node to read.
    pub node_id: NodeId,
    /// The attribute to read, 13 is Value.
    pub attribute_id: u32,
    /// Range within an array valued attribute.
    pub index_range: UAString,
    /// Requested data encoding of the value.
    pub data_encoding: QualifiedName,
}

impl BinaryEncodable for ReadValueId {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.node_id.byte_len(ctx)
            + 4
            + self.index_range.byte_len(ctx)
            + self.data_encoding.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.node_id.encode(stream, ctx)?;
        self.attribute_id.encode(stream, ctx)?;
        self.index_range.encode(stream, ctx)?;
        self.data_encoding.encode(stream, ctx)
    }
}

impl BinaryDecodable for ReadValueId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ReadValueId {
            node_id: NodeId::decode(stream, ctx)?,
            attribute_id: u32::decode(stream, ctx)?,
            index_range: UAString::decode(stream, ctx)?,
            data_encoding: QualifiedName::decode(stream, ctx)?,
        })
    }
}

/// Reads attribute values from one or more nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    /// Common request parameters.
    pub request_header: RequestHeader,
    /// Oldest acceptable cached value, in milliseconds.
    pub max_age: f64,
    /// Which timestamps to return.
    pub timestamps_to_return: TimestampsToReturn,
    /// The attributes to read.
    pub nodes_to_read: Option<Vec<ReadValueId>>,
}

impl MessageInfo for ReadRequest {
    fn type_id(&self) -> ObjectId {
        ObjectId::ReadRequest_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::ReadRequest
    }
}

impl BinaryEncodable for ReadRequest {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.request_header.byte_len(ctx)
            + 8
            + self.timestamps_to_return.byte_len(ctx)
            + byte_len_array(&self.nodes_to_read, ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.request_header.encode(stream, ctx)?;
        self.max_age.encode(stream, ctx)?;
        self.timestamps_to_return.encode(stream, ctx)?;
        self.nodes_to_read.encode(stream, ctx)
    }
}

impl BinaryDecodable for ReadRequest {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ReadRequest {
            request_header: RequestHeader::decode(stream, ctx)?,
            max_age: f64::decode(stream, ctx)?,
            timestamps_to_return: TimestampsToReturn::decode(stream, ctx)?,
            nodes_to_read: BinaryDecodable::decode(stream, ctx)?,
        })
    }
}

/// Response to a [`ReadRequest`], one result per requested attribute in
/// request order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResponse {
    /// Common response parameters.
    pub response_header: ResponseHeader,
    /// The values read.
    pub results: Option<Vec<DataValue>>,
    /// Diagnostics per operation, when requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

impl MessageInfo for ReadResponse {
    fn type_id(&self) -> ObjectId {
        ObjectId::ReadResponse_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::ReadResponse
    }
}

impl BinaryEncodable for ReadResponse {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
            + byte_len_array(&self.results, ctx)
            + byte_len_array(&self.diagnostic_infos, ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)?;
        self.results.encode(stream, ctx)?;
        self.diagnostic_infos.encode(stream, ctx)
    }
}

impl BinaryDecodable for ReadResponse {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ReadResponse {
            response_header: ResponseHeader::decode(stream, ctx)?,
            results: BinaryDecodable::decode(stream, ctx)?,
            diagnostic_infos: BinaryDecodable::decode(stream, ctx)?,
        })
    }
}
