// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The service fault, returned in place of a response when a service call
//! fails as a whole.

use std::io::{Read, Write};

use crate::{
    encoding::{BinaryDecodable, BinaryEncodable, EncodingResult},
    message_info::MessageInfo,
    node_ids::{DataTypeId, ObjectId},
    response_header::ResponseHeader,
    status_code::StatusCode,
};

/// A response carrying only a header, whose service result explains why the
/// request could not be served.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceFault {
    /// Common response parameters, including the failing status.
    pub response_header: ResponseHeader,
}

impl ServiceFault {
    /// Create a fault answering `request_handle` with `service_result`.
    pub fn new(request_handle: u32, service_result: StatusCode) -> ServiceFault {
        ServiceFault {
            response_header: ResponseHeader::new_service_result(request_handle, service_result),
        }
    }
}

impl MessageInfo for ServiceFault {
    fn type_id(&self) -> ObjectId {
        ObjectId::ServiceFault_Encoding_DefaultBinary
    }

    fn data_type_id(&self) -> DataTypeId {
        DataTypeId::ServiceFault
    }
}

impl BinaryEncodable for ServiceFault {
    fn byte_len(&self, ctx: &crate::Context<'_>) -> usize {
        self.response_header.byte_len(ctx)
    }

    fn encode<S: Write + ?Sized>(
        &self,
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<()> {
        self.response_header.encode(stream, ctx)
    }
}

impl BinaryDecodable for ServiceFault {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        ctx: &crate::Context<'_>,
    ) -> EncodingResult<Self> {
        Ok(ServiceFault {
            response_header: ResponseHeader::decode(stream, ctx)?,
        })
    }
}
