// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

use std::io::Cursor;

use super::{serialize_and_compare, serialize_test_expected};
use crate::{
    Array, BinaryDecodable, BinaryEncodable, ByteString, ContextOwned, DataValue, DateTime,
    DecodingOptions, ExpandedNodeId, ExtensionObject, Guid, LocalizedText, NodeId, QualifiedName,
    ReadRequest, ReadValueId, ServiceFault, StatusCode, TimestampsToReturn, TypeLoaderCollection,
    UAString, Variant, VariantScalarTypeId,
};

#[test]
fn encode_bool() {
    serialize_test_expected(&true, &[1]);
    serialize_test_expected(&false, &[0]);
}

#[test]
fn decode_bool_nonzero_is_true() {
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    let mut stream = Cursor::new(vec![0x7fu8]);
    assert!(bool::decode(&mut stream, &ctx).unwrap());
}

#[test]
fn encode_integers_little_endian() {
    serialize_test_expected(&0x0102_0304u32, &[0x04, 0x03, 0x02, 0x01]);
    serialize_test_expected(&-2i32, &[0xfe, 0xff, 0xff, 0xff]);
    serialize_test_expected(&0x0102_0304_0506_0708u64, &[8, 7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn float_special_values_bit_exact() {
    for v in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY, -0.0f32] {
        let ctx_owned = ContextOwned::default();
        let ctx = ctx_owned.context();
        let buf = v.encode_to_vec(&ctx);
        let decoded = f32::decode(&mut Cursor::new(&buf), &ctx).unwrap();
        assert_eq!(decoded.to_bits(), v.to_bits());
        // Encode once more, the bytes must be identical
        assert_eq!(decoded.encode_to_vec(&ctx), buf);
    }
    for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0f64] {
        let ctx_owned = ContextOwned::default();
        let ctx = ctx_owned.context();
        let buf = v.encode_to_vec(&ctx);
        let decoded = f64::decode(&mut Cursor::new(&buf), &ctx).unwrap();
        assert_eq!(decoded.to_bits(), v.to_bits());
        assert_eq!(decoded.encode_to_vec(&ctx), buf);
    }
}

#[test]
fn string_null_empty_and_value_are_distinct() {
    serialize_test_expected(&UAString::null(), &[0xff, 0xff, 0xff, 0xff]);
    serialize_test_expected(&UAString::from(""), &[0x00, 0x00, 0x00, 0x00]);
    serialize_test_expected(
        &UAString::from("ABC"),
        &[0x03, 0x00, 0x00, 0x00, b'A', b'B', b'C'],
    );

    serialize_and_compare(&UAString::null());
    serialize_and_compare(&UAString::from(""));
    serialize_and_compare(&UAString::from("水Boy"));
    assert_ne!(
        UAString::null().encode_to_vec(&ContextOwned::default().context()),
        UAString::from("").encode_to_vec(&ContextOwned::default().context())
    );
}

#[test]
fn string_length_limit() {
    let ctx_owned = ContextOwned::new_default(
        Default::default(),
        DecodingOptions {
            max_string_length: 2,
            ..Default::default()
        },
    );
    let ctx = ctx_owned.context();
    let buf = UAString::from("ABC").encode_to_vec(&ContextOwned::default().context());
    let err = UAString::decode(&mut Cursor::new(&buf), &ctx).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadDecodingError);
}

#[test]
fn byte_string_round_trip() {
    serialize_and_compare(&ByteString::null());
    serialize_and_compare(&ByteString::from(vec![]));
    serialize_and_compare(&ByteString::from(vec![1u8, 2, 3, 4]));
}

#[test]
fn truncated_buffer_fails() {
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    let buf = UAString::from("hello").encode_to_vec(&ctx);
    // Chop off the last byte, the length prefix now overruns the buffer
    let mut stream = Cursor::new(&buf[..buf.len() - 1]);
    assert!(UAString::decode(&mut stream, &ctx).is_err());
}

#[test]
fn guid_round_trip() {
    serialize_and_compare(&Guid::null());
    serialize_and_compare(&Guid::new());
}

#[test]
fn guid_wire_form() {
    use std::str::FromStr;
    let guid = Guid::from_str("72962B91-FA75-4AE6-8D28-B404DC7DAF63").unwrap();
    serialize_test_expected(
        &guid,
        &[
            0x91, 0x2b, 0x96, 0x72, 0x75, 0xfa, 0xe6, 0x4a, 0x8d, 0x28, 0xb4, 0x04, 0xdc, 0x7d,
            0xaf, 0x63,
        ],
    );
}

#[test]
fn date_time_round_trip() {
    serialize_and_compare(&DateTime::epoch());
    serialize_and_compare(&DateTime::now());
}

#[test]
fn node_id_picks_smallest_form() {
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    // Two byte form
    assert_eq!(NodeId::new(0, 255u32).byte_len(&ctx), 2);
    serialize_test_expected(&NodeId::new(0, 72u32), &[0x00, 0x48]);
    // Four byte form
    assert_eq!(NodeId::new(0, 256u32).byte_len(&ctx), 4);
    assert_eq!(NodeId::new(5, 1025u32).byte_len(&ctx), 4);
    serialize_test_expected(&NodeId::new(5, 1025u32), &[0x01, 0x05, 0x01, 0x04]);
    // Full numeric form
    assert_eq!(NodeId::new(256, 1u32).byte_len(&ctx), 7);
    assert_eq!(NodeId::new(0, 65536u32).byte_len(&ctx), 7);

    for id in [
        NodeId::new(0, 0u32),
        NodeId::new(0, 255u32),
        NodeId::new(2, 65535u32),
        NodeId::new(511, 1u32),
        NodeId::new(1, "hello"),
        NodeId::new(1, Guid::new()),
        NodeId::new(30, ByteString::from(vec![1u8, 2, 3])),
    ] {
        serialize_and_compare(&id);
    }
}

#[test]
fn expanded_node_id_flags() {
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();

    let plain = ExpandedNodeId::new(NodeId::new(0, 5u32));
    serialize_and_compare(&plain);

    let with_uri = ExpandedNodeId {
        node_id: NodeId::new(0, 5u32),
        namespace_uri: "urn:some:namespace".into(),
        server_index: 0,
    };
    let buf = with_uri.encode_to_vec(&ctx);
    assert_eq!(buf[0] & 0x80, 0x80);
    serialize_and_compare(&with_uri);

    let with_server = ExpandedNodeId {
        node_id: NodeId::new(0, 5u32),
        namespace_uri: UAString::null(),
        server_index: 3,
    };
    let buf = with_server.encode_to_vec(&ctx);
    assert_eq!(buf[0] & 0x40, 0x40);
    serialize_and_compare(&with_server);
}

#[test]
fn qualified_name_and_localized_text() {
    serialize_and_compare(&QualifiedName::new(2, "Browse"));
    serialize_and_compare(&LocalizedText::new("en", "Hello"));
    serialize_and_compare(&LocalizedText::from("no locale"));
    serialize_and_compare(&LocalizedText::null());
}

#[test]
fn variant_scalars_round_trip() {
    for v in [
        Variant::Empty,
        Variant::from(true),
        Variant::from(-5i8),
        Variant::from(250u8),
        Variant::from(-1000i16),
        Variant::from(33000u16),
        Variant::from(-5i32),
        Variant::from(77u32),
        Variant::from(-5_000_000_000i64),
        Variant::from(5_000_000_000u64),
        Variant::from(1.5f32),
        Variant::from(1.5e300f64),
        Variant::from(UAString::from("variant")),
        Variant::from(DateTime::now()),
        Variant::from(Guid::new()),
        Variant::from(ByteString::from(vec![9u8, 8, 7])),
        Variant::from(NodeId::new(4, "id")),
        Variant::from(ExpandedNodeId::new(NodeId::new(0, 88u32))),
        Variant::from(StatusCode::BadTimeout),
        Variant::from(QualifiedName::new(0, "qn")),
        Variant::from(LocalizedText::new("en", "text")),
    ] {
        serialize_and_compare(&v);
    }
}

#[test]
fn variant_array_round_trip() {
    let array = Array::new(
        VariantScalarTypeId::Int32,
        vec![Variant::from(1i32), Variant::from(2i32), Variant::from(3i32)],
    )
    .unwrap();
    serialize_and_compare(&Variant::from(array));
}

#[test]
fn variant_multi_dimensional_array() {
    let values: Vec<Variant> = (0..6).map(|v| Variant::from(v as i32)).collect();
    let array = Array::new_multi(VariantScalarTypeId::Int32, values, vec![2u32, 3u32]).unwrap();
    let variant = Variant::from(array);
    serialize_and_compare(&variant);

    // The dimension product must match the value count
    let values: Vec<Variant> = (0..6).map(|v| Variant::from(v as i32)).collect();
    assert!(Array::new_multi(VariantScalarTypeId::Int32, values, vec![2u32, 2u32]).is_err());
}

#[test]
fn variant_array_type_mismatch() {
    let err = Array::new(
        VariantScalarTypeId::Int32,
        vec![Variant::from(1i32), Variant::from("two")],
    );
    assert!(err.is_err());
}

#[test]
fn variant_nesting_depth_is_limited() {
    let mut v = Variant::from(1i32);
    for _ in 0..100 {
        let array = Array::new(VariantScalarTypeId::Variant, vec![Variant::Variant(Box::new(v))])
            .unwrap();
        v = Variant::from(array);
    }
    let ctx_owned = ContextOwned::default();
    let ctx = ctx_owned.context();
    let buf = v.encode_to_vec(&ctx);
    assert!(Variant::decode(&mut Cursor::new(&buf), &ctx).is_err());
}

#[test]
fn data_value_round_trip() {
    serialize_and_compare(&DataValue::default());
    serialize_and_compare(&DataValue::new_now(42i32));
    serialize_and_compare(&DataValue {
        value: Some(Variant::from("partial")),
        status: Some(StatusCode::Uncertain),
        source_timestamp: Some(DateTime::now()),
        source_picoseconds: Some(100),
        ..Default::default()
    });
}

#[test]
fn extension_object_round_trip() {
    let fault = ServiceFault::new(99, StatusCode::BadTooManyOperations);
    let obj = ExtensionObject::new(fault);
    serialize_and_compare(&obj);
    serialize_and_compare(&ExtensionObject::null());
}

#[test]
fn extension_object_unknown_encoding_id_is_strict() {
    let ctx_owned = ContextOwned::new(
        Default::default(),
        TypeLoaderCollection::new_empty(),
        Default::default(),
    );
    let ctx = ctx_owned.context();
    let obj = ExtensionObject::new(ServiceFault::new(1, StatusCode::Good));
    let buf = obj.encode_to_vec(&ContextOwned::default().context());
    let err = ExtensionObject::decode(&mut Cursor::new(&buf), &ctx).unwrap_err();
    assert_eq!(err.status(), StatusCode::BadDecodingError);
}

#[test]
fn service_message_round_trip() {
    let request = ReadRequest {
        request_header: crate::RequestHeader::new(NodeId::null(), DateTime::now(), 1001),
        max_age: 0.0,
        timestamps_to_return: TimestampsToReturn::Both,
        nodes_to_read: Some(vec![ReadValueId {
            node_id: NodeId::new(2, "Demo.Static"),
            attribute_id: 13,
            ..Default::default()
        }]),
    };
    serialize_and_compare(&request);
}
