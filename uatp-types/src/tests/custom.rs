// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

use std::io::Cursor;
use std::sync::Arc;

use crate::{
    custom::{DataTypeTree, DynamicStructure, DynamicTypeLoader},
    BinaryDecodable, BinaryEncodable, ContextOwned, ExtensionObject, NodeId,
    StructureDefinition, StructureField, StructureType, UAString, Variant,
};

fn make_tree() -> (Arc<DataTypeTree>, ContextOwned) {
    let mut tree = DataTypeTree::new();

    // A plain structure { byte_value: Byte, str_value: String }
    tree.add_type(
        "Plain",
        NodeId::new(1, 100u32),
        false,
        &StructureDefinition {
            default_encoding_id: NodeId::new(1, 101u32),
            base_data_type: NodeId::new(0, 22u32),
            structure_type: StructureType::Structure,
            fields: Some(vec![
                StructureField {
                    name: "ByteValue".into(),
                    data_type: NodeId::new(0, 3u32),
                    value_rank: -1,
                    ..Default::default()
                },
                StructureField {
                    name: "StrValue".into(),
                    data_type: NodeId::new(0, 12u32),
                    value_rank: -1,
                    ..Default::default()
                },
                StructureField {
                    name: "Values".into(),
                    data_type: NodeId::new(0, 6u32),
                    value_rank: 1,
                    ..Default::default()
                },
            ]),
        },
    )
    .unwrap();

    // A structure with optional fields { a: Int32, b?: Int32 }
    tree.add_type(
        "WithOptionals",
        NodeId::new(1, 200u32),
        false,
        &StructureDefinition {
            default_encoding_id: NodeId::new(1, 201u32),
            base_data_type: NodeId::new(0, 22u32),
            structure_type: StructureType::StructureWithOptionalFields,
            fields: Some(vec![
                StructureField {
                    name: "A".into(),
                    data_type: NodeId::new(0, 6u32),
                    value_rank: -1,
                    ..Default::default()
                },
                StructureField {
                    name: "B".into(),
                    data_type: NodeId::new(0, 6u32),
                    value_rank: -1,
                    is_optional: true,
                    ..Default::default()
                },
            ]),
        },
    )
    .unwrap();

    // A union { Num: Int32 | Text: String }
    tree.add_type(
        "NumOrText",
        NodeId::new(1, 300u32),
        false,
        &StructureDefinition {
            default_encoding_id: NodeId::new(1, 301u32),
            base_data_type: NodeId::new(0, 22u32),
            structure_type: StructureType::Union,
            fields: Some(vec![
                StructureField {
                    name: "Num".into(),
                    data_type: NodeId::new(0, 6u32),
                    value_rank: -1,
                    ..Default::default()
                },
                StructureField {
                    name: "Text".into(),
                    data_type: NodeId::new(0, 12u32),
                    value_rank: -1,
                    ..Default::default()
                },
            ]),
        },
    )
    .unwrap();

    let tree = Arc::new(tree);
    let mut ctx = ContextOwned::default();
    ctx.loaders_mut()
        .add_type_loader(DynamicTypeLoader::new(tree.clone()));
    (tree, ctx)
}

fn round_trip(obj: &ExtensionObject, ctx: &ContextOwned) -> ExtensionObject {
    let ctx = ctx.context();
    let buf = obj.encode_to_vec(&ctx);
    assert_eq!(buf.len(), obj.byte_len(&ctx));
    let decoded = ExtensionObject::decode(&mut Cursor::new(&buf), &ctx).unwrap();
    assert_eq!(&decoded, obj);
    decoded
}

#[test]
fn dynamic_struct_round_trip() {
    let (tree, ctx) = make_tree();
    let ty = tree.get_struct_type(&NodeId::new(1, 100u32)).unwrap().clone();
    let value = DynamicStructure::new_struct(
        ty,
        tree.clone(),
        vec![
            Variant::from(12u8),
            Variant::from(UAString::from("hello")),
            Variant::from(
                crate::Array::new(
                    crate::VariantScalarTypeId::Int32,
                    vec![Variant::from(1i32), Variant::from(2i32)],
                )
                .unwrap(),
            ),
        ],
    )
    .unwrap();
    let decoded = round_trip(&ExtensionObject::new(value), &ctx);
    let inner = decoded.inner_as::<DynamicStructure>().unwrap();
    assert_eq!(
        inner.get_field_by_name("StrValue"),
        Some(&Variant::from(UAString::from("hello")))
    );
}

#[test]
fn dynamic_struct_field_count_is_validated() {
    let (tree, _ctx) = make_tree();
    let ty = tree.get_struct_type(&NodeId::new(1, 100u32)).unwrap().clone();
    assert!(
        DynamicStructure::new_struct(ty, tree.clone(), vec![Variant::from(12u8)]).is_err()
    );
}

#[test]
fn optional_fields_absent_and_present() {
    let (tree, ctx) = make_tree();
    let ty = tree.get_struct_type(&NodeId::new(1, 200u32)).unwrap().clone();

    // Optional field absent: not on the wire at all
    let without = DynamicStructure::new_struct(
        ty.clone(),
        tree.clone(),
        vec![Variant::from(7i32), Variant::Empty],
    )
    .unwrap();
    let with = DynamicStructure::new_struct(
        ty,
        tree.clone(),
        vec![Variant::from(7i32), Variant::from(8i32)],
    )
    .unwrap();

    let ctx_ref = ctx.context();
    let len_without = ExtensionObject::new(without.clone()).byte_len(&ctx_ref);
    let len_with = ExtensionObject::new(with.clone()).byte_len(&ctx_ref);
    assert_eq!(len_with, len_without + 4);

    let decoded = round_trip(&ExtensionObject::new(without), &ctx);
    let inner = decoded.inner_as::<DynamicStructure>().unwrap();
    assert_eq!(inner.get_field_by_name("B"), Some(&Variant::Empty));
    round_trip(&ExtensionObject::new(with), &ctx);
}

#[test]
fn union_discriminant_selects_field() {
    let (tree, ctx) = make_tree();
    let ty = tree.get_struct_type(&NodeId::new(1, 300u32)).unwrap().clone();

    let num = DynamicStructure::new_union(ty.clone(), tree.clone(), Variant::from(5i32), 1).unwrap();
    let text = DynamicStructure::new_union(
        ty.clone(),
        tree.clone(),
        Variant::from(UAString::from("txt")),
        2,
    )
    .unwrap();
    let null = DynamicStructure::new_null_union(ty.clone(), tree.clone());

    round_trip(&ExtensionObject::new(num), &ctx);
    round_trip(&ExtensionObject::new(text), &ctx);
    round_trip(&ExtensionObject::new(null), &ctx);

    // Discriminant zero is reserved for the empty union
    assert!(DynamicStructure::new_union(ty, tree.clone(), Variant::from(5i32), 0).is_err());
}

#[test]
fn union_wrong_field_type_is_rejected() {
    let (tree, _ctx) = make_tree();
    let ty = tree.get_struct_type(&NodeId::new(1, 300u32)).unwrap().clone();
    assert!(
        DynamicStructure::new_union(ty, tree.clone(), Variant::from(1.0f64), 1).is_err()
    );
}
