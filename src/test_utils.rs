//! Test utilities - available to downstream crates for testing.

use crate::arena::Arena;
use crate::base::{DynMessage, FieldMut, FieldRef, Message};
use crate::containers::{RepeatedField, UnknownFields};
use crate::tables::{FieldKind, FieldLayout, MessageLayout, ScalarType, StringType};

/// Assert that a message can be encoded and decoded without loss, and that
/// encoding the decoded copy reproduces the same bytes.
pub fn assert_roundtrip<'a, M: Message<'a> + PartialEq>(msg: &M, arena: &'a Arena) {
    let data = msg.serialize(arena).expect("msg should encode");
    let decoded = M::parse_aliased(data, None, Default::default(), arena).expect("msg should decode");

    println!("Encoded {} ({} bytes)", msg.layout().full_name, data.len());

    assert_eq!(&*decoded, msg);
    let roundtrip_data = decoded.serialize(arena).expect("msg should encode");
    assert_eq!(roundtrip_data, data);
}

/// Layout of [`Probe`], a message with one field of every kind.
pub static PROBE_LAYOUT: MessageLayout = MessageLayout {
    full_name: "pbarena.test.Probe",
    fields: &[
        FieldLayout::new(1, "id", FieldKind::Scalar(ScalarType::Varint)),
        FieldLayout::new(2, "checksum", FieldKind::Scalar(ScalarType::Fixed32)),
        FieldLayout::new(3, "offset", FieldKind::Scalar(ScalarType::Fixed64)),
        FieldLayout::new(4, "name", FieldKind::LengthDelimited(StringType::String)),
        FieldLayout::new(5, "blob", FieldKind::LengthDelimited(StringType::Bytes)),
        FieldLayout::new(6, "samples", FieldKind::RepeatedScalar(ScalarType::Varint)),
        FieldLayout::new(7, "children", FieldKind::RepeatedMessage(&PROBE_LAYOUT)),
    ],
};

#[derive(Debug, Default, PartialEq)]
pub struct Probe<'a> {
    pub id: u64,
    pub checksum: u64,
    pub offset: u64,
    pub name: &'a str,
    pub blob: &'a [u8],
    pub samples: RepeatedField<'a, u64>,
    pub children: RepeatedField<'a, &'a mut Probe<'a>>,
    pub unknown: UnknownFields<'a>,
}

impl<'a> DynMessage<'a> for Probe<'a> {
    fn layout(&self) -> &'static MessageLayout {
        &PROBE_LAYOUT
    }

    fn field(&self, index: usize) -> FieldRef<'_, 'a> {
        match index {
            0 => FieldRef::Scalar(self.id),
            1 => FieldRef::Scalar(self.checksum),
            2 => FieldRef::Scalar(self.offset),
            3 => FieldRef::String(self.name),
            4 => FieldRef::Bytes(self.blob),
            5 => FieldRef::RepeatedScalar(&self.samples),
            6 => FieldRef::RepeatedMessage(&self.children),
            _ => unreachable!("Probe has no field index {index}"),
        }
    }

    fn field_mut(&mut self, index: usize) -> FieldMut<'_, 'a> {
        match index {
            0 => FieldMut::Scalar(&mut self.id),
            1 => FieldMut::Scalar(&mut self.checksum),
            2 => FieldMut::Scalar(&mut self.offset),
            3 => FieldMut::String(&mut self.name),
            4 => FieldMut::Bytes(&mut self.blob),
            5 => FieldMut::RepeatedScalar(&mut self.samples),
            6 => FieldMut::RepeatedMessage(&mut self.children),
            _ => unreachable!("Probe has no field index {index}"),
        }
    }

    fn unknown_fields(&self) -> &UnknownFields<'a> {
        &self.unknown
    }

    fn unknown_fields_mut(&mut self) -> &mut UnknownFields<'a> {
        &mut self.unknown
    }
}

impl<'a> Message<'a> for Probe<'a> {
    fn layout_static() -> &'static MessageLayout {
        &PROBE_LAYOUT
    }
}
