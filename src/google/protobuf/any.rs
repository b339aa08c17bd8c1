//! `google.protobuf.Any`: an arbitrary serialized message with a URL naming
//! its type.

use crate::arena::Arena;
use crate::base::{DynMessage, FieldMut, FieldRef, Message};
use crate::containers::{RepeatedField, UnknownFields};
use crate::decoding::{DecodeError, DecodeOptions};
use crate::encoding::{self, EncodeError, EncodeOptions};
use crate::tables::{FieldKind, FieldLayout, MessageLayout, StringType};

/// Prefix used by [`Any::pack_from`].
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

pub static LAYOUT: MessageLayout = MessageLayout {
    full_name: "google.protobuf.Any",
    fields: &[
        FieldLayout::new(1, "type_url", FieldKind::LengthDelimited(StringType::String)),
        FieldLayout::new(2, "value", FieldKind::LengthDelimited(StringType::Bytes)),
    ],
};

#[derive(Debug, Default)]
pub struct Any<'a> {
    type_url: &'a str,
    value: &'a [u8],
    unknown: UnknownFields<'a>,
}

impl<'a> Any<'a> {
    pub fn type_url(&self) -> &'a str {
        self.type_url
    }

    pub fn set_type_url(&mut self, type_url: &'a str) {
        self.type_url = type_url;
    }

    pub fn clear_type_url(&mut self) {
        self.type_url = "";
    }

    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    pub fn set_value(&mut self, value: &'a [u8]) {
        self.value = value;
    }

    pub fn clear_value(&mut self) {
        self.value = &[];
    }

    /// Full name of the packed message type: everything after the last `/`
    /// of the type URL. `None` if the URL has no `/`.
    pub fn type_name(&self) -> Option<&'a str> {
        self.type_url.rsplit_once('/').map(|(_, name)| name)
    }

    /// Serializes `msg` into `value` and points `type_url` at its type.
    pub fn pack_from(&mut self, msg: &dyn DynMessage<'_>, arena: &'a Arena) -> Result<(), EncodeError> {
        let value = encoding::encode(msg, EncodeOptions::default(), arena)?;
        let full_name = msg.layout().full_name;
        let mut url = RepeatedField::<u8>::new();
        url.reserve(TYPE_URL_PREFIX.len() + full_name.len(), arena)?;
        url.extend_from_slice(TYPE_URL_PREFIX.as_bytes(), arena)?;
        url.extend_from_slice(full_name.as_bytes(), arena)?;
        // Safety: the concatenation of two str is valid UTF-8.
        self.type_url = unsafe { core::str::from_utf8_unchecked(url.into_slice()) };
        self.value = value;
        Ok(())
    }

    /// Decodes `value` as `M`. Returns `Ok(None)` if the type URL names a
    /// different message type.
    pub fn unpack<M: Message<'a>>(&self, arena: &'a Arena) -> Result<Option<&'a mut M>, DecodeError> {
        if self.type_name() != Some(M::layout_static().full_name) {
            return Ok(None);
        }
        M::parse_aliased(self.value, None, DecodeOptions::default(), arena).map(Some)
    }
}

impl PartialEq for Any<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.type_url == other.type_url && self.value == other.value
    }
}

impl<'a> DynMessage<'a> for Any<'a> {
    fn layout(&self) -> &'static MessageLayout {
        &LAYOUT
    }

    fn field(&self, index: usize) -> FieldRef<'_, 'a> {
        match index {
            0 => FieldRef::String(self.type_url),
            1 => FieldRef::Bytes(self.value),
            _ => unreachable!("google.protobuf.Any has no field index {index}"),
        }
    }

    fn field_mut(&mut self, index: usize) -> FieldMut<'_, 'a> {
        match index {
            0 => FieldMut::String(&mut self.type_url),
            1 => FieldMut::Bytes(&mut self.value),
            _ => unreachable!("google.protobuf.Any has no field index {index}"),
        }
    }

    fn unknown_fields(&self) -> &UnknownFields<'a> {
        &self.unknown
    }

    fn unknown_fields_mut(&mut self) -> &mut UnknownFields<'a> {
        &mut self.unknown
    }
}

impl<'a> Message<'a> for Any<'a> {
    fn layout_static() -> &'static MessageLayout {
        &LAYOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::api::HttpBody;
    use crate::test_utils::assert_roundtrip;
    use allocator_api2::alloc::Global;

    #[test]
    fn layout_is_valid() {
        assert_eq!(LAYOUT.validate(), Ok(()));
        assert!(core::ptr::eq(Any::layout_static(), Any::default().layout()));
    }

    #[test]
    fn accessors() {
        let arena = Arena::new(&Global);
        let any = Any::new(&arena).unwrap();
        assert_eq!(any.type_url(), "");
        assert_eq!(any.type_name(), None);
        any.set_type_url("type.googleapis.com/google.rpc.ErrorInfo");
        any.set_value(b"\x0A\x01x");
        assert_eq!(any.type_name(), Some("google.rpc.ErrorInfo"));
        assert_eq!(any.value(), b"\x0A\x01x");
        assert_roundtrip(&*any, &arena);
        any.clear_type_url();
        any.clear_value();
        any.clear_value();
        assert_eq!(any.type_url(), "");
        assert!(any.value().is_empty());
    }

    #[test]
    fn pack_and_unpack() {
        let arena = Arena::new(&Global);
        let body = HttpBody::new(&arena).unwrap();
        body.set_content_type("application/json");
        body.set_data(b"{}");

        let any = Any::new(&arena).unwrap();
        any.pack_from(body, &arena).unwrap();
        assert_eq!(any.type_url(), "type.googleapis.com/google.api.HttpBody");

        let unpacked = any.unpack::<HttpBody>(&arena).unwrap().unwrap();
        assert_eq!(unpacked, body);
        assert!(any.unpack::<Any>(&arena).unwrap().is_none());
    }
}
