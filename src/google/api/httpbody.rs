//! `google.api.HttpBody`: an arbitrary HTTP body carried in a protobuf
//! message, for methods that do not use JSON or protobuf payloads.
//!
//! ```text
//! message HttpBody {
//!   string content_type = 1;
//!   bytes data = 2;
//!   repeated google.protobuf.Any extensions = 3;
//! }
//! ```

use crate::arena::{AllocError, Arena};
use crate::base::{DynMessage, FieldMut, FieldRef, Message};
use crate::containers::{RepeatedField, UnknownFields};
use crate::google::protobuf::{Any, any};
use crate::tables::{FieldKind, FieldLayout, MessageLayout, StringType};

pub static LAYOUT: MessageLayout = MessageLayout {
    full_name: "google.api.HttpBody",
    fields: &[
        FieldLayout::new(1, "content_type", FieldKind::LengthDelimited(StringType::String)),
        FieldLayout::new(2, "data", FieldKind::LengthDelimited(StringType::Bytes)),
        FieldLayout::new(3, "extensions", FieldKind::RepeatedMessage(&any::LAYOUT)),
    ],
};

#[derive(Debug, Default)]
pub struct HttpBody<'a> {
    content_type: &'a str,
    data: &'a [u8],
    extensions: RepeatedField<'a, &'a mut Any<'a>>,
    unknown: UnknownFields<'a>,
}

impl<'a> HttpBody<'a> {
    /// The HTTP Content-Type header value of the body.
    pub fn content_type(&self) -> &'a str {
        self.content_type
    }

    pub fn set_content_type(&mut self, content_type: &'a str) {
        self.content_type = content_type;
    }

    pub fn clear_content_type(&mut self) {
        self.content_type = "";
    }

    /// The raw body.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn set_data(&mut self, data: &'a [u8]) {
        self.data = data;
    }

    pub fn clear_data(&mut self) {
        self.data = &[];
    }

    /// Application specific response metadata.
    pub fn extensions(&self) -> &[&'a mut Any<'a>] {
        &self.extensions
    }

    pub fn has_extensions(&self) -> bool {
        !self.extensions.is_empty()
    }

    pub fn clear_extensions(&mut self) {
        self.extensions.clear();
    }

    /// Mutable view of the existing elements.
    pub fn mutable_extensions(&mut self) -> &mut [&'a mut Any<'a>] {
        &mut self.extensions
    }

    /// The repeated field itself, for pushing or truncating.
    pub fn extensions_mut(&mut self) -> &mut RepeatedField<'a, &'a mut Any<'a>> {
        &mut self.extensions
    }

    /// Grows with default `Any` messages or shrinks to `len` elements.
    pub fn resize_extensions(
        &mut self,
        len: usize,
        arena: &'a Arena,
    ) -> Result<&mut [&'a mut Any<'a>], AllocError> {
        self.extensions.resize_with(len, arena, || Any::new(arena))?;
        Ok(self.extensions.as_mut_slice())
    }

    /// Appends a default `Any` and returns it for the caller to fill in.
    /// Leaves the field unchanged on failure.
    pub fn add_extensions(&mut self, arena: &'a Arena) -> Result<&mut Any<'a>, AllocError> {
        let any = Any::new(arena)?;
        self.extensions.push(any, arena)?;
        match self.extensions.last_mut() {
            Some(any) => Ok(&mut **any),
            None => unreachable!("extensions is non-empty right after a push"),
        }
    }
}

// Unknown fields do not take part in equality.
impl PartialEq for HttpBody<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.content_type == other.content_type
            && self.data == other.data
            && self.extensions == other.extensions
    }
}

impl<'a> DynMessage<'a> for HttpBody<'a> {
    fn layout(&self) -> &'static MessageLayout {
        &LAYOUT
    }

    fn field(&self, index: usize) -> FieldRef<'_, 'a> {
        match index {
            0 => FieldRef::String(self.content_type),
            1 => FieldRef::Bytes(self.data),
            2 => FieldRef::RepeatedMessage(&self.extensions),
            _ => unreachable!("google.api.HttpBody has no field index {index}"),
        }
    }

    fn field_mut(&mut self, index: usize) -> FieldMut<'_, 'a> {
        match index {
            0 => FieldMut::String(&mut self.content_type),
            1 => FieldMut::Bytes(&mut self.data),
            2 => FieldMut::RepeatedMessage(&mut self.extensions),
            _ => unreachable!("google.api.HttpBody has no field index {index}"),
        }
    }

    fn unknown_fields(&self) -> &UnknownFields<'a> {
        &self.unknown
    }

    fn unknown_fields_mut(&mut self) -> &mut UnknownFields<'a> {
        &mut self.unknown
    }
}

impl<'a> Message<'a> for HttpBody<'a> {
    fn layout_static() -> &'static MessageLayout {
        &LAYOUT
    }
}
