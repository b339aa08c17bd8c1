//! Core message traits.
//!
//! - [`DynMessage`]: object-safe access to a message's fields by layout index,
//!   used by the codec and the reflection layer
//! - [`Message`]: typed entry points (allocation, parsing, serialization)
//!   provided for every concrete message type
//! - [`MessageArray`]: type-erased view of a repeated message field
//!
//! Concrete messages are plain structs with named fields. Their
//! [`DynMessage`] impl only maps each index of their
//! [`MessageLayout`](crate::tables::MessageLayout) to the matching field:
//!
//! ```ignore
//! fn field(&self, index: usize) -> FieldRef<'_, 'a> {
//!     match index {
//!         0 => FieldRef::String(self.content_type),
//!         1 => FieldRef::Bytes(self.data),
//!         2 => FieldRef::RepeatedMessage(&self.extensions),
//!         _ => unreachable!(),
//!     }
//! }
//! ```

use core::fmt::Debug;

use crate::arena::{AllocError, Arena};
use crate::containers::{RepeatedField, UnknownFields};
use crate::decoding::{self, DecodeError, DecodeOptions};
use crate::encoding::{self, EncodeError, EncodeOptions};
use crate::extension_registry::ExtensionRegistry;
use crate::tables::MessageLayout;

/// Read view of one field.
pub enum FieldRef<'m, 'a> {
    Scalar(u64),
    String(&'a str),
    Bytes(&'a [u8]),
    RepeatedScalar(&'m [u64]),
    RepeatedMessage(&'m dyn MessageArray<'a>),
}

/// Write access to one field.
pub enum FieldMut<'m, 'a> {
    Scalar(&'m mut u64),
    String(&'m mut &'a str),
    Bytes(&'m mut &'a [u8]),
    RepeatedScalar(&'m mut RepeatedField<'a, u64>),
    RepeatedMessage(&'m mut dyn MessageArray<'a>),
}

pub trait DynMessage<'a>: Debug {
    fn layout(&self) -> &'static MessageLayout;

    /// Field at `index` of [`layout`](Self::layout)`().fields`.
    fn field(&self, index: usize) -> FieldRef<'_, 'a>;

    fn field_mut(&mut self, index: usize) -> FieldMut<'_, 'a>;

    fn unknown_fields(&self) -> &UnknownFields<'a>;

    fn unknown_fields_mut(&mut self) -> &mut UnknownFields<'a>;
}

/// A repeated message field with its element type erased.
pub trait MessageArray<'a> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<&dyn DynMessage<'a>>;

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn DynMessage<'a>>;

    /// Appends a freshly allocated default element and returns it.
    /// Leaves the array unchanged on failure.
    fn push_default(&mut self, arena: &'a Arena) -> Result<&mut dyn DynMessage<'a>, AllocError>;

    /// Grows with default elements or shrinks to `new_len`.
    fn resize(&mut self, new_len: usize, arena: &'a Arena) -> Result<(), AllocError>;

    fn clear(&mut self);
}

impl<'a, M: Message<'a>> MessageArray<'a> for RepeatedField<'a, &'a mut M> {
    fn len(&self) -> usize {
        RepeatedField::len(self)
    }

    fn get(&self, index: usize) -> Option<&dyn DynMessage<'a>> {
        self.as_slice().get(index).map(|m| &**m as &dyn DynMessage<'a>)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn DynMessage<'a>> {
        self.as_mut_slice()
            .get_mut(index)
            .map(|m| &mut **m as &mut dyn DynMessage<'a>)
    }

    fn push_default(&mut self, arena: &'a Arena) -> Result<&mut dyn DynMessage<'a>, AllocError> {
        let child = M::new(arena)?;
        self.push(child, arena)?;
        match self.last_mut() {
            Some(child) => Ok(&mut **child),
            None => unreachable!("array is non-empty right after a push"),
        }
    }

    fn resize(&mut self, new_len: usize, arena: &'a Arena) -> Result<(), AllocError> {
        self.resize_with(new_len, arena, || M::new(arena))
    }

    fn clear(&mut self) {
        RepeatedField::clear(self)
    }
}

/// Typed entry points shared by every generated message type.
pub trait Message<'a>: DynMessage<'a> + Default + Sized + 'a {
    /// The layout every instance reports from [`DynMessage::layout`].
    fn layout_static() -> &'static MessageLayout;

    /// Allocates a default instance in `arena`.
    fn new(arena: &'a Arena) -> Result<&'a mut Self, AllocError> {
        arena.alloc(Self::default())
    }

    fn parse(buf: &[u8], arena: &'a Arena) -> Result<&'a mut Self, DecodeError> {
        Self::parse_ex(buf, None, DecodeOptions::default(), arena)
    }

    /// Copies `buf` into the arena and decodes from that copy, so the result
    /// does not borrow the caller's buffer.
    fn parse_ex(
        buf: &[u8],
        extreg: Option<&ExtensionRegistry<'_>>,
        options: DecodeOptions,
        arena: &'a Arena,
    ) -> Result<&'a mut Self, DecodeError> {
        let input: &'a [u8] = arena.alloc_slice_copy(buf)?;
        Self::parse_aliased(input, extreg, options, arena)
    }

    /// Decodes without copying: string, bytes and unknown fields of the
    /// result point straight into `buf`.
    fn parse_aliased(
        buf: &'a [u8],
        extreg: Option<&ExtensionRegistry<'_>>,
        options: DecodeOptions,
        arena: &'a Arena,
    ) -> Result<&'a mut Self, DecodeError> {
        let msg = Self::new(arena)?;
        decoding::decode(buf, msg, extreg, options, arena)?;
        Ok(msg)
    }

    fn serialize<'b>(&self, arena: &'b Arena) -> Result<&'b [u8], EncodeError> {
        self.serialize_ex(EncodeOptions::default(), arena)
    }

    fn serialize_ex<'b>(
        &self,
        options: EncodeOptions,
        arena: &'b Arena,
    ) -> Result<&'b [u8], EncodeError> {
        encoding::encode(self, options, arena)
    }
}
