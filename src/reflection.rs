//! Runtime reflection for protobuf messages.
//!
//! Generic field accessors driven by a [`FieldLayout`] instead of a concrete
//! message type. They work on any [`DynMessage`], so tools can inspect and
//! edit messages whose type is only known at runtime.
//!
//! # Key Types
//!
//! - [`Value`]: any field value, as returned by [`get_field`]
//! - [`ArrayRef`] / [`ArrayMut`]: views of repeated fields
//! - [`DynamicMessageRef`]: `Debug` wrapper printing a message field by field
//!
//! # Example
//!
//! ```
//! use pbarena::arena::Arena;
//! use pbarena::google::api::{HttpBody, httpbody};
//! use pbarena::{Message, reflection};
//! use allocator_api2::alloc::Global;
//!
//! let arena = Arena::new(&Global);
//! let body = HttpBody::new(&arena).unwrap();
//! let content_type = httpbody::LAYOUT.field_by_name("content_type").unwrap();
//! reflection::set_string(body, content_type, "text/html").unwrap();
//! assert_eq!(body.content_type(), "text/html");
//! ```

use crate::arena::{AllocError, Arena};
use crate::base::{DynMessage, FieldMut, FieldRef, MessageArray};
use crate::containers::RepeatedField;
use crate::tables::FieldLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReflectionError {
    #[error("{message} has no field numbered {number}")]
    NoSuchField { message: &'static str, number: u32 },
    #[error("field {field} is not accessible as {expected}")]
    KindMismatch { field: &'static str, expected: &'static str },
    #[error("arena allocation failed")]
    OutOfMemory,
}

impl From<AllocError> for ReflectionError {
    fn from(_: AllocError) -> Self {
        ReflectionError::OutOfMemory
    }
}

fn index_of(msg: &dyn DynMessage<'_>, field: &FieldLayout) -> Result<usize, ReflectionError> {
    let layout = msg.layout();
    layout
        .field_index(field.number)
        .ok_or(ReflectionError::NoSuchField {
            message: layout.full_name,
            number: field.number,
        })
}

fn mismatch(field: &FieldLayout, expected: &'static str) -> ReflectionError {
    ReflectionError::KindMismatch {
        field: field.name,
        expected,
    }
}

/// The value of one field.
#[derive(Debug)]
pub enum Value<'m, 'a> {
    Scalar(u64),
    String(&'a str),
    Bytes(&'a [u8]),
    Repeated(ArrayRef<'m, 'a>),
}

/// Reads any field. Returns `None` for a field at its default (zero, empty,
/// no elements), which is how implicit presence reports "unset".
pub fn get_field<'m, 'a>(
    msg: &'m dyn DynMessage<'a>,
    field: &FieldLayout,
) -> Result<Option<Value<'m, 'a>>, ReflectionError> {
    let value = match msg.field(index_of(msg, field)?) {
        FieldRef::Scalar(0) => None,
        FieldRef::Scalar(v) => Some(Value::Scalar(v)),
        FieldRef::String(s) => (!s.is_empty()).then_some(Value::String(s)),
        FieldRef::Bytes(b) => (!b.is_empty()).then_some(Value::Bytes(b)),
        FieldRef::RepeatedScalar(values) => {
            (!values.is_empty()).then_some(Value::Repeated(ArrayRef::Scalars(values)))
        }
        FieldRef::RepeatedMessage(array) => {
            (!array.is_empty()).then_some(Value::Repeated(ArrayRef::Messages(array)))
        }
    };
    Ok(value)
}

/// Reads the stored value of a scalar field.
///
/// Layouts only describe implicit-presence fields: an unset field already
/// holds its zero value, so the stored value is returned as is. `_default`
/// would only apply to a field with explicit presence and an unset bit.
pub fn get_scalar(
    msg: &dyn DynMessage<'_>,
    field: &FieldLayout,
    _default: u64,
) -> Result<u64, ReflectionError> {
    match msg.field(index_of(msg, field)?) {
        FieldRef::Scalar(v) => Ok(v),
        _ => Err(mismatch(field, "scalar")),
    }
}

pub fn set_scalar(
    msg: &mut dyn DynMessage<'_>,
    field: &FieldLayout,
    value: u64,
) -> Result<(), ReflectionError> {
    match msg.field_mut(index_of(msg, field)?) {
        FieldMut::Scalar(slot) => {
            *slot = value;
            Ok(())
        }
        _ => Err(mismatch(field, "scalar")),
    }
}

/// Reads the stored view of a string field; see [`get_scalar`] for `_default`.
pub fn get_string<'a>(
    msg: &dyn DynMessage<'a>,
    field: &FieldLayout,
    _default: &'a str,
) -> Result<&'a str, ReflectionError> {
    match msg.field(index_of(msg, field)?) {
        FieldRef::String(s) => Ok(s),
        _ => Err(mismatch(field, "string")),
    }
}

/// Points the field at `value`. The string is not copied; use
/// [`Arena::alloc_str`] for values that do not outlive the message.
pub fn set_string<'a>(
    msg: &mut dyn DynMessage<'a>,
    field: &FieldLayout,
    value: &'a str,
) -> Result<(), ReflectionError> {
    match msg.field_mut(index_of(msg, field)?) {
        FieldMut::String(slot) => {
            *slot = value;
            Ok(())
        }
        _ => Err(mismatch(field, "string")),
    }
}

pub fn get_bytes<'a>(
    msg: &dyn DynMessage<'a>,
    field: &FieldLayout,
    _default: &'a [u8],
) -> Result<&'a [u8], ReflectionError> {
    match msg.field(index_of(msg, field)?) {
        FieldRef::Bytes(b) => Ok(b),
        _ => Err(mismatch(field, "bytes")),
    }
}

pub fn set_bytes<'a>(
    msg: &mut dyn DynMessage<'a>,
    field: &FieldLayout,
    value: &'a [u8],
) -> Result<(), ReflectionError> {
    match msg.field_mut(index_of(msg, field)?) {
        FieldMut::Bytes(slot) => {
            *slot = value;
            Ok(())
        }
        _ => Err(mismatch(field, "bytes")),
    }
}

/// Resets a field to its zero value. Repeated fields keep their capacity.
pub fn clear_field(msg: &mut dyn DynMessage<'_>, field: &FieldLayout) -> Result<(), ReflectionError> {
    match msg.field_mut(index_of(msg, field)?) {
        FieldMut::Scalar(slot) => *slot = 0,
        FieldMut::String(slot) => *slot = "",
        FieldMut::Bytes(slot) => *slot = &[],
        FieldMut::RepeatedScalar(values) => values.clear(),
        FieldMut::RepeatedMessage(array) => array.clear(),
    }
    Ok(())
}

/// Read view of a repeated field.
pub enum ArrayRef<'m, 'a> {
    Scalars(&'m [u64]),
    Messages(&'m dyn MessageArray<'a>),
}

impl ArrayRef<'_, '_> {
    pub fn len(&self) -> usize {
        match self {
            ArrayRef::Scalars(values) => values.len(),
            ArrayRef::Messages(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for ArrayRef<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArrayRef::Scalars(values) => values.fmt(f),
            ArrayRef::Messages(array) => {
                let array = *array;
                f.debug_list()
                    .entries((0..array.len()).filter_map(move |i| array.get(i)).map(DynamicMessageRef))
                    .finish()
            }
        }
    }
}

/// Write access to a repeated field.
pub enum ArrayMut<'m, 'a> {
    Scalars(&'m mut RepeatedField<'a, u64>),
    Messages(&'m mut dyn MessageArray<'a>),
}

impl ArrayMut<'_, '_> {
    pub fn len(&self) -> usize {
        match self {
            ArrayMut::Scalars(values) => values.len(),
            ArrayMut::Messages(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A repeated field that was never populated reports length 0.
pub fn get_array<'m, 'a>(
    msg: &'m dyn DynMessage<'a>,
    field: &FieldLayout,
) -> Result<ArrayRef<'m, 'a>, ReflectionError> {
    match msg.field(index_of(msg, field)?) {
        FieldRef::RepeatedScalar(values) => Ok(ArrayRef::Scalars(values)),
        FieldRef::RepeatedMessage(array) => Ok(ArrayRef::Messages(array)),
        _ => Err(mismatch(field, "repeated")),
    }
}

/// Backing storage is allocated lazily on first growth, so this never
/// allocates and returns the same array on every call.
pub fn get_or_create_mutable_array<'m, 'a>(
    msg: &'m mut dyn DynMessage<'a>,
    field: &FieldLayout,
) -> Result<ArrayMut<'m, 'a>, ReflectionError> {
    match msg.field_mut(index_of(msg, field)?) {
        FieldMut::RepeatedScalar(values) => Ok(ArrayMut::Scalars(values)),
        FieldMut::RepeatedMessage(array) => Ok(ArrayMut::Messages(array)),
        _ => Err(mismatch(field, "repeated")),
    }
}

/// Grows or shrinks a repeated field. New slots hold zero scalars or freshly
/// allocated default messages.
pub fn resize_array<'m, 'a>(
    msg: &'m mut dyn DynMessage<'a>,
    field: &FieldLayout,
    new_len: usize,
    arena: &'a Arena,
) -> Result<ArrayMut<'m, 'a>, ReflectionError> {
    match get_or_create_mutable_array(msg, field)? {
        ArrayMut::Scalars(values) => {
            values.resize_with(new_len, arena, || Ok(0))?;
            Ok(ArrayMut::Scalars(values))
        }
        ArrayMut::Messages(array) => {
            array.resize(new_len, arena)?;
            Ok(ArrayMut::Messages(array))
        }
    }
}

/// Appends a default sub-message to a repeated message field and returns it.
/// On failure the field is left as it was.
pub fn add_element<'m, 'a>(
    msg: &'m mut dyn DynMessage<'a>,
    field: &FieldLayout,
    arena: &'a Arena,
) -> Result<&'m mut dyn DynMessage<'a>, ReflectionError> {
    match get_or_create_mutable_array(msg, field)? {
        ArrayMut::Messages(array) => Ok(array.push_default(arena)?),
        ArrayMut::Scalars(_) => Err(mismatch(field, "repeated message")),
    }
}

/// Prints a message field by field, skipping fields at their default.
pub struct DynamicMessageRef<'m, 'a>(pub &'m dyn DynMessage<'a>);

impl core::fmt::Debug for DynamicMessageRef<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let layout = self.0.layout();
        let mut debug_struct = f.debug_struct(layout.full_name);
        for field in layout.fields {
            if let Ok(Some(value)) = get_field(self.0, field) {
                match value {
                    Value::Scalar(v) => debug_struct.field(field.name, &v),
                    Value::String(s) => debug_struct.field(field.name, &s),
                    Value::Bytes(b) => debug_struct.field(field.name, &b),
                    Value::Repeated(array) => debug_struct.field(field.name, &array),
                };
            }
        }
        let unknown = self.0.unknown_fields();
        if !unknown.is_empty() {
            debug_struct.field("unknown_fields", &unknown.len());
        }
        debug_struct.finish()
    }
}
