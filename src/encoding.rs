// Encoder that writes back to front. Walking fields (and repeated elements) in
// reverse order means every length-delimited payload is complete by the time
// its length prefix is written, so no sizing pass is needed. The bytes are
// collected reversed in arena memory and flipped once at the end.

use crate::arena::{AllocError, Arena};
use crate::base::{DynMessage, FieldRef};
use crate::containers::RepeatedField;
use crate::decoding::DEFAULT_DEPTH_LIMIT;
use crate::tables::{FieldKind, ScalarType};
use crate::wire::{self, MAX_VARINT_LEN, WireType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Leave unknown fields out of the output.
    pub skip_unknown: bool,
    /// Maximum number of nested messages below the top level.
    pub max_depth: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            skip_unknown: false,
            max_depth: DEFAULT_DEPTH_LIMIT,
        }
    }
}

impl EncodeOptions {
    pub const fn with_skip_unknown(mut self, skip_unknown: bool) -> Self {
        self.skip_unknown = skip_unknown;
        self
    }

    pub const fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("message nesting exceeds the depth limit")]
    MaxDepthExceeded,
    #[error("arena allocation failed while encoding")]
    OutOfMemory,
}

impl From<AllocError> for EncodeError {
    fn from(_: AllocError) -> Self {
        EncodeError::OutOfMemory
    }
}

/// Serializes `msg` into memory owned by `arena`.
///
/// Known fields come out in ascending field-number order with zero scalars and
/// empty strings, bytes and repeated fields omitted. Repeated scalars are
/// packed. Unknown fields follow the known ones in the order they were read.
pub fn encode<'b>(
    msg: &dyn DynMessage<'_>,
    options: EncodeOptions,
    arena: &'b Arena,
) -> Result<&'b [u8], EncodeError> {
    let mut encoder = Encoder {
        buf: RepeatedField::new(),
        arena,
        options,
    };
    if let Err(err) = encoder.encode_message(msg, options.max_depth) {
        tracing::debug!(msg_type = msg.layout().full_name, error = %err, "encode failed");
        return Err(err);
    }
    let out = encoder.buf.into_slice();
    out.reverse();
    tracing::trace!(msg_type = msg.layout().full_name, len = out.len(), "encoded");
    Ok(out)
}

struct Encoder<'b> {
    // Output so far, last byte first.
    buf: RepeatedField<'b, u8>,
    arena: &'b Arena,
    options: EncodeOptions,
}

impl Encoder<'_> {
    fn encode_message(&mut self, msg: &dyn DynMessage<'_>, depth: u32) -> Result<(), EncodeError> {
        if !self.options.skip_unknown {
            for span in msg.unknown_fields().iter().rev() {
                self.put(span)?;
            }
        }

        let layout = msg.layout();
        for (index, field) in layout.fields.iter().enumerate().rev() {
            match (field.kind, msg.field(index)) {
                (FieldKind::Scalar(ty), FieldRef::Scalar(value)) => {
                    if value != 0 {
                        self.put_scalar(ty, value)?;
                        self.put_tag(field.number, ty.wire_type())?;
                    }
                }
                (FieldKind::LengthDelimited(_), FieldRef::String(s)) => {
                    self.put_bytes_field(field.number, s.as_bytes())?;
                }
                (FieldKind::LengthDelimited(_), FieldRef::Bytes(bytes)) => {
                    self.put_bytes_field(field.number, bytes)?;
                }
                (FieldKind::RepeatedScalar(ty), FieldRef::RepeatedScalar(values)) => {
                    if !values.is_empty() {
                        let start = self.buf.len();
                        for &value in values.iter().rev() {
                            self.put_scalar(ty, value)?;
                        }
                        self.put_varint((self.buf.len() - start) as u64)?;
                        self.put_tag(field.number, WireType::LengthDelimited)?;
                    }
                }
                (FieldKind::RepeatedMessage(_), FieldRef::RepeatedMessage(array)) => {
                    if array.is_empty() {
                        continue;
                    }
                    if depth == 0 {
                        return Err(EncodeError::MaxDepthExceeded);
                    }
                    for i in (0..array.len()).rev() {
                        let Some(child) = array.get(i) else { continue };
                        let start = self.buf.len();
                        self.encode_message(child, depth - 1)?;
                        self.put_varint((self.buf.len() - start) as u64)?;
                        self.put_tag(field.number, WireType::LengthDelimited)?;
                    }
                }
                (kind, _) => {
                    unreachable!("{}: storage does not match layout kind {kind:?}", field.name)
                }
            }
        }
        Ok(())
    }

    fn put_bytes_field(&mut self, number: u32, bytes: &[u8]) -> Result<(), AllocError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.put(bytes)?;
        self.put_varint(bytes.len() as u64)?;
        self.put_tag(number, WireType::LengthDelimited)
    }

    fn put_scalar(&mut self, ty: ScalarType, value: u64) -> Result<(), AllocError> {
        match ty {
            ScalarType::Varint => self.put_varint(value),
            ScalarType::Fixed32 => self.put(&(value as u32).to_le_bytes()),
            ScalarType::Fixed64 => self.put(&value.to_le_bytes()),
        }
    }

    fn put_tag(&mut self, number: u32, wire_type: WireType) -> Result<(), AllocError> {
        self.put_varint(u64::from(wire::make_tag(number, wire_type)))
    }

    fn put_varint(&mut self, value: u64) -> Result<(), AllocError> {
        let mut scratch = [0u8; MAX_VARINT_LEN];
        let len = wire::write_varint(value, &mut scratch);
        self.put(&scratch[..len])
    }

    // Appends `bytes` so that they read in order once the buffer is flipped.
    fn put(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        self.buf.reserve(bytes.len(), self.arena)?;
        for &byte in bytes.iter().rev() {
            self.buf.push(byte, self.arena)?;
        }
        Ok(())
    }
}
