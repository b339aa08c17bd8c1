// Recursive descent decoder. Every embedded message is decoded by a nested
// call bounded by its length prefix; no backtracking. Reads never go past the
// end of the enclosing message, so a successful pass consumes the input
// exactly.

use crate::arena::{AllocError, Arena};
use crate::base::{DynMessage, FieldMut};
use crate::extension_registry::ExtensionRegistry;
use crate::tables::{FieldKind, FieldLayout, ScalarType, StringType};
use crate::wire::{self, ReadError, WireType};

/// Nesting limit applied when the caller does not pick one.
pub const DEFAULT_DEPTH_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Maximum number of nested messages (and groups) below the top level.
    pub max_depth: u32,
    /// Drop unknown fields instead of keeping their raw bytes.
    pub discard_unknown: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            max_depth: DEFAULT_DEPTH_LIMIT,
            discard_unknown: false,
        }
    }
}

impl DecodeOptions {
    pub const fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub const fn with_discard_unknown(mut self, discard_unknown: bool) -> Self {
        self.discard_unknown = discard_unknown;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("input truncated at byte offset {offset}")]
    Truncated { offset: usize },
    #[error("malformed input at byte offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
    #[error("invalid UTF-8 in string field {field} at byte offset {offset}")]
    BadUtf8 { field: u32, offset: usize },
    #[error("message nesting exceeds the depth limit")]
    MaxDepthExceeded,
    #[error("arena allocation failed while decoding")]
    OutOfMemory,
}

impl From<AllocError> for DecodeError {
    fn from(_: AllocError) -> Self {
        DecodeError::OutOfMemory
    }
}

fn malformed(offset: usize, reason: &'static str) -> DecodeError {
    DecodeError::Malformed { offset, reason }
}

/// Decodes `buf` into `msg`. String, bytes and unknown fields alias `buf`.
///
/// On error `msg` may be partially populated; callers that expose messages
/// (see [`Message::parse`](crate::Message::parse)) decode into a fresh
/// instance and drop it on failure.
pub fn decode<'a>(
    buf: &'a [u8],
    msg: &mut dyn DynMessage<'a>,
    extreg: Option<&ExtensionRegistry<'_>>,
    options: DecodeOptions,
    arena: &'a Arena,
) -> Result<(), DecodeError> {
    let name = msg.layout().full_name;
    let decoder = Decoder {
        input: buf,
        arena,
        extreg,
        options,
    };
    decoder
        .decode_message(msg, 0, buf.len(), options.max_depth)
        .inspect_err(|err| tracing::debug!(msg_type = name, error = %err, "decode failed"))
}

struct Decoder<'a, 'r> {
    input: &'a [u8],
    arena: &'a Arena,
    extreg: Option<&'r ExtensionRegistry<'r>>,
    options: DecodeOptions,
}

impl<'a> Decoder<'a, '_> {
    fn decode_message(
        &self,
        msg: &mut dyn DynMessage<'a>,
        mut pos: usize,
        end: usize,
        depth: u32,
    ) -> Result<(), DecodeError> {
        let layout = msg.layout();
        while pos < end {
            let tag_start = pos;
            let (number, wire_type) = self.read_tag(&mut pos, end)?;
            tracing::trace!(
                msg_type = layout.full_name,
                field = number,
                wire_type = ?wire_type,
                "tag"
            );

            if let Some((index, field)) = layout.field(number) {
                if self.decode_known(msg, index, field, wire_type, &mut pos, end, depth)? {
                    continue;
                }
            }

            if wire_type == WireType::EndGroup {
                return Err(malformed(tag_start, "end group without start group"));
            }
            self.skip_field(number, wire_type, &mut pos, end, depth)?;

            match self.extreg.and_then(|reg| reg.find(layout, number)) {
                Some(ext) => tracing::trace!(
                    msg_type = layout.full_name,
                    extension = ext.field.name,
                    "registered extension kept as unknown field"
                ),
                None => tracing::trace!(msg_type = layout.full_name, field = number, "unknown field"),
            }
            if !self.options.discard_unknown {
                let span = self.slice(tag_start, pos);
                msg.unknown_fields_mut().push(span, self.arena)?;
            }
        }
        Ok(())
    }

    // Returns Ok(false) when the wire type does not fit the field, in which
    // case the field is treated as unknown.
    #[allow(clippy::too_many_arguments)]
    fn decode_known(
        &self,
        msg: &mut dyn DynMessage<'a>,
        index: usize,
        field: &FieldLayout,
        wire_type: WireType,
        pos: &mut usize,
        end: usize,
        depth: u32,
    ) -> Result<bool, DecodeError> {
        match (field.kind, msg.field_mut(index)) {
            (FieldKind::Scalar(ty), FieldMut::Scalar(slot)) => {
                if wire_type != ty.wire_type() {
                    return Ok(false);
                }
                *slot = self.read_scalar(ty, pos, end)?;
            }
            (FieldKind::LengthDelimited(StringType::String), FieldMut::String(slot)) => {
                if wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let payload_end = self.read_length(pos, end)?;
                let start = *pos;
                let bytes = self.slice(start, payload_end);
                *slot = core::str::from_utf8(bytes).map_err(|_| DecodeError::BadUtf8 {
                    field: field.number,
                    offset: start,
                })?;
                *pos = payload_end;
            }
            (FieldKind::LengthDelimited(StringType::Bytes), FieldMut::Bytes(slot)) => {
                if wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let payload_end = self.read_length(pos, end)?;
                *slot = self.slice(*pos, payload_end);
                *pos = payload_end;
            }
            (FieldKind::RepeatedScalar(ty), FieldMut::RepeatedScalar(values)) => {
                if wire_type == WireType::LengthDelimited {
                    // packed
                    let payload_end = self.read_length(pos, end)?;
                    while *pos < payload_end {
                        let value = self.read_scalar(ty, pos, payload_end)?;
                        values.push(value, self.arena)?;
                    }
                } else if wire_type == ty.wire_type() {
                    let value = self.read_scalar(ty, pos, end)?;
                    values.push(value, self.arena)?;
                } else {
                    return Ok(false);
                }
            }
            (FieldKind::RepeatedMessage(_), FieldMut::RepeatedMessage(array)) => {
                if wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let sub_end = self.read_length(pos, end)?;
                if depth == 0 {
                    return Err(DecodeError::MaxDepthExceeded);
                }
                let child = array.push_default(self.arena)?;
                self.decode_message(child, *pos, sub_end, depth - 1)?;
                *pos = sub_end;
            }
            (kind, _) => unreachable!("{}: storage does not match layout kind {kind:?}", field.name),
        }
        Ok(true)
    }

    fn skip_field(
        &self,
        number: u32,
        wire_type: WireType,
        pos: &mut usize,
        end: usize,
        depth: u32,
    ) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint(pos, end)?;
            }
            WireType::Fixed64 => {
                self.take(8, pos, end)?;
            }
            WireType::Fixed32 => {
                self.take(4, pos, end)?;
            }
            WireType::LengthDelimited => {
                *pos = self.read_length(pos, end)?;
            }
            WireType::StartGroup => {
                if depth == 0 {
                    return Err(DecodeError::MaxDepthExceeded);
                }
                loop {
                    if *pos >= end {
                        return Err(self.truncated(*pos, end, "group overruns enclosing message"));
                    }
                    let tag_start = *pos;
                    let (inner, inner_type) = self.read_tag(pos, end)?;
                    if inner_type == WireType::EndGroup {
                        if inner != number {
                            return Err(malformed(tag_start, "mismatched end group"));
                        }
                        break;
                    }
                    self.skip_field(inner, inner_type, pos, end, depth - 1)?;
                }
            }
            WireType::EndGroup => unreachable!("end group tags are handled by the caller"),
        }
        Ok(())
    }

    fn read_tag(&self, pos: &mut usize, end: usize) -> Result<(u32, WireType), DecodeError> {
        let tag_start = *pos;
        let tag = self.read_varint(pos, end)?;
        let tag = u32::try_from(tag).map_err(|_| malformed(tag_start, "tag exceeds 32 bits"))?;
        let number = wire::field_number(tag);
        if number == 0 {
            return Err(malformed(tag_start, "field number 0"));
        }
        let wire_type =
            WireType::from_tag(tag).ok_or_else(|| malformed(tag_start, "invalid wire type"))?;
        Ok((number, wire_type))
    }

    fn read_varint(&self, pos: &mut usize, end: usize) -> Result<u64, DecodeError> {
        match wire::read_varint(&self.input[*pos..end]) {
            Ok((value, len)) => {
                *pos += len;
                Ok(value)
            }
            Err(ReadError::Truncated) => {
                Err(self.truncated(end, end, "varint overruns enclosing message"))
            }
            Err(ReadError::Overlong) => Err(malformed(*pos, "varint longer than 10 bytes")),
        }
    }

    fn read_scalar(&self, ty: ScalarType, pos: &mut usize, end: usize) -> Result<u64, DecodeError> {
        match ty {
            ScalarType::Varint => self.read_varint(pos, end),
            ScalarType::Fixed32 => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(self.take(4, pos, end)?);
                Ok(u64::from(u32::from_le_bytes(bytes)))
            }
            ScalarType::Fixed64 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(8, pos, end)?);
                Ok(u64::from_le_bytes(bytes))
            }
        }
    }

    /// Reads a length prefix and returns the end offset of the payload, which
    /// starts at the updated `pos`.
    fn read_length(&self, pos: &mut usize, end: usize) -> Result<usize, DecodeError> {
        let len_start = *pos;
        let len = self.read_varint(pos, end)?;
        let remaining = end - *pos;
        match usize::try_from(len) {
            Ok(len) if len <= remaining => Ok(*pos + len),
            _ if end == self.input.len() => Err(DecodeError::Truncated { offset: end }),
            _ => Err(malformed(len_start, "length overruns enclosing message")),
        }
    }

    fn take(&self, n: usize, pos: &mut usize, end: usize) -> Result<&'a [u8], DecodeError> {
        if end - *pos < n {
            return Err(self.truncated(end, end, "fixed-width value overruns enclosing message"));
        }
        let bytes = self.slice(*pos, *pos + n);
        *pos += n;
        Ok(bytes)
    }

    fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        let input: &'a [u8] = self.input;
        &input[start..end]
    }

    // Running out of bytes is truncation at the top level and a framing
    // error inside an embedded message.
    fn truncated(&self, offset: usize, end: usize, reason: &'static str) -> DecodeError {
        if end == self.input.len() {
            DecodeError::Truncated { offset }
        } else {
            malformed(offset, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use crate::test_utils::Probe;
    use allocator_api2::alloc::Global;

    #[test]
    fn decodes_every_field_kind() {
        let arena = Arena::new(&Global);
        let buf: &[u8] = &[
            0x08, 0x96, 0x01, // id = 150
            0x15, 0x01, 0x00, 0x00, 0x80, // checksum = 0x80000001
            0x19, 1, 0, 0, 0, 0, 0, 0, 0, // offset = 1
            0x22, 0x02, b'h', b'i', // name = "hi"
            0x2A, 0x01, 0xFF, // blob = [0xFF]
            0x32, 0x03, 0x01, 0x02, 0x03, // samples = [1, 2, 3] packed
            0x30, 0x04, // samples += 4 unpacked
            0x3A, 0x02, 0x08, 0x07, // children[0].id = 7
        ];
        let probe = Probe::parse(buf, &arena).unwrap();
        assert_eq!(probe.id, 150);
        assert_eq!(probe.checksum, 0x8000_0001);
        assert_eq!(probe.offset, 1);
        assert_eq!(probe.name, "hi");
        assert_eq!(probe.blob, &[0xFF]);
        assert_eq!(&probe.samples[..], &[1, 2, 3, 4]);
        assert_eq!(probe.children.len(), 1);
        assert_eq!(probe.children[0].id, 7);
        assert!(probe.unknown.is_empty());
    }

    #[test]
    fn last_scalar_wins() {
        let arena = Arena::new(&Global);
        let probe = Probe::parse(&[0x08, 0x01, 0x08, 0x02], &arena).unwrap();
        assert_eq!(probe.id, 2);
    }

    #[test]
    fn unknown_fields_are_skipped_and_kept() {
        let arena = Arena::new(&Global);
        let buf: &[u8] = &[
            0x08, 0x05, // id = 5
            0x50, 0x01, // field 10 varint
            0x59, 0, 0, 0, 0, 0, 0, 0, 0, // field 11 fixed64
            0x62, 0x01, 0x00, // field 12 length delimited
            0x6B, 0x08, 0x01, 0x6C, // field 13 group containing a varint
            0x75, 1, 2, 3, 4, // field 14 fixed32
        ];
        let probe = Probe::parse(buf, &arena).unwrap();
        assert_eq!(probe.id, 5);
        assert_eq!(probe.unknown.len(), 5);
        assert_eq!(probe.unknown[3], &[0x6B, 0x08, 0x01, 0x6C]);

        let discarded =
            Probe::parse_ex(buf, None, DecodeOptions::default().with_discard_unknown(true), &arena)
                .unwrap();
        assert!(discarded.unknown.is_empty());
    }

    #[test]
    fn wire_type_mismatch_is_unknown() {
        let arena = Arena::new(&Global);
        // name (field 4) sent as a varint
        let probe = Probe::parse(&[0x20, 0x01], &arena).unwrap();
        assert_eq!(probe.name, "");
        assert_eq!(probe.unknown.len(), 1);
    }

    #[test]
    fn malformed_inputs() {
        let arena = Arena::new(&Global);
        let cases: &[(&[u8], DecodeError)] = &[
            (&[0x08], DecodeError::Truncated { offset: 1 }),
            (&[0x08, 0x80], DecodeError::Truncated { offset: 2 }),
            (&[0x22, 0x05, b'a'], DecodeError::Truncated { offset: 3 }),
            (&[0x15, 0x01, 0x02], DecodeError::Truncated { offset: 3 }),
            (&[0x00, 0x01], malformed(0, "field number 0")),
            (&[0x0E], malformed(0, "invalid wire type")),
            (&[0x0F], malformed(0, "invalid wire type")),
            (&[0x0C], malformed(0, "end group without start group")),
            (&[0x6B, 0x74], malformed(1, "mismatched end group")),
            (
                &[0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
                malformed(1, "varint longer than 10 bytes"),
            ),
            // the child's length prefix cuts its only field short
            (&[0x3A, 0x01, 0x22, 0x00], malformed(3, "varint overruns enclosing message")),
            (
                &[0x3A, 0x02, 0x22, 0x05, 0x00, 0x00, 0x00],
                malformed(3, "length overruns enclosing message"),
            ),
        ];
        for (buf, expected) in cases {
            assert_eq!(Probe::parse(buf, &arena).err(), Some(*expected), "input {buf:02x?}");
        }
    }

    #[test]
    fn group_without_end_is_truncated() {
        let arena = Arena::new(&Global);
        assert_eq!(
            Probe::parse(&[0x6B, 0x08, 0x01], &arena).err(),
            Some(DecodeError::Truncated { offset: 3 })
        );
    }

    #[test]
    fn string_fields_must_be_utf8() {
        let arena = Arena::new(&Global);
        assert_eq!(
            Probe::parse(&[0x22, 0x02, 0xC3, 0x28], &arena).err(),
            Some(DecodeError::BadUtf8 { field: 4, offset: 2 })
        );
        // bytes fields take anything
        assert!(Probe::parse(&[0x2A, 0x02, 0xC3, 0x28], &arena).is_ok());
    }

    #[test]
    fn depth_limit() {
        let arena = Arena::new(&Global);
        // three levels of children below the top level
        let buf: &[u8] = &[0x3A, 0x04, 0x3A, 0x02, 0x3A, 0x00];
        assert!(Probe::parse(buf, &arena).is_ok());
        let options = DecodeOptions::default().with_max_depth(2);
        assert_eq!(
            Probe::parse_ex(buf, None, options, &arena).err(),
            Some(DecodeError::MaxDepthExceeded)
        );
        let options = DecodeOptions::default().with_max_depth(3);
        assert!(Probe::parse_ex(buf, None, options, &arena).is_ok());
    }

    #[test]
    fn out_of_memory() {
        let arena = Arena::with_limit(&Global, 0);
        assert_eq!(Probe::parse(&[0x08, 0x01], &arena).err(), Some(DecodeError::OutOfMemory));
    }

    #[test]
    fn aliased_decode_points_into_input() {
        let arena = Arena::new(&Global);
        let buf = [0x22, 0x02, b'o', b'k'];
        let probe = Probe::parse_aliased(&buf, None, DecodeOptions::default(), &arena).unwrap();
        assert_eq!(probe.name.as_ptr(), buf[2..].as_ptr());
    }
}
