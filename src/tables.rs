// Static descriptions of message shapes. Every message type owns one
// `MessageLayout`; the codec and the reflection layer are driven by it.

use crate::wire::WireType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Varint,
    Fixed32,
    Fixed64,
}

impl ScalarType {
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarType::Varint => WireType::Varint,
            ScalarType::Fixed32 => WireType::Fixed32,
            ScalarType::Fixed64 => WireType::Fixed64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringType {
    /// `string`: must hold valid UTF-8.
    String,
    /// `bytes`: arbitrary octets.
    Bytes,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ScalarType),
    LengthDelimited(StringType),
    RepeatedScalar(ScalarType),
    RepeatedMessage(&'static MessageLayout),
}

impl FieldKind {
    /// Wire type this field is written with.
    pub const fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Scalar(ty) => ty.wire_type(),
            FieldKind::LengthDelimited(_)
            | FieldKind::RepeatedScalar(_)
            | FieldKind::RepeatedMessage(_) => WireType::LengthDelimited,
        }
    }

    pub const fn is_repeated(&self) -> bool {
        matches!(self, FieldKind::RepeatedScalar(_) | FieldKind::RepeatedMessage(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    pub number: u32,
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldLayout {
    pub const fn new(number: u32, name: &'static str, kind: FieldKind) -> Self {
        FieldLayout { number, name, kind }
    }
}

#[derive(Debug)]
pub struct MessageLayout {
    pub full_name: &'static str,
    /// Sorted by field number.
    pub fields: &'static [FieldLayout],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    InvalidNumber(u32),
    OutOfOrder(u32),
}

impl MessageLayout {
    /// Index of the field with `number`, if the layout has one.
    pub fn field_index(&self, number: u32) -> Option<usize> {
        // Layouts are tiny; a linear scan beats binary search here.
        self.fields.iter().position(|f| f.number == number)
    }

    pub fn field(&self, number: u32) -> Option<(usize, &'static FieldLayout)> {
        let fields: &'static [FieldLayout] = self.fields;
        fields.iter().enumerate().find(|(_, f)| f.number == number)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldLayout> {
        let fields: &'static [FieldLayout] = self.fields;
        fields.iter().find(|f| f.name == name)
    }

    /// Checks that field numbers are valid, unique and ascending.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let mut prev = 0;
        for field in self.fields {
            if field.number == 0 || field.number > crate::wire::field_number(u32::MAX) {
                return Err(LayoutError::InvalidNumber(field.number));
            }
            if field.number <= prev {
                return Err(LayoutError::OutOfOrder(field.number));
            }
            prev = field.number;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CHILD: MessageLayout = MessageLayout {
        full_name: "test.Child",
        fields: &[FieldLayout::new(1, "x", FieldKind::Scalar(ScalarType::Varint))],
    };

    static PARENT: MessageLayout = MessageLayout {
        full_name: "test.Parent",
        fields: &[
            FieldLayout::new(1, "name", FieldKind::LengthDelimited(StringType::String)),
            FieldLayout::new(4, "ids", FieldKind::RepeatedScalar(ScalarType::Fixed32)),
            FieldLayout::new(7, "children", FieldKind::RepeatedMessage(&CHILD)),
        ],
    };

    #[test]
    fn lookup() {
        assert_eq!(PARENT.field_index(4), Some(1));
        assert_eq!(PARENT.field_index(2), None);
        let (index, field) = PARENT.field(7).unwrap();
        assert_eq!(index, 2);
        assert_eq!(field.name, "children");
        match field.kind {
            FieldKind::RepeatedMessage(child) => assert_eq!(child.full_name, "test.Child"),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(PARENT.field_by_name("ids").map(|f| f.number), Some(4));
    }

    #[test]
    fn wire_types() {
        assert_eq!(PARENT.fields[0].kind.wire_type(), WireType::LengthDelimited);
        assert_eq!(CHILD.fields[0].kind.wire_type(), WireType::Varint);
        assert!(PARENT.fields[1].kind.is_repeated());
        assert!(!CHILD.fields[0].kind.is_repeated());
    }

    #[test]
    fn validation() {
        assert_eq!(PARENT.validate(), Ok(()));
        static BAD: MessageLayout = MessageLayout {
            full_name: "test.Bad",
            fields: &[
                FieldLayout::new(2, "a", FieldKind::Scalar(ScalarType::Varint)),
                FieldLayout::new(2, "b", FieldKind::Scalar(ScalarType::Varint)),
            ],
        };
        assert_eq!(BAD.validate(), Err(LayoutError::OutOfOrder(2)));
        static ZERO: MessageLayout = MessageLayout {
            full_name: "test.Zero",
            fields: &[FieldLayout::new(0, "a", FieldKind::Scalar(ScalarType::Varint))],
        };
        assert_eq!(ZERO.validate(), Err(LayoutError::InvalidNumber(0)));
    }
}
