//! TDS data type identifiers and their length disciplines.

use crate::error::WireError;

/// TDS type bytes as they appear in COLMETADATA and RPC parameter
/// definitions. Only the types the federation core decodes are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// NULL placeholder type.
    Null = 0x1F,
    /// 8-bit unsigned integer.
    Int1 = 0x30,
    /// Boolean bit.
    Bit = 0x32,
    /// 16-bit integer.
    Int2 = 0x34,
    /// 32-bit integer.
    Int4 = 0x38,
    /// 64-bit integer.
    Int8 = 0x7F,
    /// 32-bit float.
    Flt4 = 0x3B,
    /// 64-bit float.
    Flt8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// Legacy 8-byte datetime.
    DateTime = 0x3D,
    /// Legacy 4-byte smalldatetime.
    DateTime4 = 0x3A,

    /// Nullable integer, width in the length prefix.
    IntN = 0x26,
    /// Nullable bit.
    BitN = 0x68,
    /// Nullable float.
    FltN = 0x6D,
    /// Nullable money.
    MoneyN = 0x6E,
    /// Nullable legacy datetime.
    DateTimeN = 0x6F,
    /// Decimal with precision/scale metadata.
    DecimalN = 0x6A,
    /// Numeric with precision/scale metadata.
    NumericN = 0x6C,
    /// 16-byte GUID, mixed-endian on the wire.
    Guid = 0x24,

    /// 3-byte date.
    Date = 0x28,
    /// Time with metadata scale.
    Time = 0x29,
    /// DateTime2 with metadata scale.
    DateTime2 = 0x2A,
    /// DateTimeOffset with metadata scale.
    DateTimeOffset = 0x2B,

    /// Non-unicode variable character data.
    BigVarChar = 0xA7,
    /// Non-unicode fixed character data.
    BigChar = 0xAF,
    /// UTF-16 variable character data.
    NVarChar = 0xE7,
    /// UTF-16 fixed character data.
    NChar = 0xEF,
    /// Variable binary data.
    BigVarBinary = 0xA5,
    /// Fixed binary data.
    BigBinary = 0xAD,

    /// XML, always PLP.
    Xml = 0xF1,
}

/// How a value of a given type is length-delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    /// No prefix; width is fixed by the type.
    Fixed(usize),
    /// One-byte actual-length prefix (0 = NULL).
    ByteLen,
    /// Two-byte actual-length prefix (0xFFFF = NULL), or PLP when the
    /// metadata max length is the MAX sentinel.
    ShortLen,
    /// Always partially-length-prefixed.
    Plp,
}

/// COLMETADATA max-length sentinel for MAX-typed columns.
pub const MAX_SENTINEL: u16 = 0xFFFF;

impl TypeId {
    /// Decode a type byte.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0x1F => Self::Null,
            0x30 => Self::Int1,
            0x32 => Self::Bit,
            0x34 => Self::Int2,
            0x38 => Self::Int4,
            0x7F => Self::Int8,
            0x3B => Self::Flt4,
            0x3E => Self::Flt8,
            0x3C => Self::Money,
            0x7A => Self::Money4,
            0x3D => Self::DateTime,
            0x3A => Self::DateTime4,
            0x26 => Self::IntN,
            0x68 => Self::BitN,
            0x6D => Self::FltN,
            0x6E => Self::MoneyN,
            0x6F => Self::DateTimeN,
            0x6A => Self::DecimalN,
            0x6C => Self::NumericN,
            0x24 => Self::Guid,
            0x28 => Self::Date,
            0x29 => Self::Time,
            0x2A => Self::DateTime2,
            0x2B => Self::DateTimeOffset,
            0xA7 => Self::BigVarChar,
            0xAF => Self::BigChar,
            0xE7 => Self::NVarChar,
            0xEF => Self::NChar,
            0xA5 => Self::BigVarBinary,
            0xAD => Self::BigBinary,
            0xF1 => Self::Xml,
            other => return Err(WireError::UnknownType(other)),
        })
    }

    /// Length discipline for row values of this type.
    #[must_use]
    pub const fn length_kind(&self) -> LengthKind {
        match self {
            Self::Null => LengthKind::Fixed(0),
            Self::Int1 | Self::Bit => LengthKind::Fixed(1),
            Self::Int2 => LengthKind::Fixed(2),
            Self::Int4 | Self::Flt4 | Self::Money4 | Self::DateTime4 => LengthKind::Fixed(4),
            Self::Int8 | Self::Flt8 | Self::Money | Self::DateTime => LengthKind::Fixed(8),

            Self::IntN
            | Self::BitN
            | Self::FltN
            | Self::MoneyN
            | Self::DateTimeN
            | Self::DecimalN
            | Self::NumericN
            | Self::Guid
            | Self::Date
            | Self::Time
            | Self::DateTime2
            | Self::DateTimeOffset => LengthKind::ByteLen,

            Self::BigVarChar
            | Self::BigChar
            | Self::NVarChar
            | Self::NChar
            | Self::BigVarBinary
            | Self::BigBinary => LengthKind::ShortLen,

            Self::Xml => LengthKind::Plp,
        }
    }

    /// True for types whose metadata carries a collation block.
    #[must_use]
    pub const fn has_collation(&self) -> bool {
        matches!(
            self,
            Self::BigVarChar | Self::BigChar | Self::NVarChar | Self::NChar
        )
    }

    /// True for types whose metadata carries a scale byte.
    #[must_use]
    pub const fn has_scale(&self) -> bool {
        matches!(self, Self::Time | Self::DateTime2 | Self::DateTimeOffset)
    }

    /// True for UTF-16 encoded character types.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NVarChar | Self::NChar)
    }

    /// True when a ShortLen column with the MAX sentinel streams as PLP.
    #[must_use]
    pub const fn supports_plp(&self) -> bool {
        matches!(
            self,
            Self::BigVarChar | Self::NVarChar | Self::BigVarBinary | Self::Xml
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn type_bytes_roundtrip() {
        for id in [TypeId::Int4, TypeId::NVarChar, TypeId::Guid, TypeId::Xml] {
            assert_eq!(TypeId::from_u8(id as u8).unwrap(), id);
        }
        assert!(TypeId::from_u8(0x99).is_err());
    }

    #[test]
    fn length_disciplines() {
        assert_eq!(TypeId::Int8.length_kind(), LengthKind::Fixed(8));
        assert_eq!(TypeId::IntN.length_kind(), LengthKind::ByteLen);
        assert_eq!(TypeId::NVarChar.length_kind(), LengthKind::ShortLen);
        assert_eq!(TypeId::Xml.length_kind(), LengthKind::Plp);
    }

    #[test]
    fn collation_bearing_types() {
        assert!(TypeId::BigVarChar.has_collation());
        assert!(!TypeId::BigVarBinary.has_collation());
    }
}
