//! SQL Server collation descriptor.
//!
//! Collations ride on COLMETADATA for (N)(VAR)CHAR columns and on the
//! session-level ENVCHANGE. The federation core needs three things from
//! them: the character encoding for VARCHAR payloads, the UTF-8 flag, and
//! case sensitivity (gating ILIKE pushdown).

use bytes::{Buf, BufMut};
use encoding_rs::Encoding;

use crate::error::WireError;

/// Bit 20 of the collation info word: case-insensitive comparison.
const FLAG_IGNORE_CASE: u32 = 0x0010_0000;

/// Bit 27 of the collation info word: UTF-8 storage (SQL Server 2019+).
const FLAG_UTF8: u32 = 0x0800_0000;

/// Lower 20 bits carry the LCID.
const LCID_MASK: u32 = 0x000F_FFFF;

/// A decoded 5-byte collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collation {
    /// Packed LCID + flag word.
    pub info: u32,
    /// Sort id (non-zero for legacy SQL sort orders).
    pub sort_id: u8,
}

impl Collation {
    /// Wire size of a collation block.
    pub const WIRE_LEN: usize = 5;

    /// Decode the 5-byte wire form.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < Self::WIRE_LEN {
            return Err(WireError::truncated(Self::WIRE_LEN, src.remaining()));
        }
        Ok(Self {
            info: src.get_u32_le(),
            sort_id: src.get_u8(),
        })
    }

    /// Encode the 5-byte wire form.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.info);
        dst.put_u8(self.sort_id);
    }

    /// Locale id portion of the info word.
    #[must_use]
    pub const fn lcid(&self) -> u32 {
        self.info & LCID_MASK
    }

    /// True for UTF-8 collations; their VARCHAR payloads need no transcoding.
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.info & FLAG_UTF8 != 0
    }

    /// True when string comparison under this collation folds case.
    #[must_use]
    pub const fn is_case_insensitive(&self) -> bool {
        self.info & FLAG_IGNORE_CASE != 0
    }

    /// Encoding for VARCHAR data under this collation.
    ///
    /// Returns `None` for UTF-8 collations (no transcoding needed).
    /// Unrecognized LCIDs fall back to Windows-1252, SQL Server's own
    /// default for Western locales.
    #[must_use]
    pub fn encoding(&self) -> Option<&'static Encoding> {
        if self.is_utf8() {
            return None;
        }
        Some(encoding_for_lcid(self.lcid()))
    }
}

/// Map an LCID's primary language to its Windows code page encoding.
///
/// Reference: MS-LCID and the Windows code page assignments. Only the
/// families SQL Server actually ships collations for are listed; everything
/// else uses the 1252 fallback.
fn encoding_for_lcid(lcid: u32) -> &'static Encoding {
    match lcid & 0xFFFF {
        // CJK and Thai single-family pages
        0x0411 => encoding_rs::SHIFT_JIS,
        0x0804 | 0x1004 => encoding_rs::GB18030,
        0x0404 | 0x0C04 | 0x1404 => encoding_rs::BIG5,
        0x0412 => encoding_rs::EUC_KR,
        0x041E => encoding_rs::WINDOWS_874,
        0x042A => encoding_rs::WINDOWS_1258,

        // Central European (1250)
        0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x041B | 0x0424 | 0x0418 | 0x041C => {
            encoding_rs::WINDOWS_1250
        }

        // Cyrillic (1251)
        0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x0444 | 0x0450 => {
            encoding_rs::WINDOWS_1251
        }

        0x0408 => encoding_rs::WINDOWS_1253,
        0x041F | 0x042C => encoding_rs::WINDOWS_1254,
        0x040D => encoding_rs::WINDOWS_1255,

        // Arabic script (1256)
        0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x0429 | 0x0420 => {
            encoding_rs::WINDOWS_1256
        }

        // Baltic (1257)
        0x0425..=0x0427 => encoding_rs::WINDOWS_1257,

        // Western European and everything unrecognized
        _ => encoding_rs::WINDOWS_1252,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let col = Collation {
            info: 0x0010_0409, // en-US, case-insensitive
            sort_id: 52,
        };
        let mut buf = bytes::BytesMut::new();
        col.encode(&mut buf);
        assert_eq!(buf.len(), Collation::WIRE_LEN);
        assert_eq!(Collation::decode(&mut buf.freeze()).unwrap(), col);
    }

    #[test]
    fn case_sensitivity_flag() {
        let ci = Collation {
            info: 0x0010_0409,
            sort_id: 0,
        };
        let cs = Collation {
            info: 0x0000_0409,
            sort_id: 0,
        };
        assert!(ci.is_case_insensitive());
        assert!(!cs.is_case_insensitive());
    }

    #[test]
    fn utf8_collations_skip_transcoding() {
        let utf8 = Collation {
            info: 0x0800_0409,
            sort_id: 0,
        };
        assert!(utf8.is_utf8());
        assert!(utf8.encoding().is_none());
    }

    #[test]
    fn lcid_encodings() {
        let jp = Collation {
            info: 0x0411,
            sort_id: 0,
        };
        assert_eq!(jp.encoding().unwrap().name(), "Shift_JIS");

        let ru = Collation {
            info: 0x0419,
            sort_id: 0,
        };
        assert_eq!(ru.encoding().unwrap().name(), "windows-1251");

        let unknown = Collation {
            info: 0x7777,
            sort_id: 0,
        };
        assert_eq!(unknown.encoding().unwrap().name(), "windows-1252");
    }
}
