//! Row and column value decoding.
//!
//! Decoders take the column descriptors from COLMETADATA and walk the raw
//! ROW/NBCROW bytes. Short input surfaces as [`ValueError::Truncated`] so
//! the streaming result reader can pull the next packet and retry the row.

use bytes::{Buf, Bytes, BytesMut};
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
use rust_decimal::Decimal;
use tds_wire::token::{ColMetaData, ColumnDesc};
use tds_wire::types::{LengthKind, MAX_SENTINEL, TypeId};

use crate::error::ValueError;
use crate::value::SqlValue;

/// PLP total-length marker: NULL value.
const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// PLP total-length marker: unknown length, read chunks to the terminator.
const PLP_UNKNOWN: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// USHORT length marker: NULL value.
const CHARBIN_NULL: usize = 0xFFFF;

/// Decode a full ROW body (values for every column in order).
pub fn decode_row(meta: &ColMetaData, buf: &mut impl Buf) -> Result<Vec<SqlValue>, ValueError> {
    let mut values = Vec::with_capacity(meta.columns.len());
    for col in &meta.columns {
        values.push(decode_column(buf, col)?);
    }
    Ok(values)
}

/// Decode an NBCROW body: null bitmap, then values for non-null columns.
pub fn decode_nbc_row(meta: &ColMetaData, buf: &mut impl Buf) -> Result<Vec<SqlValue>, ValueError> {
    let bitmap_len = meta.null_bitmap_len();
    if buf.remaining() < bitmap_len {
        return Err(ValueError::truncated(bitmap_len, buf.remaining()));
    }
    let bitmap = buf.copy_to_bytes(bitmap_len);

    let mut values = Vec::with_capacity(meta.columns.len());
    for (i, col) in meta.columns.iter().enumerate() {
        let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
        if is_null {
            values.push(SqlValue::Null);
        } else {
            values.push(decode_column(buf, col)?);
        }
    }
    Ok(values)
}

/// Decode one column value according to its descriptor.
pub fn decode_column(buf: &mut impl Buf, col: &ColumnDesc) -> Result<SqlValue, ValueError> {
    match col.type_id.length_kind() {
        LengthKind::Fixed(len) => decode_fixed(buf, col.type_id, len),
        LengthKind::ByteLen => decode_byte_len(buf, col),
        LengthKind::ShortLen => {
            if col.max_length == u32::from(MAX_SENTINEL) && col.type_id.supports_plp() {
                decode_plp(buf, col)
            } else {
                decode_short_len(buf, col)
            }
        }
        LengthKind::Plp => decode_plp(buf, col),
    }
}

fn need(buf: &impl Buf, needed: usize) -> Result<(), ValueError> {
    if buf.remaining() < needed {
        return Err(ValueError::truncated(needed, buf.remaining()));
    }
    Ok(())
}

fn decode_fixed(buf: &mut impl Buf, type_id: TypeId, len: usize) -> Result<SqlValue, ValueError> {
    need(buf, len)?;
    Ok(match type_id {
        TypeId::Null => SqlValue::Null,
        TypeId::Int1 => SqlValue::TinyInt(buf.get_u8()),
        TypeId::Bit => SqlValue::Bool(buf.get_u8() != 0),
        TypeId::Int2 => SqlValue::SmallInt(buf.get_i16_le()),
        TypeId::Int4 => SqlValue::Int(buf.get_i32_le()),
        TypeId::Int8 => SqlValue::BigInt(buf.get_i64_le()),
        TypeId::Flt4 => SqlValue::Float(buf.get_f32_le()),
        TypeId::Flt8 => SqlValue::Double(buf.get_f64_le()),
        TypeId::Money4 => money_from_scaled(i64::from(buf.get_i32_le())),
        TypeId::Money => {
            let high = buf.get_i32_le();
            let low = buf.get_u32_le();
            money_from_scaled((i64::from(high) << 32) | i64::from(low))
        }
        TypeId::DateTime => decode_legacy_datetime(buf)?,
        TypeId::DateTime4 => decode_small_datetime(buf)?,
        other => return Err(ValueError::Unsupported(other as u8)),
    })
}

fn decode_byte_len(buf: &mut impl Buf, col: &ColumnDesc) -> Result<SqlValue, ValueError> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(SqlValue::Null);
    }
    need(buf, len)?;

    match col.type_id {
        TypeId::IntN => Ok(match len {
            1 => SqlValue::TinyInt(buf.get_u8()),
            2 => SqlValue::SmallInt(buf.get_i16_le()),
            4 => SqlValue::Int(buf.get_i32_le()),
            8 => SqlValue::BigInt(buf.get_i64_le()),
            other => {
                return Err(ValueError::InvalidLength {
                    type_name: "INTN",
                    len: other,
                });
            }
        }),
        TypeId::BitN => match len {
            1 => Ok(SqlValue::Bool(buf.get_u8() != 0)),
            other => Err(ValueError::InvalidLength {
                type_name: "BITN",
                len: other,
            }),
        },
        TypeId::FltN => Ok(match len {
            4 => SqlValue::Float(buf.get_f32_le()),
            8 => SqlValue::Double(buf.get_f64_le()),
            other => {
                return Err(ValueError::InvalidLength {
                    type_name: "FLTN",
                    len: other,
                });
            }
        }),
        TypeId::MoneyN => Ok(match len {
            4 => money_from_scaled(i64::from(buf.get_i32_le())),
            8 => {
                let high = buf.get_i32_le();
                let low = buf.get_u32_le();
                money_from_scaled((i64::from(high) << 32) | i64::from(low))
            }
            other => {
                return Err(ValueError::InvalidLength {
                    type_name: "MONEYN",
                    len: other,
                });
            }
        }),
        TypeId::DateTimeN => match len {
            4 => decode_small_datetime(buf),
            8 => decode_legacy_datetime(buf),
            other => Err(ValueError::InvalidLength {
                type_name: "DATETIMN",
                len: other,
            }),
        },
        TypeId::Guid => decode_guid(buf, len),
        TypeId::DecimalN | TypeId::NumericN => decode_decimal(buf, len, col.scale.unwrap_or(0)),
        TypeId::Date => decode_date(buf, len),
        TypeId::Time => decode_time(buf, len, col.scale.unwrap_or(7)).map(SqlValue::Time),
        TypeId::DateTime2 => decode_datetime2(buf, len, col.scale.unwrap_or(7)),
        TypeId::DateTimeOffset => decode_datetimeoffset(buf, len, col.scale.unwrap_or(7)),
        other => Err(ValueError::Unsupported(other as u8)),
    }
}

fn decode_short_len(buf: &mut impl Buf, col: &ColumnDesc) -> Result<SqlValue, ValueError> {
    need(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    if len == CHARBIN_NULL {
        return Ok(SqlValue::Null);
    }
    need(buf, len)?;
    let data = buf.copy_to_bytes(len);
    bytes_to_value(col, data)
}

/// Decode a partially-length-prefixed value: u64 total (or the unknown
/// marker), then chunks each with a u32 length, terminated by a
/// zero-length chunk.
fn decode_plp(buf: &mut impl Buf, col: &ColumnDesc) -> Result<SqlValue, ValueError> {
    need(buf, 8)?;
    let total = buf.get_u64_le();
    if total == PLP_NULL {
        return Ok(SqlValue::Null);
    }

    // The known-length case still uses the chunked format; the total is
    // only a hint for pre-allocation.
    let mut assembled = if total == PLP_UNKNOWN {
        BytesMut::new()
    } else {
        BytesMut::with_capacity(usize::try_from(total).unwrap_or(0))
    };

    loop {
        need(buf, 4)?;
        let chunk_len = buf.get_u32_le() as usize;
        if chunk_len == 0 {
            break;
        }
        need(buf, chunk_len)?;
        assembled.extend_from_slice(&buf.copy_to_bytes(chunk_len));
    }

    bytes_to_value(col, assembled.freeze())
}

/// Turn raw character/binary payload bytes into the right value, applying
/// UTF-16 or collation transcoding for character types.
fn bytes_to_value(col: &ColumnDesc, data: Bytes) -> Result<SqlValue, ValueError> {
    match col.type_id {
        TypeId::NVarChar | TypeId::NChar => Ok(SqlValue::String(utf16le_lossy(&data))),
        TypeId::Xml => Ok(SqlValue::Xml(utf16le_lossy(&data))),
        TypeId::BigVarChar | TypeId::BigChar => {
            // UTF-8 collations and plain ASCII take the fast path; other
            // collations transcode with U+FFFD replacement.
            if let Ok(s) = std::str::from_utf8(&data) {
                return Ok(SqlValue::String(s.to_string()));
            }
            let encoding = col
                .collation
                .and_then(|c| c.encoding())
                .unwrap_or(encoding_rs::WINDOWS_1252);
            let (decoded, _, _) = encoding.decode(&data);
            Ok(SqlValue::String(decoded.into_owned()))
        }
        TypeId::BigVarBinary | TypeId::BigBinary => Ok(SqlValue::Binary(data)),
        other => Err(ValueError::Unsupported(other as u8)),
    }
}

fn utf16le_lossy(data: &[u8]) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// MONEY family: fixed point with four decimal places.
fn money_from_scaled(scaled: i64) -> SqlValue {
    SqlValue::Decimal(Decimal::new(scaled, 4))
}

/// GUIDs are mixed-endian on the wire: the first three groups are
/// little-endian, the last eight bytes big-endian.
fn decode_guid(buf: &mut impl Buf, len: usize) -> Result<SqlValue, ValueError> {
    if len != 16 {
        return Err(ValueError::InvalidLength {
            type_name: "GUID",
            len,
        });
    }

    let mut wire = [0u8; 16];
    buf.copy_to_slice(&mut wire);

    let mut canonical = [0u8; 16];
    canonical[0..4].copy_from_slice(&[wire[3], wire[2], wire[1], wire[0]]);
    canonical[4..6].copy_from_slice(&[wire[5], wire[4]]);
    canonical[6..8].copy_from_slice(&[wire[7], wire[6]]);
    canonical[8..16].copy_from_slice(&wire[8..16]);

    Ok(SqlValue::Uuid(uuid::Uuid::from_bytes(canonical)))
}

/// DECIMAL: sign byte then little-endian magnitude.
fn decode_decimal(buf: &mut impl Buf, len: usize, scale: u8) -> Result<SqlValue, ValueError> {
    if len < 2 || len > 17 {
        return Err(ValueError::InvalidLength {
            type_name: "DECIMAL",
            len,
        });
    }

    let positive = buf.get_u8() != 0;
    let magnitude_len = len - 1;

    let mut magnitude = [0u8; 16];
    for slot in magnitude.iter_mut().take(magnitude_len) {
        *slot = buf.get_u8();
    }
    let unsigned = u128::from_le_bytes(magnitude);

    let mut value = Decimal::from_i128_with_scale(unsigned as i128, u32::from(scale));
    value.set_sign_negative(!positive);
    Ok(SqlValue::Decimal(value))
}

/// SQL Server epoch for the DATE family.
fn date_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn read_3byte_date(buf: &mut impl Buf) -> u32 {
    u32::from(buf.get_u8()) | (u32::from(buf.get_u8()) << 8) | (u32::from(buf.get_u8()) << 16)
}

fn decode_date(buf: &mut impl Buf, len: usize) -> Result<SqlValue, ValueError> {
    if len != 3 {
        return Err(ValueError::InvalidLength {
            type_name: "DATE",
            len,
        });
    }
    let days = read_3byte_date(buf);
    Ok(SqlValue::Date(
        date_epoch() + Duration::days(i64::from(days)),
    ))
}

/// Width of the fractional time field for a given scale.
const fn time_width(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

fn decode_time(buf: &mut impl Buf, len: usize, scale: u8) -> Result<NaiveTime, ValueError> {
    let width = time_width(scale);
    if len < width {
        return Err(ValueError::InvalidLength {
            type_name: "TIME",
            len,
        });
    }

    let mut raw = [0u8; 8];
    for slot in raw.iter_mut().take(width) {
        *slot = buf.get_u8();
    }
    let intervals = u64::from_le_bytes(raw);

    let nanos = intervals.saturating_mul(match scale {
        0 => 1_000_000_000,
        1 => 100_000_000,
        2 => 10_000_000,
        3 => 1_000_000,
        4 => 100_000,
        5 => 10_000,
        6 => 1_000,
        _ => 100,
    });

    let secs = (nanos / 1_000_000_000) as u32;
    let nano_part = (nanos % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nano_part)
        .ok_or_else(|| ValueError::InvalidTemporal(format!("{intervals} intervals at scale {scale}")))
}

fn decode_datetime2(buf: &mut impl Buf, len: usize, scale: u8) -> Result<SqlValue, ValueError> {
    let width = time_width(scale);
    if len != width + 3 {
        return Err(ValueError::InvalidLength {
            type_name: "DATETIME2",
            len,
        });
    }
    let time = decode_time(buf, width, scale)?;
    let days = read_3byte_date(buf);
    let date = date_epoch() + Duration::days(i64::from(days));
    Ok(SqlValue::DateTime(date.and_time(time)))
}

fn decode_datetimeoffset(buf: &mut impl Buf, len: usize, scale: u8) -> Result<SqlValue, ValueError> {
    let width = time_width(scale);
    if len != width + 5 {
        return Err(ValueError::InvalidLength {
            type_name: "DATETIMEOFFSET",
            len,
        });
    }
    let time = decode_time(buf, width, scale)?;
    let days = read_3byte_date(buf);
    let offset_minutes = buf.get_i16_le();

    let date = date_epoch() + Duration::days(i64::from(days));
    let offset = chrono::FixedOffset::east_opt(i32::from(offset_minutes) * 60)
        .ok_or_else(|| ValueError::InvalidTemporal(format!("offset {offset_minutes} minutes")))?;

    // The wire carries UTC; the offset only describes presentation.
    let utc = date.and_time(time).and_utc();
    Ok(SqlValue::DateTimeOffset(
        offset.from_utc_datetime(&utc.naive_utc()),
    ))
}

/// Legacy DATETIME: days since 1900-01-01 and 1/300s ticks since midnight.
fn decode_legacy_datetime(buf: &mut impl Buf) -> Result<SqlValue, ValueError> {
    let days = buf.get_i32_le();
    let ticks = buf.get_u32_le();

    let date = NaiveDate::from_ymd_opt(1900, 1, 1)
        .map(|base| base + Duration::days(i64::from(days)))
        .ok_or_else(|| ValueError::InvalidTemporal(format!("{days} days")))?;

    let millis = (u64::from(ticks) * 1000) / 300;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (millis / 1000) as u32,
        ((millis % 1000) * 1_000_000) as u32,
    )
    .ok_or_else(|| ValueError::InvalidTemporal(format!("{ticks} ticks")))?;

    Ok(SqlValue::DateTime(date.and_time(time)))
}

/// SMALLDATETIME: days since 1900-01-01 and minutes since midnight.
fn decode_small_datetime(buf: &mut impl Buf) -> Result<SqlValue, ValueError> {
    let days = buf.get_u16_le();
    let minutes = buf.get_u16_le();

    let date = NaiveDate::from_ymd_opt(1900, 1, 1)
        .map(|base| base + Duration::days(i64::from(days)))
        .ok_or_else(|| ValueError::InvalidTemporal(format!("{days} days")))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::from(minutes) * 60, 0)
        .ok_or_else(|| ValueError::InvalidTemporal(format!("{minutes} minutes")))?;

    Ok(SqlValue::DateTime(date.and_time(time)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BufMut;
    use tds_wire::Collation;

    use super::*;

    fn desc(type_id: TypeId) -> ColumnDesc {
        ColumnDesc {
            name: "c".into(),
            type_id,
            flags: 0x0001,
            max_length: 0,
            precision: None,
            scale: None,
            collation: None,
        }
    }

    #[test]
    fn fixed_int() {
        let mut buf = Bytes::from_static(&[42, 0, 0, 0]);
        let v = decode_column(&mut buf, &desc(TypeId::Int4)).unwrap();
        assert_eq!(v, SqlValue::Int(42));
    }

    #[test]
    fn intn_widths_and_null() {
        let mut buf = Bytes::from_static(&[0]);
        assert_eq!(
            decode_column(&mut buf, &desc(TypeId::IntN)).unwrap(),
            SqlValue::Null
        );

        let mut buf = Bytes::from_static(&[8, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            decode_column(&mut buf, &desc(TypeId::IntN)).unwrap(),
            SqlValue::BigInt(1)
        );
    }

    #[test]
    fn guid_mixed_endian_roundtrip() {
        // canonical 00112233-4455-6677-8899-AABBCCDDEEFF
        let wire = [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
            0xEE, 0xFF,
        ];
        let mut buf = BytesMut::new();
        buf.put_u8(16);
        buf.put_slice(&wire);

        let v = decode_column(&mut buf.freeze(), &desc(TypeId::Guid)).unwrap();
        match v {
            SqlValue::Uuid(u) => {
                assert_eq!(u.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
                // encode back to wire order and compare
                let canonical = u.into_bytes();
                let mut rewire = [0u8; 16];
                rewire[0..4].copy_from_slice(&[
                    canonical[3],
                    canonical[2],
                    canonical[1],
                    canonical[0],
                ]);
                rewire[4..6].copy_from_slice(&[canonical[5], canonical[4]]);
                rewire[6..8].copy_from_slice(&[canonical[7], canonical[6]]);
                rewire[8..16].copy_from_slice(&canonical[8..16]);
                assert_eq!(rewire, wire);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn decimal_sign_and_scale() {
        // -12.34 at precision 10, scale 2: sign 0, magnitude 1234
        let mut buf = BytesMut::new();
        buf.put_u8(5);
        buf.put_u8(0);
        buf.put_u32_le(1234);

        let mut col = desc(TypeId::NumericN);
        col.scale = Some(2);
        let v = decode_column(&mut buf.freeze(), &col).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(-1234, 2)));
    }

    #[test]
    fn nvarchar_null_and_value() {
        let mut buf = Bytes::from_static(&[0xFF, 0xFF]);
        let mut col = desc(TypeId::NVarChar);
        col.max_length = 80;
        assert_eq!(decode_column(&mut buf, &col).unwrap(), SqlValue::Null);

        let mut buf = BytesMut::new();
        buf.put_u16_le(4);
        buf.put_slice(&[b'o', 0, b'k', 0]);
        assert_eq!(
            decode_column(&mut buf.freeze(), &col).unwrap(),
            SqlValue::String("ok".into())
        );
    }

    #[test]
    fn varchar_transcodes_by_collation() {
        // "Привет" in windows-1251
        let cp1251 = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let mut buf = BytesMut::new();
        buf.put_u16_le(cp1251.len() as u16);
        buf.put_slice(&cp1251);

        let mut col = desc(TypeId::BigVarChar);
        col.max_length = 30;
        col.collation = Some(Collation {
            info: 0x0419,
            sort_id: 0,
        });

        let v = decode_column(&mut buf.freeze(), &col).unwrap();
        assert_eq!(v, SqlValue::String("Привет".into()));
    }

    #[test]
    fn plp_chunks_reassemble() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(0xFFFF_FFFF_FFFF_FFFE); // unknown total
        buf.put_u32_le(4);
        buf.put_slice(&[b'a', 0, b'b', 0]);
        buf.put_u32_le(2);
        buf.put_slice(&[b'c', 0]);
        buf.put_u32_le(0); // terminator

        let mut col = desc(TypeId::NVarChar);
        col.max_length = u32::from(MAX_SENTINEL);
        let v = decode_column(&mut buf.freeze(), &col).unwrap();
        assert_eq!(v, SqlValue::String("abc".into()));
    }

    #[test]
    fn plp_null() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(PLP_NULL);

        let mut col = desc(TypeId::BigVarBinary);
        col.max_length = u32::from(MAX_SENTINEL);
        assert_eq!(
            decode_column(&mut buf.freeze(), &col).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn truncated_value_is_incomplete() {
        let mut buf = Bytes::from_static(&[42, 0]); // INT4 needs 4 bytes
        let err = decode_column(&mut buf, &desc(TypeId::Int4)).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn datetime2_scale7() {
        // 2024-06-01 00:00:01 at scale 7: 10_000_000 intervals, date days
        let days = (NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
            - NaiveDate::from_ymd_opt(1, 1, 1).unwrap())
        .num_days() as u32;

        let mut buf = BytesMut::new();
        buf.put_u8(8); // 5 time + 3 date
        let intervals: u64 = 10_000_000;
        buf.put_slice(&intervals.to_le_bytes()[..5]);
        buf.put_u8((days & 0xFF) as u8);
        buf.put_u8(((days >> 8) & 0xFF) as u8);
        buf.put_u8(((days >> 16) & 0xFF) as u8);

        let mut col = desc(TypeId::DateTime2);
        col.scale = Some(7);
        let v = decode_column(&mut buf.freeze(), &col).unwrap();
        assert_eq!(
            v,
            SqlValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 6, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 1)
                    .unwrap()
            )
        );
    }

    #[test]
    fn nbc_row_skips_null_columns() {
        let meta = ColMetaData {
            columns: vec![desc(TypeId::Int4), desc(TypeId::IntN)],
        };

        let mut buf = BytesMut::new();
        buf.put_u8(0b0000_0010); // second column NULL
        buf.put_i32_le(7);

        let values = decode_nbc_row(&meta, &mut buf.freeze()).unwrap();
        assert_eq!(values, vec![SqlValue::Int(7), SqlValue::Null]);
    }

    #[test]
    fn money_is_fixed_point() {
        let mut buf = BytesMut::new();
        buf.put_u8(8);
        buf.put_i32_le(0); // high
        buf.put_u32_le(123_400); // low: 12.34

        let v = decode_column(&mut buf.freeze(), &desc(TypeId::MoneyN)).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(123_400, 4)));
    }
}
