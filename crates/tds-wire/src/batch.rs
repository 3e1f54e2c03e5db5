//! SQL batch request encoding.
//!
//! A SQL_BATCH payload is the ALL_HEADERS block (mandatory since TDS 7.2)
//! followed by the statement text in UTF-16LE. The federation core runs
//! every statement in the implicit per-statement transaction, so the
//! transaction descriptor is always zero.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::put_utf16;

/// ALL_HEADERS size: u32 total + one transaction-descriptor header.
const ALL_HEADERS_LEN: usize = 4 + 18;

/// Encode a SQL batch payload.
#[must_use]
pub fn encode_sql_batch(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_LEN + sql.len() * 2);

    buf.put_u32_le(ALL_HEADERS_LEN as u32);
    buf.put_u32_le(18); // header length
    buf.put_u16_le(0x0002); // transaction descriptor header
    buf.put_u64_le(0); // implicit transaction
    buf.put_u32_le(1); // outstanding request count

    put_utf16(&mut buf, sql);
    buf.freeze()
}
