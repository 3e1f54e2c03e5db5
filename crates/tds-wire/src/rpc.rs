//! RPC request encoding for `sp_executesql`.
//!
//! Catalog probes bind schema and table names as NVARCHAR parameters
//! instead of splicing them into SQL text. Only the `sp_executesql`
//! well-known procedure with NVARCHAR arguments is needed; scan queries go
//! out as SQL batches with rendered literals.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::put_utf16;
use crate::collation::Collation;
use crate::types::TypeId;

/// Well-known procedure id of `sp_executesql`.
const PROC_ID_EXECUTESQL: u16 = 10;

/// ALL_HEADERS size, identical to the SQL batch block.
const ALL_HEADERS_LEN: usize = 4 + 18;

/// Encode an `sp_executesql` RPC payload.
///
/// `params` pairs each `@name` (with the `@`) with its NVARCHAR value. The
/// parameter declaration list is rendered for the caller in the statement's
/// second argument, so `statement` should reference `@p1`-style names that
/// `params` defines.
#[must_use]
pub fn encode_sp_executesql(statement: &str, params: &[(&str, &str)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_LEN + 64 + statement.len() * 2);

    buf.put_u32_le(ALL_HEADERS_LEN as u32);
    buf.put_u32_le(18);
    buf.put_u16_le(0x0002);
    buf.put_u64_le(0);
    buf.put_u32_le(1);

    // ProcIDSwitch 0xFFFF selects a well-known procedure id.
    buf.put_u16_le(0xFFFF);
    buf.put_u16_le(PROC_ID_EXECUTESQL);
    buf.put_u16_le(0); // option flags

    // First parameter: the statement itself.
    put_nvarchar_param(&mut buf, "", statement);

    // Second parameter: the declaration list.
    let decls = params
        .iter()
        .map(|(name, _)| format!("{name} NVARCHAR(4000)"))
        .collect::<Vec<_>>()
        .join(", ");
    put_nvarchar_param(&mut buf, "", &decls);

    for (name, value) in params {
        put_nvarchar_param(&mut buf, name, value);
    }

    buf.freeze()
}

/// Write one NVARCHAR(4000) input parameter.
fn put_nvarchar_param(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_u8(name.encode_utf16().count() as u8);
    put_utf16(buf, name);
    buf.put_u8(0); // input parameter

    buf.put_u8(TypeId::NVarChar as u8);
    buf.put_u16_le(8000); // max byte length
    Collation::default().encode(buf);

    let byte_len = value.encode_utf16().count() * 2;
    buf.put_u16_le(byte_len as u16);
    put_utf16(buf, value);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn selects_well_known_proc() {
        let payload = encode_sp_executesql("SELECT @p1", &[("@p1", "dbo")]);
        // ProcIDSwitch after ALL_HEADERS
        assert_eq!(
            &payload[ALL_HEADERS_LEN..ALL_HEADERS_LEN + 4],
            &[0xFF, 0xFF, 10, 0]
        );
    }

    #[test]
    fn parameter_count_matches() {
        let payload = encode_sp_executesql("SELECT 1", &[]);
        // statement + declaration parameters only; both unnamed
        let tail = &payload[ALL_HEADERS_LEN + 6..];
        assert_eq!(tail[0], 0); // first param name length
    }
}
