//! Shared encode/decode helpers for TDS string and length formats.
//!
//! Host-side strings are UTF-8; the wire carries UTF-16LE. Malformed
//! sequences decode to U+FFFD rather than failing the whole message.

use bytes::{Buf, BufMut};

use crate::error::WireError;

/// Read a B_VARCHAR: one length byte (in characters) then UTF-16LE.
pub fn get_b_varchar(src: &mut impl Buf) -> Result<String, WireError> {
    if src.remaining() < 1 {
        return Err(WireError::truncated(1, 0));
    }
    let chars = src.get_u8() as usize;
    get_utf16(src, chars)
}

/// Read a US_VARCHAR: two length bytes (in characters) then UTF-16LE.
pub fn get_us_varchar(src: &mut impl Buf) -> Result<String, WireError> {
    if src.remaining() < 2 {
        return Err(WireError::truncated(2, src.remaining()));
    }
    let chars = src.get_u16_le() as usize;
    get_utf16(src, chars)
}

/// Read `chars` UTF-16 code units and decode them, replacing lone
/// surrogates with U+FFFD.
pub fn get_utf16(src: &mut impl Buf, chars: usize) -> Result<String, WireError> {
    let needed = chars * 2;
    if src.remaining() < needed {
        return Err(WireError::truncated(needed, src.remaining()));
    }

    let mut units = Vec::with_capacity(chars);
    for _ in 0..chars {
        units.push(src.get_u16_le());
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Write a B_VARCHAR, truncating at 255 characters.
pub fn put_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(255);
    dst.put_u8(len as u8);
    for &u in &units[..len] {
        dst.put_u16_le(u);
    }
}

/// Write a bare UTF-16LE string with no length prefix.
pub fn put_utf16(dst: &mut impl BufMut, s: &str) {
    for u in s.encode_utf16() {
        dst.put_u16_le(u);
    }
}

/// Length in bytes of `s` once UTF-16LE encoded.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}
