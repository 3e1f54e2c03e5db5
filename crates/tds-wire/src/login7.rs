//! LOGIN7 request encoding.
//!
//! LOGIN7 carries client identity, credentials, and feature negotiation.
//! The layout is a 94-byte fixed header of offset/length pairs followed by
//! the variable data region (strings as UTF-16LE).
//!
//! The password is obfuscated, not encrypted: nibble swap then XOR 0xA5 per
//! byte. The login sequence must therefore run under TLS.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::put_utf16;
use crate::prelogin::TDS_7_4;

/// Size of the LOGIN7 fixed header.
pub const LOGIN7_FIXED_LEN: usize = 94;

/// Feature-extension terminator byte.
pub const FEATURE_TERMINATOR: u8 = 0xFF;

/// A LOGIN7 request under construction.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// Requested TDS version word.
    pub tds_version: u32,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Client machine name.
    pub hostname: String,
    /// SQL-auth user; empty under federated auth.
    pub username: String,
    /// SQL-auth password; empty under federated auth.
    pub password: String,
    /// Application name shown in server DMVs.
    pub app_name: String,
    /// Server name as dialed.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Session language, empty for server default.
    pub language: String,
    /// Initial database.
    pub database: String,
    /// Client locale id.
    pub client_lcid: u32,
    /// Read-only application intent.
    pub read_only_intent: bool,
    /// Encoded feature-extension blocks (id + u32 length + data each),
    /// without the terminator.
    pub features: Vec<(u8, Bytes)>,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TDS_7_4,
            packet_size: 4096,
            client_pid: std::process::id(),
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::from("mssql-federation"),
            server_name: String::new(),
            library_name: String::from("mssql-federation"),
            language: String::new(),
            database: String::new(),
            client_lcid: 0x0409,
            read_only_intent: false,
            features: Vec::new(),
        }
    }
}

impl Login7 {
    /// Start a LOGIN7 request with library defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a feature-extension block.
    pub fn add_feature(&mut self, feature_id: u8, data: Bytes) {
        self.features.push((feature_id, data));
    }

    /// OptionFlags1: fUseDB | fDatabase (fatal on missing database), the
    /// flag set standard SQL clients send.
    fn option_flags1(&self) -> u8 {
        0x20 | 0x40
    }

    /// OptionFlags2: fLanguage fatal | fODBC.
    fn option_flags2(&self) -> u8 {
        0x01 | 0x02
    }

    /// TypeFlags: read-only intent bit.
    fn type_flags(&self) -> u8 {
        if self.read_only_intent { 0x20 } else { 0x00 }
    }

    /// OptionFlags3: unknown-collation handling, plus the extension bit
    /// when feature blocks are attached.
    fn option_flags3(&self) -> u8 {
        let mut flags = 0x08;
        if !self.features.is_empty() {
            flags |= 0x10;
        }
        flags
    }

    /// Encode the LOGIN7 payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let utf16_units = |s: &str| s.encode_utf16().count() as u16;

        let hostname_len = utf16_units(&self.hostname);
        let username_len = utf16_units(&self.username);
        let password_len = utf16_units(&self.password);
        let app_name_len = utf16_units(&self.app_name);
        let server_name_len = utf16_units(&self.server_name);
        let library_len = utf16_units(&self.library_name);
        let language_len = utf16_units(&self.language);
        let database_len = utf16_units(&self.database);
        let has_ext = !self.features.is_empty();

        let mut var = BytesMut::new();
        let mut offset = LOGIN7_FIXED_LEN as u16;

        let hostname_offset = offset;
        put_utf16(&mut var, &self.hostname);
        offset += hostname_len * 2;

        let username_offset = offset;
        put_utf16(&mut var, &self.username);
        offset += username_len * 2;

        let password_offset = offset;
        put_obfuscated_password(&mut var, &self.password);
        offset += password_len * 2;

        let app_name_offset = offset;
        put_utf16(&mut var, &self.app_name);
        offset += app_name_len * 2;

        let server_name_offset = offset;
        put_utf16(&mut var, &self.server_name);
        offset += server_name_len * 2;

        // The "unused" slot doubles as the feature-extension pointer: a
        // 4-byte offset to the block that follows all other variable data.
        let ext_pointer_offset = offset;
        if has_ext {
            let ext_block_offset = offset as u32
                + 4
                + u32::from(library_len) * 2
                + u32::from(language_len) * 2
                + u32::from(database_len) * 2;
            var.put_u32_le(ext_block_offset);
            offset += 4;
        }

        let library_offset = offset;
        put_utf16(&mut var, &self.library_name);
        offset += library_len * 2;

        let language_offset = offset;
        put_utf16(&mut var, &self.language);
        offset += language_len * 2;

        let database_offset = offset;
        put_utf16(&mut var, &self.database);

        if has_ext {
            for (id, data) in &self.features {
                var.put_u8(*id);
                var.put_u32_le(data.len() as u32);
                var.put_slice(data);
            }
            var.put_u8(FEATURE_TERMINATOR);
        }

        let total_len = LOGIN7_FIXED_LEN + var.len();
        let mut buf = BytesMut::with_capacity(total_len);

        buf.put_u32_le(total_len as u32);
        buf.put_u32_le(self.tds_version);
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(0); // client program version
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id

        buf.put_u8(self.option_flags1());
        buf.put_u8(self.option_flags2());
        buf.put_u8(self.type_flags());
        buf.put_u8(self.option_flags3());

        buf.put_i32_le(0); // client timezone
        buf.put_u32_le(self.client_lcid);

        buf.put_u16_le(hostname_offset);
        buf.put_u16_le(hostname_len);
        buf.put_u16_le(username_offset);
        buf.put_u16_le(username_len);
        buf.put_u16_le(password_offset);
        buf.put_u16_le(password_len);
        buf.put_u16_le(app_name_offset);
        buf.put_u16_le(app_name_len);
        buf.put_u16_le(server_name_offset);
        buf.put_u16_le(server_name_len);

        if has_ext {
            buf.put_u16_le(ext_pointer_offset);
            buf.put_u16_le(4);
        } else {
            buf.put_u16_le(ext_pointer_offset);
            buf.put_u16_le(0);
        }

        buf.put_u16_le(library_offset);
        buf.put_u16_le(library_len);
        buf.put_u16_le(language_offset);
        buf.put_u16_le(language_len);
        buf.put_u16_le(database_offset);
        buf.put_u16_le(database_len);

        buf.put_slice(&[0u8; 6]); // client MAC id

        // SSPI, attach-db, change-password: unused, offsets point at the
        // end of the known data region.
        let tail = database_offset + database_len * 2;
        buf.put_u16_le(tail);
        buf.put_u16_le(0);
        buf.put_u16_le(tail);
        buf.put_u16_le(0);
        buf.put_u16_le(tail);
        buf.put_u16_le(0);
        buf.put_u32_le(0); // SSPI long

        buf.put_slice(&var);
        buf.freeze()
    }
}

/// Password obfuscation per MS-TDS: per byte, swap the nibbles then XOR 0xA5.
fn put_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        let low = (unit & 0xFF) as u8;
        let high = (unit >> 8) as u8;
        dst.put_u8(low.rotate_right(4) ^ 0xA5);
        dst.put_u8(high.rotate_right(4) ^ 0xA5);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_header_layout() {
        let mut login = Login7::new();
        login.hostname = "WORKER01".into();
        login.username = "sa".into();
        login.password = "secret".into();
        login.database = "sales".into();

        let encoded = login.encode();
        assert!(encoded.len() > LOGIN7_FIXED_LEN);

        let total = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(total as usize, encoded.len());

        let version = u32::from_le_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(version, TDS_7_4);
    }

    #[test]
    fn password_obfuscation_known_vector() {
        // 'a' = 0x0061: low 0x61 -> swap 0x16 -> xor 0xB3, high 0x00 -> 0xA5
        let mut buf = BytesMut::new();
        put_obfuscated_password(&mut buf, "a");
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
    }

    #[test]
    fn feature_extension_sets_flag_and_terminator() {
        let mut login = Login7::new();
        login.add_feature(0x02, Bytes::from_static(&[0x01]));

        let encoded = login.encode();
        // OptionFlags3 at offset 27 carries the extension bit
        assert_eq!(encoded[27] & 0x10, 0x10);
        assert_eq!(*encoded.last().unwrap(), FEATURE_TERMINATOR);
    }

    #[test]
    fn no_extension_keeps_flag_clear() {
        let encoded = Login7::new().encode();
        assert_eq!(encoded[27] & 0x10, 0x00);
    }
}
