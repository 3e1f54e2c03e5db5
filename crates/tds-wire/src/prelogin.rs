//! PRELOGIN negotiation message.
//!
//! The first exchange on a fresh connection. The client advertises its
//! protocol version and encryption wish; the server answers with its
//! product version, the negotiated encryption level, and whether federated
//! authentication is required.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// PRELOGIN option tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum OptionTag {
    Version = 0x00,
    Encryption = 0x01,
    Instance = 0x02,
    ThreadId = 0x03,
    Mars = 0x04,
    TraceId = 0x05,
    FedAuthRequired = 0x06,
    Terminator = 0xFF,
}

impl OptionTag {
    fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0x00 => Self::Version,
            0x01 => Self::Encryption,
            0x02 => Self::Instance,
            0x03 => Self::ThreadId,
            0x04 => Self::Mars,
            0x05 => Self::TraceId,
            0x06 => Self::FedAuthRequired,
            0xFF => Self::Terminator,
            // Servers may send options we do not model (e.g. NONCE); those
            // are skipped by offset, so an unknown tag is only an error at
            // the header-walk level.
            other => return Err(WireError::UnknownPreloginOption(other)),
        })
    }
}

/// Encryption negotiation byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// TLS for the login sequence only.
    Off = 0x00,
    /// Full-session TLS.
    On = 0x01,
    /// No TLS at all.
    NotSupported = 0x02,
    /// TLS mandatory; refuse unencrypted peers.
    #[default]
    Required = 0x03,
}

impl EncryptionLevel {
    /// Decode the negotiation byte; unknown values degrade to `Off`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Off,
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }
}

/// A PRELOGIN request or response.
///
/// The client always sends VERSION, ENCRYPTION, INSTOPT, THREADID, MARS
/// (zero) and FEDAUTHREQUIRED; TRACEID is attached when tracing supplies an
/// activity id. The VERSION field is the TDS version on the way out and the
/// SQL Server product version on the way back.
#[derive(Debug, Clone, Default)]
pub struct PreLogin {
    /// Raw version word (client: TDS version, server: product version).
    pub version: u32,
    /// Sub-build number attached to the version word.
    pub sub_build: u16,
    /// Encryption wish/answer.
    pub encryption: EncryptionLevel,
    /// Named instance, empty string when unused.
    pub instance: String,
    /// Client thread id, diagnostic only.
    pub thread_id: u32,
    /// MARS flag; the federation core always sends 0.
    pub mars: bool,
    /// 36-byte trace id block (activity GUID + sequence + connection id).
    pub trace_id: Option<[u8; 36]>,
    /// Whether federated authentication is required.
    pub fed_auth_required: bool,
}

/// TDS 7.4 version word sent in the client PRELOGIN.
pub const TDS_7_4: u32 = 0x7400_0004;

impl PreLogin {
    /// Build a client PRELOGIN with the standard option set.
    #[must_use]
    pub fn client(encryption: EncryptionLevel, fed_auth: bool) -> Self {
        Self {
            version: TDS_7_4,
            sub_build: 0,
            encryption,
            instance: String::new(),
            thread_id: std::process::id(),
            mars: false,
            trace_id: None,
            fed_auth_required: fed_auth,
        }
    }

    /// Encode as the PRELOGIN payload (option table, terminator, data).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // Fixed options: VERSION(6) ENCRYPTION(1) INSTOPT(n) THREADID(4)
        // MARS(1) FEDAUTHREQUIRED(1), plus TRACEID(36) when present.
        let mut option_count = 6;
        if self.trace_id.is_some() {
            option_count += 1;
        }
        let header_len = option_count * 5 + 1;

        let mut table = BytesMut::with_capacity(header_len);
        let mut data = BytesMut::new();
        let mut offset = header_len as u16;

        let mut push = |table: &mut BytesMut, tag: OptionTag, len: u16| {
            table.put_u8(tag as u8);
            table.put_u16(offset);
            table.put_u16(len);
            offset += len;
        };

        push(&mut table, OptionTag::Version, 6);
        data.put_u32(self.version);
        data.put_u16_le(self.sub_build);

        push(&mut table, OptionTag::Encryption, 1);
        data.put_u8(self.encryption as u8);

        let instance_len = self.instance.len() as u16 + 1;
        push(&mut table, OptionTag::Instance, instance_len);
        data.put_slice(self.instance.as_bytes());
        data.put_u8(0);

        push(&mut table, OptionTag::ThreadId, 4);
        data.put_u32(self.thread_id);

        push(&mut table, OptionTag::Mars, 1);
        data.put_u8(u8::from(self.mars));

        if let Some(trace) = self.trace_id {
            push(&mut table, OptionTag::TraceId, 36);
            data.put_slice(&trace);
        }

        push(&mut table, OptionTag::FedAuthRequired, 1);
        data.put_u8(u8::from(self.fed_auth_required));

        table.put_u8(OptionTag::Terminator as u8);
        table.extend_from_slice(&data);
        table.freeze()
    }

    /// Decode a PRELOGIN payload.
    ///
    /// Option offsets are absolute within the payload; entries pointing
    /// outside the buffer are skipped rather than failing the handshake.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut cursor = payload;
        let mut entries = Vec::new();

        loop {
            if !cursor.has_remaining() {
                return Err(WireError::truncated(1, 0));
            }
            let tag_byte = cursor.get_u8();
            if tag_byte == OptionTag::Terminator as u8 {
                break;
            }
            if cursor.remaining() < 4 {
                return Err(WireError::truncated(4, cursor.remaining()));
            }
            let offset = cursor.get_u16() as usize;
            let len = cursor.get_u16() as usize;
            // Unknown tags are retained so their data region is simply ignored.
            if let Ok(tag) = OptionTag::from_u8(tag_byte) {
                entries.push((tag, offset, len));
            }
        }

        let mut out = Self::default();
        for (tag, offset, len) in entries {
            let Some(field) = payload.get(offset..offset + len) else {
                continue;
            };
            match tag {
                OptionTag::Version if len >= 4 => {
                    out.version = u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
                    if len >= 6 {
                        out.sub_build = u16::from_le_bytes([field[4], field[5]]);
                    }
                }
                OptionTag::Encryption if len >= 1 => {
                    out.encryption = EncryptionLevel::from_u8(field[0]);
                }
                OptionTag::Instance if len > 0 => {
                    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                    out.instance = String::from_utf8_lossy(&field[..end]).into_owned();
                }
                OptionTag::ThreadId if len >= 4 => {
                    out.thread_id = u32::from_be_bytes([field[0], field[1], field[2], field[3]]);
                }
                OptionTag::Mars if len >= 1 => {
                    out.mars = field[0] != 0;
                }
                OptionTag::FedAuthRequired if len >= 1 => {
                    out.fed_auth_required = field[0] != 0;
                }
                _ => {}
            }
        }

        Ok(out)
    }
}
