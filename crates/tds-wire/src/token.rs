//! Response token stream definitions.
//!
//! A TABULAR_RESULT message is a sequence of tokens: one type byte each,
//! then token-specific data. Control tokens (DONE, ERROR, ENVCHANGE, ...)
//! decode standalone; ROW and NBCROW need the preceding COLMETADATA and are
//! decoded by the value layer, which walks columns with the descriptors
//! produced here.
//!
//! All decoders surface short input as [`WireError::Truncated`] so a
//! streaming reader can pull the next packet and retry.

use bitflags::bitflags;
use bytes::Buf;

use crate::codec::{get_b_varchar, get_us_varchar, get_utf16};
use crate::collation::Collation;
use crate::error::WireError;
use crate::types::TypeId;

/// Token type bytes handled by the federation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    /// Result-set column metadata.
    ColMetaData = 0x81,
    /// Column ordering hint for ORDER BY results.
    Order = 0xA9,
    /// Server error message.
    Error = 0xAA,
    /// Server informational message.
    Info = 0xAB,
    /// Stored procedure return status.
    ReturnStatus = 0x79,
    /// Login acknowledgment.
    LoginAck = 0xAD,
    /// Feature extension acknowledgment.
    FeatureExtAck = 0xAE,
    /// Full row.
    Row = 0xD1,
    /// Null-bitmap-compressed row.
    NbcRow = 0xD2,
    /// Session environment change.
    EnvChange = 0xE3,
    /// Federated authentication information.
    FedAuthInfo = 0xEE,
    /// Statement completion.
    Done = 0xFD,
    /// Stored procedure completion.
    DoneProc = 0xFE,
    /// Completion of a statement inside a procedure.
    DoneInProc = 0xFF,
}

impl TokenKind {
    /// Decode a token type byte.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0x81 => Self::ColMetaData,
            0xA9 => Self::Order,
            0xAA => Self::Error,
            0xAB => Self::Info,
            0x79 => Self::ReturnStatus,
            0xAD => Self::LoginAck,
            0xAE => Self::FeatureExtAck,
            0xD1 => Self::Row,
            0xD2 => Self::NbcRow,
            0xE3 => Self::EnvChange,
            0xEE => Self::FedAuthInfo,
            0xFD => Self::Done,
            0xFE => Self::DoneProc,
            0xFF => Self::DoneInProc,
            other => return Err(WireError::UnknownToken(other)),
        })
    }
}

bitflags! {
    /// DONE status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DoneFlags: u16 {
        /// More result sets follow.
        const MORE = 0x0001;
        /// The statement errored.
        const ERROR = 0x0002;
        /// A transaction is open.
        const IN_XACT = 0x0004;
        /// The row count field is valid.
        const COUNT = 0x0010;
        /// Acknowledges an attention request.
        const ATTENTION = 0x0020;
        /// Server error terminated the batch.
        const SRV_ERROR = 0x0100;
    }
}

/// DONE / DONEPROC / DONEINPROC body.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Completion flags.
    pub flags: DoneFlags,
    /// Token of the completed command.
    pub cur_cmd: u16,
    /// Affected/returned row count when `COUNT` is set.
    pub row_count: u64,
}

impl Done {
    /// Body size after the token byte.
    pub const WIRE_LEN: usize = 12;

    /// Decode the 12-byte body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < Self::WIRE_LEN {
            return Err(WireError::truncated(Self::WIRE_LEN, src.remaining()));
        }
        Ok(Self {
            flags: DoneFlags::from_bits_retain(src.get_u16_le()),
            cur_cmd: src.get_u16_le(),
            row_count: src.get_u64_le(),
        })
    }

    /// True when another result set follows.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.flags.contains(DoneFlags::MORE)
    }

    /// True when this DONE acknowledges an attention.
    #[must_use]
    pub const fn acknowledges_attention(&self) -> bool {
        self.flags.contains(DoneFlags::ATTENTION)
    }
}

/// ERROR and INFO share one layout; only severity distinguishes them.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// Message state.
    pub state: u8,
    /// Severity class (0-25).
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Originating server name.
    pub server: String,
    /// Originating procedure, empty for ad-hoc batches.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerMessage {
    /// Decode an ERROR or INFO body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 2 {
            return Err(WireError::truncated(2, src.remaining()));
        }
        let _length = src.get_u16_le();

        if src.remaining() < 6 {
            return Err(WireError::truncated(6, src.remaining()));
        }
        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = get_us_varchar(src)?;
        let server = get_b_varchar(src)?;
        let procedure = get_b_varchar(src)?;

        if src.remaining() < 4 {
            return Err(WireError::truncated(4, src.remaining()));
        }
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Severity 20+ terminates the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }
}

/// LOGINACK body.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface byte (1 = SQL).
    pub interface: u8,
    /// Negotiated TDS version word.
    pub tds_version: u32,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: u32,
}

impl LoginAck {
    /// Decode the LOGINACK body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 2 {
            return Err(WireError::truncated(2, src.remaining()));
        }
        let _length = src.get_u16_le();

        if src.remaining() < 5 {
            return Err(WireError::truncated(5, src.remaining()));
        }
        let interface = src.get_u8();
        let tds_version = src.get_u32_le();
        let prog_name = get_b_varchar(src)?;

        if src.remaining() < 4 {
            return Err(WireError::truncated(4, src.remaining()));
        }
        let prog_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }
}

/// Session state carried by an ENVCHANGE token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// Current database changed.
    Database {
        /// New database name.
        new: String,
        /// Previous database name.
        old: String,
    },
    /// Session language changed.
    Language {
        /// New language.
        new: String,
    },
    /// Negotiated packet size changed.
    PacketSize {
        /// New packet size in bytes.
        size: u32,
    },
    /// Session collation changed; raw 5-byte collation payload.
    SqlCollation {
        /// New collation, absent when the server sends an empty value.
        collation: Option<Collation>,
    },
    /// Connection reset completed.
    ResetAck,
    /// An environment change the core does not track.
    Other {
        /// The raw ENVCHANGE type byte.
        env_type: u8,
    },
}

impl EnvChange {
    /// Decode an ENVCHANGE body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 2 {
            return Err(WireError::truncated(2, src.remaining()));
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(WireError::truncated(length, src.remaining()));
        }

        // Work on the delimited body so unknown shapes cannot desync the
        // token stream.
        let mut body = src.copy_to_bytes(length);
        if !body.has_remaining() {
            return Err(WireError::Malformed {
                context: "ENVCHANGE",
                detail: "empty body".into(),
            });
        }
        let env_type = body.get_u8();

        let change = match env_type {
            1 => EnvChange::Database {
                new: get_b_varchar(&mut body)?,
                old: get_b_varchar(&mut body)?,
            },
            2 => EnvChange::Language {
                new: get_b_varchar(&mut body)?,
            },
            4 => {
                let text = get_b_varchar(&mut body)?;
                let size = text.parse::<u32>().map_err(|_| WireError::Malformed {
                    context: "ENVCHANGE packet size",
                    detail: text,
                })?;
                EnvChange::PacketSize { size }
            }
            7 => {
                // New value is a byte-length-prefixed collation blob.
                if !body.has_remaining() {
                    return Err(WireError::truncated(1, 0));
                }
                let new_len = body.get_u8() as usize;
                let collation = if new_len >= Collation::WIRE_LEN {
                    let c = Collation::decode(&mut body)?;
                    body.advance(new_len - Collation::WIRE_LEN);
                    Some(c)
                } else {
                    body.advance(new_len.min(body.remaining()));
                    None
                };
                EnvChange::SqlCollation { collation }
            }
            18 => EnvChange::ResetAck,
            other => EnvChange::Other { env_type: other },
        };

        Ok(change)
    }
}

/// ORDER token: ordinals of the columns the server sorted by.
#[derive(Debug, Clone)]
pub struct OrderToken {
    /// Sorted column ordinals.
    pub columns: Vec<u16>,
}

impl OrderToken {
    /// Decode the ORDER body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 2 {
            return Err(WireError::truncated(2, src.remaining()));
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(WireError::truncated(length, src.remaining()));
        }

        let mut columns = Vec::with_capacity(length / 2);
        for _ in 0..length / 2 {
            columns.push(src.get_u16_le());
        }
        Ok(Self { columns })
    }
}

/// FEDAUTHINFO token: the STS endpoint and service principal name.
#[derive(Debug, Clone, Default)]
pub struct FedAuthInfo {
    /// Security token service URL.
    pub sts_url: String,
    /// Service principal name of the server.
    pub spn: String,
}

impl FedAuthInfo {
    /// Decode the FEDAUTHINFO body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 4 {
            return Err(WireError::truncated(4, src.remaining()));
        }
        let length = src.get_u32_le() as usize;
        if src.remaining() < length {
            return Err(WireError::truncated(length, src.remaining()));
        }
        let body = src.copy_to_bytes(length);

        let mut cursor = body.clone();
        if cursor.remaining() < 4 {
            return Ok(Self::default());
        }
        let count = cursor.get_u32_le() as usize;

        // Per MS-TDS the per-option data offsets count from the start of
        // the token data, i.e. from the CountOfInfoIDs field.
        let mut info = Self::default();
        for _ in 0..count {
            if cursor.remaining() < 9 {
                break;
            }
            let info_id = cursor.get_u8();
            let data_len = cursor.get_u32_le() as usize;
            let data_offset = cursor.get_u32_le() as usize;

            let Some(field) = body.get(data_offset..data_offset + data_len) else {
                continue;
            };
            let mut field = &field[..];
            let Ok(value) = get_utf16(&mut field, data_len / 2) else {
                continue;
            };
            match info_id {
                0x01 => info.spn = value,
                0x02 => info.sts_url = value,
                _ => {}
            }
        }

        Ok(info)
    }
}

/// Consume a FEATUREEXTACK body without interpreting it.
pub fn skip_feature_ext_ack(src: &mut impl Buf) -> Result<(), WireError> {
    loop {
        if !src.has_remaining() {
            return Err(WireError::truncated(1, 0));
        }
        let feature_id = src.get_u8();
        if feature_id == 0xFF {
            return Ok(());
        }
        if src.remaining() < 4 {
            return Err(WireError::truncated(4, src.remaining()));
        }
        let len = src.get_u32_le() as usize;
        if src.remaining() < len {
            return Err(WireError::truncated(len, src.remaining()));
        }
        src.advance(len);
    }
}

/// One column of a COLMETADATA token.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    /// Column name.
    pub name: String,
    /// TDS type.
    pub type_id: TypeId,
    /// Raw COLMETADATA flags.
    pub flags: u16,
    /// Declared maximum length in bytes; `0xFFFF` marks MAX types.
    pub max_length: u32,
    /// Precision for decimal types.
    pub precision: Option<u8>,
    /// Scale for decimal and scaled temporal types.
    pub scale: Option<u8>,
    /// Collation for character types.
    pub collation: Option<Collation>,
}

impl ColumnDesc {
    /// Nullable flag from the COLMETADATA flag word.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    /// Identity flag from the COLMETADATA flag word.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.flags & 0x0010 != 0
    }

    fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 7 {
            return Err(WireError::truncated(7, src.remaining()));
        }
        let _user_type = src.get_u32_le();
        let flags = src.get_u16_le();
        let type_id = TypeId::from_u8(src.get_u8())?;

        let mut max_length = 0u32;
        let mut precision = None;
        let mut scale = None;
        let mut collation = None;

        match type_id {
            TypeId::Null
            | TypeId::Int1
            | TypeId::Bit
            | TypeId::Int2
            | TypeId::Int4
            | TypeId::Int8
            | TypeId::Flt4
            | TypeId::Flt8
            | TypeId::Money
            | TypeId::Money4
            | TypeId::DateTime
            | TypeId::DateTime4
            | TypeId::Date => {}

            TypeId::IntN
            | TypeId::BitN
            | TypeId::FltN
            | TypeId::MoneyN
            | TypeId::DateTimeN
            | TypeId::Guid => {
                if !src.has_remaining() {
                    return Err(WireError::truncated(1, 0));
                }
                max_length = u32::from(src.get_u8());
            }

            TypeId::DecimalN | TypeId::NumericN => {
                if src.remaining() < 3 {
                    return Err(WireError::truncated(3, src.remaining()));
                }
                max_length = u32::from(src.get_u8());
                precision = Some(src.get_u8());
                scale = Some(src.get_u8());
            }

            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                if !src.has_remaining() {
                    return Err(WireError::truncated(1, 0));
                }
                scale = Some(src.get_u8());
            }

            TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
                if src.remaining() < 2 + Collation::WIRE_LEN {
                    return Err(WireError::truncated(
                        2 + Collation::WIRE_LEN,
                        src.remaining(),
                    ));
                }
                max_length = u32::from(src.get_u16_le());
                collation = Some(Collation::decode(src)?);
            }

            TypeId::BigVarBinary | TypeId::BigBinary => {
                if src.remaining() < 2 {
                    return Err(WireError::truncated(2, src.remaining()));
                }
                max_length = u32::from(src.get_u16_le());
            }

            TypeId::Xml => {
                // Schema-present byte; schema references are not consumed
                // by the federation core.
                if !src.has_remaining() {
                    return Err(WireError::truncated(1, 0));
                }
                let schema_present = src.get_u8();
                if schema_present != 0 {
                    return Err(WireError::Malformed {
                        context: "COLMETADATA XML",
                        detail: "schema references not supported".into(),
                    });
                }
            }
        }

        let name = get_b_varchar(src)?;

        Ok(Self {
            name,
            type_id,
            flags,
            max_length,
            precision,
            scale,
            collation,
        })
    }
}

/// COLMETADATA token: the shape of the following rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColMetaData {
    /// Column descriptors in result order.
    pub columns: Vec<ColumnDesc>,
}

impl ColMetaData {
    /// Sentinel count for "no metadata".
    const NO_METADATA: u16 = 0xFFFF;

    /// Decode a COLMETADATA body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < 2 {
            return Err(WireError::truncated(2, src.remaining()));
        }
        let count = src.get_u16_le();
        if count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            columns.push(ColumnDesc::decode(src)?);
        }
        Ok(Self { columns })
    }

    /// Bytes in an NBCROW null bitmap for this column count.
    #[must_use]
    pub fn null_bitmap_len(&self) -> usize {
        self.columns.len().div_ceil(8)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;

    #[test]
    fn done_decode() {
        let body = [
            0x11u8, 0x00, // MORE | COUNT
            0xC1, 0x00, // SELECT
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let done = Done::decode(&mut &body[..]).unwrap();
        assert!(done.has_more());
        assert!(done.flags.contains(DoneFlags::COUNT));
        assert_eq!(done.row_count, 5);
        assert!(!done.acknowledges_attention());
    }

    #[test]
    fn done_attention_ack() {
        let body = [0x20u8, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        let done = Done::decode(&mut &body[..]).unwrap();
        assert!(done.acknowledges_attention());
    }

    fn put_b_varchar_utf16(buf: &mut BytesMut, s: &str) {
        buf.put_u8(s.encode_utf16().count() as u8);
        for u in s.encode_utf16() {
            buf.put_u16_le(u);
        }
    }

    #[test]
    fn server_message_decode() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0); // length, unchecked
        buf.put_i32_le(208);
        buf.put_u8(1); // state
        buf.put_u8(16); // class
        // message (US_VARCHAR)
        let msg = "Invalid object name 'dbo.missing'.";
        buf.put_u16_le(msg.encode_utf16().count() as u16);
        for u in msg.encode_utf16() {
            buf.put_u16_le(u);
        }
        put_b_varchar_utf16(&mut buf, "sqlhost");
        put_b_varchar_utf16(&mut buf, "");
        buf.put_i32_le(1);

        let parsed = ServerMessage::decode(&mut buf.freeze()).unwrap();
        assert_eq!(parsed.number, 208);
        assert_eq!(parsed.class, 16);
        assert_eq!(parsed.message, msg);
        assert_eq!(parsed.server, "sqlhost");
        assert!(!parsed.is_fatal());
    }

    #[test]
    fn env_change_database() {
        let mut body = BytesMut::new();
        body.put_u8(1);
        put_b_varchar_utf16(&mut body, "sales");
        put_b_varchar_utf16(&mut body, "master");

        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.extend_from_slice(&body);

        let change = EnvChange::decode(&mut buf.freeze()).unwrap();
        assert_eq!(
            change,
            EnvChange::Database {
                new: "sales".into(),
                old: "master".into()
            }
        );
    }

    #[test]
    fn env_change_packet_size() {
        let mut body = BytesMut::new();
        body.put_u8(4);
        put_b_varchar_utf16(&mut body, "8192");
        put_b_varchar_utf16(&mut body, "4096");

        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.extend_from_slice(&body);

        let change = EnvChange::decode(&mut buf.freeze()).unwrap();
        assert_eq!(change, EnvChange::PacketSize { size: 8192 });
    }

    #[test]
    fn env_change_collation() {
        let mut body = BytesMut::new();
        body.put_u8(7);
        body.put_u8(5); // new value length
        Collation {
            info: 0x0010_0409,
            sort_id: 52,
        }
        .encode(&mut body);
        body.put_u8(0); // old value length

        let mut buf = BytesMut::new();
        buf.put_u16_le(body.len() as u16);
        buf.extend_from_slice(&body);

        match EnvChange::decode(&mut buf.freeze()).unwrap() {
            EnvChange::SqlCollation {
                collation: Some(c),
            } => {
                assert!(c.is_case_insensitive());
                assert_eq!(c.sort_id, 52);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn colmetadata_int_and_nvarchar() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(2);

        // [id] INT NOT NULL
        buf.put_u32_le(0);
        buf.put_u16_le(0x0000);
        buf.put_u8(TypeId::Int4 as u8);
        put_b_varchar_utf16(&mut buf, "id");

        // [name] NVARCHAR(40) NULL
        buf.put_u32_le(0);
        buf.put_u16_le(0x0001);
        buf.put_u8(TypeId::NVarChar as u8);
        buf.put_u16_le(80);
        Collation {
            info: 0x0010_0409,
            sort_id: 52,
        }
        .encode(&mut buf);
        put_b_varchar_utf16(&mut buf, "name");

        let meta = ColMetaData::decode(&mut buf.freeze()).unwrap();
        assert_eq!(meta.columns.len(), 2);
        assert_eq!(meta.columns[0].name, "id");
        assert!(!meta.columns[0].is_nullable());
        assert_eq!(meta.columns[1].type_id, TypeId::NVarChar);
        assert!(meta.columns[1].is_nullable());
        assert_eq!(meta.columns[1].max_length, 80);
        assert!(meta.columns[1].collation.is_some());
        assert_eq!(meta.null_bitmap_len(), 1);
    }

    #[test]
    fn colmetadata_decimal() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u32_le(0);
        buf.put_u16_le(0x0001);
        buf.put_u8(TypeId::NumericN as u8);
        buf.put_u8(9); // max length
        buf.put_u8(18); // precision
        buf.put_u8(4); // scale
        put_b_varchar_utf16(&mut buf, "amount");

        let meta = ColMetaData::decode(&mut buf.freeze()).unwrap();
        assert_eq!(meta.columns[0].precision, Some(18));
        assert_eq!(meta.columns[0].scale, Some(4));
    }

    #[test]
    fn truncated_colmetadata_reports_incomplete() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u32_le(0);
        // flag word cut short
        buf.put_u8(0x00);

        let err = ColMetaData::decode(&mut buf.freeze()).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn fedauthinfo_decode() {
        // Two options: SPN (0x01) and STS URL (0x02)
        let spn = "srv/db.example.test";
        let url = "https://sts.example.test";
        let spn_bytes: Vec<u8> = spn.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let url_bytes: Vec<u8> = url.encode_utf16().flat_map(u16::to_le_bytes).collect();

        let mut body = BytesMut::new();
        body.put_u32_le(2);
        let data_start = 4 + 2 * 9;
        body.put_u8(0x01);
        body.put_u32_le(spn_bytes.len() as u32);
        body.put_u32_le(data_start as u32);
        body.put_u8(0x02);
        body.put_u32_le(url_bytes.len() as u32);
        body.put_u32_le((data_start + spn_bytes.len()) as u32);
        body.put_slice(&spn_bytes);
        body.put_slice(&url_bytes);

        let mut buf = BytesMut::new();
        buf.put_u32_le(body.len() as u32);
        buf.extend_from_slice(&body);

        let info = FedAuthInfo::decode(&mut buf.freeze()).unwrap();
        assert_eq!(info.spn, spn);
        assert_eq!(info.sts_url, url);
    }

    #[test]
    fn feature_ext_ack_skip() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x02);
        buf.put_u32_le(3);
        buf.put_slice(&[1, 2, 3]);
        buf.put_u8(0xFF);
        buf.put_u8(0xFD); // next token must survive

        let mut bytes: Bytes = buf.freeze();
        skip_feature_ext_ack(&mut bytes).unwrap();
        assert_eq!(bytes.get_u8(), 0xFD);
    }
}
