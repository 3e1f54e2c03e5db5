//! TDS packet header.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::WireError;

/// Size of the fixed TDS packet header in bytes.
pub const HEADER_LEN: usize = 8;

/// Largest packet the protocol can express (length field is u16).
pub const MAX_PACKET_SIZE: usize = 65535;

/// Packet size before LOGIN7 negotiation.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// TDS message/packet type.
///
/// Only the subset the federation core sends or receives is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Remote procedure call request.
    Rpc = 0x03,
    /// Tabular response from the server.
    TabularResult = 0x04,
    /// Out-of-band attention (cancellation) signal.
    Attention = 0x06,
    /// Federated authentication token message.
    FedAuthToken = 0x08,
    /// TDS 7.x LOGIN7 request.
    Login7 = 0x10,
    /// PRELOGIN negotiation request/response.
    PreLogin = 0x12,
}

impl PacketKind {
    /// Decode a packet type byte.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(Self::SqlBatch),
            0x03 => Ok(Self::Rpc),
            0x04 => Ok(Self::TabularResult),
            0x06 => Ok(Self::Attention),
            0x08 => Ok(Self::FedAuthToken),
            0x10 => Ok(Self::Login7),
            0x12 => Ok(Self::PreLogin),
            other => Err(WireError::UnknownPacketKind(other)),
        }
    }
}

bitflags! {
    /// Packet status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u8 {
        /// Final packet of a logical message.
        const END_OF_MESSAGE = 0x01;
        /// Ignore this event (sent with attention acknowledgment).
        const IGNORE = 0x02;
        /// Reset connection state before processing this request.
        const RESET_CONNECTION = 0x08;
        /// Reset connection state but keep the open transaction.
        const RESET_KEEP_TRANSACTION = 0x10;
    }
}

/// The 8-byte header that precedes every TDS packet payload.
///
/// `length` covers header and payload together and is big-endian on the
/// wire; everything else is single bytes or big-endian u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type.
    pub kind: PacketKind,
    /// Status bits.
    pub flags: PacketFlags,
    /// Total packet length including the header.
    pub length: u16,
    /// Server process id, zero from the client.
    pub spid: u16,
    /// Sequence number, wraps at 255.
    pub packet_id: u8,
    /// Unused window field, always zero.
    pub window: u8,
}

impl PacketHeader {
    /// Build a header for an outgoing packet.
    #[must_use]
    pub const fn new(kind: PacketKind, flags: PacketFlags, length: u16) -> Self {
        Self {
            kind,
            flags,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Decode a header from the front of `src`.
    pub fn decode(src: &mut impl Buf) -> Result<Self, WireError> {
        if src.remaining() < HEADER_LEN {
            return Err(WireError::truncated(HEADER_LEN, src.remaining()));
        }

        let kind = PacketKind::from_u8(src.get_u8())?;
        let flags_byte = src.get_u8();
        let flags =
            PacketFlags::from_bits(flags_byte).ok_or(WireError::InvalidPacketFlags(flags_byte))?;

        Ok(Self {
            kind,
            flags,
            length: src.get_u16(),
            spid: src.get_u16(),
            packet_id: src.get_u8(),
            window: src.get_u8(),
        })
    }

    /// Encode the header into `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.kind as u8);
        dst.put_u8(self.flags.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Payload length (total length minus header).
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.length.saturating_sub(HEADER_LEN as u16) as usize
    }

    /// True for the last packet of a logical message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.flags.contains(PacketFlags::END_OF_MESSAGE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            kind: PacketKind::SqlBatch,
            flags: PacketFlags::END_OF_MESSAGE,
            length: 512,
            spid: 77,
            packet_id: 3,
            window: 0,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let decoded = PacketHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn payload_len_excludes_header() {
        let header = PacketHeader::new(PacketKind::Rpc, PacketFlags::END_OF_MESSAGE, 100);
        assert_eq!(header.payload_len(), 92);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(PacketKind::from_u8(0xEE).is_err());
        assert_eq!(PacketKind::from_u8(0x08).unwrap(), PacketKind::FedAuthToken);
    }
}
