//! tokio-util codec for TDS packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tds_wire::{HEADER_LEN, MAX_PACKET_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;

/// One TDS packet: parsed header plus payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Parsed header.
    pub header: PacketHeader,
    /// Payload without the header.
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet; the codec fills in length and sequence number.
    #[must_use]
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// True for the final packet of a message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Encoder/decoder turning a byte stream into [`Packet`]s.
///
/// Outgoing packets get a wrapping sequence number; the counter restarts at
/// 1 for each new message per the TDS rules, which the [`crate::Link`]
/// drives via [`PacketCodec::rewind_sequence`].
#[derive(Debug)]
pub struct PacketCodec {
    max_packet_size: usize,
    sequence: u8,
}

impl PacketCodec {
    /// Codec with the protocol-maximum packet size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            sequence: 1,
        }
    }

    /// Adjust the accepted packet size after ENVCHANGE renegotiation.
    pub fn set_max_packet_size(&mut self, size: usize) {
        self.max_packet_size = size.clamp(HEADER_LEN + 1, MAX_PACKET_SIZE);
    }

    /// Current packet size bound.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Restart the outgoing sequence counter for a new message.
    pub fn rewind_sequence(&mut self) {
        self.sequence = 1;
    }

    fn next_sequence(&mut self) -> u8 {
        let id = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        if self.sequence == 0 {
            self.sequence = 1;
        }
        id
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Length sits at bytes 2-3, big-endian, and covers the header.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < HEADER_LEN {
            return Err(FramingError::InvalidHeader(tds_wire::WireError::Malformed {
                context: "packet length",
                detail: format!("{length} bytes is below the header size"),
            }));
        }
        if length > self.max_packet_size {
            return Err(FramingError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.split_to(length).freeze();
        let mut cursor = frame.clone();
        let header = PacketHeader::decode(&mut cursor)?;
        let payload = frame.slice(HEADER_LEN..);

        tracing::trace!(
            kind = ?header.kind,
            length,
            eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet { header, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = HEADER_LEN + item.payload.len();
        if total > self.max_packet_size {
            return Err(FramingError::PacketTooLarge {
                size: total,
                max: self.max_packet_size,
            });
        }

        let mut header = item.header;
        header.length = total as u16;
        header.packet_id = self.next_sequence();

        dst.reserve(total);
        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            kind = ?header.kind,
            length = total,
            packet_id = header.packet_id,
            "encoded packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tds_wire::{PacketFlags, PacketKind};

    use super::*;

    fn raw_packet(kind: u8, flags: u8, payload: &[u8]) -> BytesMut {
        let mut data = BytesMut::new();
        data.put_u8(kind);
        data.put_u8(flags);
        data.put_u16((HEADER_LEN + payload.len()) as u16);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(payload);
        data
    }

    #[test]
    fn decode_complete_packet() {
        let mut codec = PacketCodec::new();
        let mut data = raw_packet(0x04, 0x01, b"abcd");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.kind, PacketKind::TabularResult);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"abcd");
        assert!(data.is_empty());
    }

    #[test]
    fn partial_packet_waits() {
        let mut codec = PacketCodec::new();
        let mut data = raw_packet(0x04, 0x01, b"abcd");
        data.truncate(10);

        assert!(codec.decode(&mut data).unwrap().is_none());
        assert_eq!(data.len(), 10);
    }

    #[test]
    fn oversized_packet_rejected() {
        let mut codec = PacketCodec::new();
        codec.set_max_packet_size(16);
        let mut data = raw_packet(0x04, 0x01, &[0u8; 32]);

        assert!(matches!(
            codec.decode(&mut data),
            Err(FramingError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn encode_stamps_length_and_sequence() {
        let mut codec = PacketCodec::new();
        let header = PacketHeader::new(PacketKind::SqlBatch, PacketFlags::END_OF_MESSAGE, 0);

        let mut dst = BytesMut::new();
        codec
            .encode(Packet::new(header, Bytes::from_static(b"xy")), &mut dst)
            .unwrap();
        codec
            .encode(Packet::new(header, Bytes::from_static(b"z")), &mut dst)
            .unwrap();

        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 10);
        assert_eq!(dst[6], 1); // first sequence id
        assert_eq!(dst[16], 2); // second packet's sequence id
    }
}
