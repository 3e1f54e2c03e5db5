//! Reassembly of packets into logical messages.
//!
//! Handshake exchanges (PRELOGIN, LOGIN7 responses) are consumed as whole
//! messages. Result streaming deliberately does NOT use this path; it pulls
//! packets one at a time to keep memory bounded.

use bytes::{Bytes, BytesMut};
use tds_wire::PacketKind;

use crate::codec::Packet;

/// A complete logical message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Packet type shared by all fragments.
    pub kind: PacketKind,
    /// Concatenated payload.
    pub payload: Bytes,
}

/// Accumulates packets until the end-of-message flag.
#[derive(Debug, Default)]
pub struct MessageJoiner {
    buffer: BytesMut,
    kind: Option<PacketKind>,
}

impl MessageJoiner {
    /// Fresh joiner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a packet; returns the finished message on the EOM packet.
    pub fn push(&mut self, packet: Packet) -> Option<Message> {
        if self.kind.is_none() {
            self.kind = Some(packet.header.kind);
        }
        self.buffer.extend_from_slice(&packet.payload);

        if packet.is_end_of_message() {
            let kind = self.kind.take()?;
            Some(Message {
                kind,
                payload: self.buffer.split().freeze(),
            })
        } else {
            None
        }
    }

    /// True while a partial message is buffered.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.kind.is_some()
    }

    /// Drop any partial state (after attention or error).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.kind = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tds_wire::{PacketFlags, PacketHeader};

    use super::*;

    fn packet(eom: bool, payload: &'static [u8]) -> Packet {
        let flags = if eom {
            PacketFlags::END_OF_MESSAGE
        } else {
            PacketFlags::empty()
        };
        Packet::new(
            PacketHeader::new(PacketKind::TabularResult, flags, 0),
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn single_packet_message() {
        let mut joiner = MessageJoiner::new();
        let message = joiner.push(packet(true, b"one")).unwrap();
        assert_eq!(message.kind, PacketKind::TabularResult);
        assert_eq!(&message.payload[..], b"one");
        assert!(!joiner.in_progress());
    }

    #[test]
    fn fragments_concatenate() {
        let mut joiner = MessageJoiner::new();
        assert!(joiner.push(packet(false, b"ab")).is_none());
        assert!(joiner.in_progress());
        let message = joiner.push(packet(true, b"cd")).unwrap();
        assert_eq!(&message.payload[..], b"abcd");
    }

    #[test]
    fn reset_discards_partial() {
        let mut joiner = MessageJoiner::new();
        joiner.push(packet(false, b"partial"));
        joiner.reset();
        assert!(!joiner.in_progress());
    }
}
