//! Split-I/O packet link.
//!
//! The transport is split into read and write halves so that an attention
//! (cancel) packet can go out while the reader is parked on a long result
//! stream. The write half sits behind an async mutex shared with every
//! [`AttentionHandle`] cloned off the link.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_wire::{HEADER_LEN, PacketFlags, PacketHeader, PacketKind};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::{Packet, PacketCodec};
use crate::error::FramingError;
use crate::message::{Message, MessageJoiner};

/// A framed, split TDS transport.
pub struct Link<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: FramedRead<ReadHalf<T>, PacketCodec>,
    writer: Arc<Mutex<FramedWrite<WriteHalf<T>, PacketCodec>>>,
    joiner: MessageJoiner,
    attention_sent: Arc<AtomicBool>,
}

impl<T> Link<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Split the transport and frame both halves.
    pub fn new(transport: T) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        Self {
            reader: FramedRead::new(read_half, PacketCodec::new()),
            writer: Arc::new(Mutex::new(FramedWrite::new(write_half, PacketCodec::new()))),
            joiner: MessageJoiner::new(),
            attention_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once an attention went out and its DONE ack is still owed.
    #[must_use]
    pub fn attention_pending(&self) -> bool {
        self.attention_sent.load(Ordering::Acquire)
    }

    /// Clear the attention flag after the ack was consumed.
    pub fn clear_attention(&self) {
        self.attention_sent.store(false, Ordering::Release);
    }

    /// Grow both codecs to a renegotiated packet size.
    pub async fn set_packet_size(&mut self, size: usize) {
        self.reader.decoder_mut().set_max_packet_size(size);
        self.writer.lock().await.encoder_mut().set_max_packet_size(size);
    }

    /// Read the next packet, `None` on clean EOF.
    pub async fn recv_packet(&mut self) -> Result<Option<Packet>, FramingError> {
        match self.reader.next().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// Read packets until a whole message is assembled.
    pub async fn recv_message(&mut self) -> Result<Option<Message>, FramingError> {
        loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.joiner.push(packet) {
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.joiner.in_progress() {
                        return Err(FramingError::ClosedMidMessage);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Send a complete message, fragmenting by the negotiated packet size.
    ///
    /// `reset_connection` sets the RESETCONNECTION status bit on the first
    /// packet only, which makes the server reset session state (SET
    /// options, temp tables, open transactions) before running the request.
    pub async fn send_message(
        &mut self,
        kind: PacketKind,
        payload: Bytes,
        reset_connection: bool,
    ) -> Result<(), FramingError> {
        let mut writer = self.writer.lock().await;
        writer.encoder_mut().rewind_sequence();
        let max_payload = writer.encoder().max_packet_size() - HEADER_LEN;

        let total_chunks = payload.len().div_ceil(max_payload).max(1);
        for index in 0..total_chunks {
            let start = index * max_payload;
            let end = payload.len().min(start + max_payload);
            let chunk = payload.slice(start..end);

            let mut flags = if index + 1 == total_chunks {
                PacketFlags::END_OF_MESSAGE
            } else {
                PacketFlags::empty()
            };
            if index == 0 && reset_connection {
                flags |= PacketFlags::RESET_CONNECTION;
            }

            writer
                .send(Packet::new(PacketHeader::new(kind, flags, 0), chunk))
                .await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Drop any partially assembled message, e.g. after an attention.
    pub fn reset_joiner(&mut self) {
        self.joiner.reset();
    }
}

impl<T> Link<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Handle able to fire an attention packet from another task.
    #[must_use]
    pub fn attention_handle(&self) -> AttentionHandle {
        AttentionHandle {
            writer: WriterSlot(Arc::clone(&self.writer) as _),
            attention_sent: Arc::clone(&self.attention_sent),
        }
    }
}

impl<T> std::fmt::Debug for Link<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("attention_pending", &self.attention_pending())
            .field("partial_message", &self.joiner.in_progress())
            .finish_non_exhaustive()
    }
}

/// Object-safe slot for the shared write half.
struct WriterSlot(Arc<dyn AttentionSink + Send + Sync>);

/// Minimal behavior the attention handle needs from the write half.
#[async_trait::async_trait]
trait AttentionSink {
    async fn send_attention(&self) -> Result<(), FramingError>;
}

#[async_trait::async_trait]
impl<W> AttentionSink for Mutex<FramedWrite<W, PacketCodec>>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn send_attention(&self) -> Result<(), FramingError> {
        let mut writer = self.lock().await;
        let header = PacketHeader::new(
            PacketKind::Attention,
            PacketFlags::END_OF_MESSAGE,
            HEADER_LEN as u16,
        );
        writer.send(Packet::new(header, Bytes::new())).await?;
        writer.flush().await
    }
}

/// Clonable handle that fires an attention packet on the shared write half.
pub struct AttentionHandle {
    writer: WriterSlot,
    attention_sent: Arc<AtomicBool>,
}

impl AttentionHandle {
    /// Send the attention packet. Idempotent per query: repeated calls
    /// while an ack is owed are no-ops.
    pub async fn send(&self) -> Result<(), FramingError> {
        if self.attention_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!("sending attention packet");
        self.writer.0.send_attention().await
    }

    /// True while the server's attention ack is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.attention_sent.load(Ordering::Acquire)
    }

    /// Record that the ack was consumed; the handle can fire again for the
    /// connection's next request.
    pub fn acknowledge(&self) {
        self.attention_sent.store(false, Ordering::Release);
    }
}

impl Clone for AttentionHandle {
    fn clone(&self) -> Self {
        Self {
            writer: WriterSlot(Arc::clone(&self.writer.0)),
            attention_sent: Arc::clone(&self.attention_sent),
        }
    }
}

impl std::fmt::Debug for AttentionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttentionHandle")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn message_roundtrip_over_duplex() {
        let (client, server) = duplex(4096);
        let mut client_link = Link::new(client);
        let mut server_link = Link::new(server);

        client_link
            .send_message(PacketKind::SqlBatch, Bytes::from_static(b"SELECT 1"), false)
            .await
            .unwrap();

        let message = server_link.recv_message().await.unwrap().unwrap();
        assert_eq!(message.kind, PacketKind::SqlBatch);
        assert_eq!(&message.payload[..], b"SELECT 1");
    }

    #[tokio::test]
    async fn large_message_fragments() {
        let (client, server) = duplex(1 << 20);
        let mut client_link = Link::new(client);
        client_link.set_packet_size(64).await;
        let mut server_link = Link::new(server);

        let payload = Bytes::from(vec![0xAB; 1000]);
        client_link
            .send_message(PacketKind::Rpc, payload.clone(), false)
            .await
            .unwrap();

        let mut fragments = 0;
        let mut collected = Vec::new();
        loop {
            let packet = server_link.recv_packet().await.unwrap().unwrap();
            fragments += 1;
            collected.extend_from_slice(&packet.payload);
            if packet.is_end_of_message() {
                break;
            }
        }
        assert!(fragments > 1);
        assert_eq!(collected, payload);
    }

    #[tokio::test]
    async fn reset_flag_rides_first_packet_only() {
        let (client, server) = duplex(1 << 20);
        let mut client_link = Link::new(client);
        client_link.set_packet_size(64).await;
        let mut server_link = Link::new(server);

        client_link
            .send_message(PacketKind::SqlBatch, Bytes::from(vec![1u8; 200]), true)
            .await
            .unwrap();

        let first = server_link.recv_packet().await.unwrap().unwrap();
        assert!(first.header.flags.contains(PacketFlags::RESET_CONNECTION));

        let second = server_link.recv_packet().await.unwrap().unwrap();
        assert!(!second.header.flags.contains(PacketFlags::RESET_CONNECTION));
    }

    #[tokio::test]
    async fn attention_goes_out_while_reader_parked() {
        let (client, server) = duplex(4096);
        let client_link = Link::new(client);
        let mut server_link = Link::new(server);

        let handle = client_link.attention_handle();
        handle.send().await.unwrap();
        assert!(handle.is_pending());
        // second send is a no-op
        handle.send().await.unwrap();

        let packet = server_link.recv_packet().await.unwrap().unwrap();
        assert_eq!(packet.header.kind, PacketKind::Attention);
        assert!(packet.payload.is_empty());

        // nothing else arrived
        assert!(
            futures_util::FutureExt::now_or_never(server_link.recv_packet()).is_none()
        );
    }
}
