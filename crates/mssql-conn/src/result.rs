//! Streaming result delivery.
//!
//! A [`ResultStream`] owns a connection in `Executing` state and pulls the
//! TABULAR_RESULT token stream packet by packet: rows are decoded into one
//! engine-sized [`RowBatch`] and control returns to the host, preserving
//! back-pressure. Server errors are captured and deferred until the rows
//! that preceded them have been consumed; protocol and I/O errors poison
//! the connection immediately.

use bytes::{Buf, BytesMut};
use mssql_framing::AttentionHandle;
use mssql_values::{SqlValue, decode_nbc_row, decode_row};
use tds_wire::token::{
    ColMetaData, Done, DoneFlags, EnvChange, OrderToken, ServerMessage, TokenKind,
};
use tds_wire::PacketKind;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::row::{ColumnMeta, RowBatch};

/// Stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Active,
    Finished,
    Cancelled,
}

/// One decoded token, produced without touching stream state.
enum ParsedToken {
    Metadata(ColMetaData),
    Row(Vec<SqlValue>),
    ServerError(ServerMessage),
    Info(ServerMessage),
    Env(EnvChange),
    Done(Done, TokenKind),
    Skipped,
}

/// A pull-based row stream over an executing connection.
///
/// `C` is any exclusive handle to a [`Connection`] (`&mut Connection`, a
/// pool guard, ...). Exactly one consumer drains a stream; the `&mut self`
/// receivers enforce that.
pub struct ResultStream<C>
where
    C: std::ops::DerefMut<Target = Connection>,
{
    conn: C,
    attention: AttentionHandle,
    buffer: BytesMut,
    response_complete: bool,
    meta: Option<ColMetaData>,
    columns: Vec<ColumnMeta>,
    /// Bind-time schema snapshot; decode-time drift raises a protocol error.
    expected: Option<Vec<ColumnMeta>>,
    /// Whether a COLMETADATA after DONE_MORE may replace the shape.
    allow_shape_change: bool,
    pending_error: Option<Error>,
    state: StreamState,
}

impl<C> ResultStream<C>
where
    C: std::ops::DerefMut<Target = Connection>,
{
    /// Wrap an executing connection.
    ///
    /// `expected` is the bind-time column snapshot for scans; passthrough
    /// queries pass `None` and set `allow_shape_change` so each result set
    /// may carry its own metadata.
    #[must_use]
    pub fn new(conn: C, expected: Option<Vec<ColumnMeta>>, allow_shape_change: bool) -> Self {
        let attention = conn.attention_handle();
        Self {
            conn,
            attention,
            buffer: BytesMut::new(),
            response_complete: false,
            meta: None,
            columns: Vec::new(),
            expected,
            allow_shape_change,
            pending_error: None,
            state: StreamState::Active,
        }
    }

    /// Column metadata; populated once the first COLMETADATA arrived.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// True once the stream is fully drained or cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, StreamState::Finished | StreamState::Cancelled)
    }

    /// Give the connection back once the stream is done.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Pull the next batch of at most `max_rows` rows.
    ///
    /// Returns `Ok(None)` at end of stream. A deferred server error is
    /// raised on the call after the rows preceding it were delivered.
    pub async fn next_batch(&mut self, max_rows: usize) -> Result<Option<RowBatch>> {
        match self.state {
            StreamState::Cancelled => return Err(Error::Cancelled),
            StreamState::Finished => {
                return match self.pending_error.take() {
                    Some(e) => Err(e),
                    None => Ok(None),
                };
            }
            StreamState::Active => {}
        }

        let mut batch = RowBatch::new(self.columns.clone());

        loop {
            // Phase 1: parse one token from the buffer without mutating
            // stream state.
            let step = parse_token(&self.buffer, self.meta.as_ref());

            let (token, consumed) = match step {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    if self.buffer.is_empty() && self.response_complete {
                        self.state = StreamState::Finished;
                        self.conn.finish_execution();
                        if !batch.is_empty() {
                            return Ok(Some(batch));
                        }
                        return match self.pending_error.take() {
                            Some(e) => Err(e),
                            None => Ok(None),
                        };
                    }
                    if self.response_complete {
                        self.conn.mark_failed();
                        return Err(Error::Protocol(
                            "response ended with a partial token".into(),
                        ));
                    }
                    self.fill_buffer().await?;
                    continue;
                }
                Err(e) => {
                    self.conn.mark_failed();
                    return Err(e);
                }
            };

            // Phase 2: apply the token.
            self.buffer.advance(consumed);
            match token {
                ParsedToken::Metadata(meta) => {
                    if self.meta.is_none() {
                        self.install_metadata(meta)?;
                        if batch.columns().is_empty() {
                            batch = RowBatch::new(self.columns.clone());
                        }
                    } else if self.allow_shape_change {
                        // New result set; flush pending rows first, the
                        // replacement shape takes over on the next pull.
                        let had_rows = !batch.is_empty();
                        self.meta = None;
                        self.install_metadata(meta)?;
                        if had_rows {
                            return Ok(Some(batch));
                        }
                        batch = RowBatch::new(self.columns.clone());
                    } else {
                        // Scans bind one shape; a change is a protocol
                        // violation. Rows decoded before the change are
                        // still delivered, the error follows them.
                        self.conn.mark_failed();
                        let err =
                            Error::Protocol("column metadata changed mid-query".into());
                        if batch.is_empty() {
                            return Err(err);
                        }
                        self.pending_error = Some(err);
                        self.state = StreamState::Finished;
                        return Ok(Some(batch));
                    }
                }
                ParsedToken::Row(values) => {
                    batch.push_row(values);
                    if batch.len() >= max_rows {
                        return Ok(Some(batch));
                    }
                }
                ParsedToken::ServerError(msg) => {
                    tracing::debug!(
                        number = msg.number,
                        message = %msg.message,
                        "deferred server error"
                    );
                    if self.pending_error.is_none() {
                        self.pending_error = Some(Error::from_server_message(&msg));
                    }
                }
                ParsedToken::Info(msg) => {
                    tracing::debug!(number = msg.number, message = %msg.message, "server info");
                }
                ParsedToken::Env(change) => {
                    self.conn.note_env_change(&change).await;
                }
                ParsedToken::Done(done, kind) => {
                    if done.acknowledges_attention() {
                        // Silent ack of a previously cancelled request.
                        continue;
                    }
                    if kind == TokenKind::Done && !done.has_more() {
                        self.state = StreamState::Finished;
                        self.conn.finish_execution();
                        if !batch.is_empty() {
                            return Ok(Some(batch));
                        }
                        return match self.pending_error.take() {
                            Some(e) => Err(e),
                            None => Ok(None),
                        };
                    }
                }
                ParsedToken::Skipped => {}
            }
        }
    }

    /// Cancel the query: fire an attention and drain until the server's
    /// DONE acknowledgment. The connection returns to `Idle` and stays
    /// reusable; subsequent pulls report [`Error::Cancelled`].
    pub async fn cancel(&mut self) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }

        self.attention.send().await.map_err(|e| {
            self.conn.mark_failed();
            Error::from(e)
        })?;

        // The server may cut the stream mid-token, so the drain scans raw
        // packet bytes for a DONE carrying the attention-ack flag instead
        // of tokenizing.
        if !scan_attention_ack(&self.buffer) {
            loop {
                let packet = self
                    .conn
                    .recv_result_packet()
                    .await?
                    .ok_or_else(|| Error::Protocol("EOF while awaiting attention ack".into()))?;
                if packet.header.kind == PacketKind::TabularResult
                    && scan_attention_ack(&packet.payload)
                {
                    break;
                }
            }
        }

        self.buffer.clear();
        self.state = StreamState::Cancelled;
        self.attention.acknowledge();
        self.conn.finish_execution();
        tracing::debug!("attention acknowledged, stream cancelled");
        Ok(())
    }

    /// Pull one more packet into the reassembly buffer.
    async fn fill_buffer(&mut self) -> Result<()> {
        let packet = self
            .conn
            .recv_result_packet()
            .await?
            .ok_or_else(|| Error::Protocol("connection closed mid-result".into()))?;

        if packet.header.kind != PacketKind::TabularResult {
            self.conn.mark_failed();
            return Err(Error::Protocol(format!(
                "expected TABULAR_RESULT packet, got {:?}",
                packet.header.kind
            )));
        }

        if packet.is_end_of_message() {
            self.response_complete = true;
        }
        self.buffer.extend_from_slice(&packet.payload);
        Ok(())
    }

    /// Attach new column metadata, validating against the bind snapshot.
    fn install_metadata(&mut self, meta: ColMetaData) -> Result<()> {
        let columns = ColumnMeta::from_metadata(&meta);

        if let Some(expected) = &self.expected {
            let matches = expected.len() == columns.len()
                && expected
                    .iter()
                    .zip(&columns)
                    .all(|(want, got)| want.matches(got));
            if !matches {
                self.conn.mark_failed();
                return Err(Error::Protocol(format!(
                    "result shape differs from bound schema: expected {} columns, got {}",
                    expected.len(),
                    columns.len()
                )));
            }
        }

        self.columns = columns;
        self.meta = Some(meta);
        Ok(())
    }
}

/// Look for a DONE token (0xFD) whose status word has the attention-ack
/// bit. The 13-byte token always lands intact within one packet.
fn scan_attention_ack(payload: &[u8]) -> bool {
    payload.windows(3).any(|w| {
        w[0] == TokenKind::Done as u8
            && DoneFlags::from_bits_retain(u16::from_le_bytes([w[1], w[2]]))
                .contains(DoneFlags::ATTENTION)
    })
}

/// Parse one token from the front of `buffer`.
///
/// Returns `Ok(None)` when the buffer holds only a partial token, and the
/// number of bytes consumed otherwise. Pure with respect to stream state so
/// the caller can decide how to apply the result.
fn parse_token(
    buffer: &[u8],
    meta: Option<&ColMetaData>,
) -> Result<Option<(ParsedToken, usize)>> {
    if buffer.is_empty() {
        return Ok(None);
    }

    let mut cursor = buffer;
    let token_byte = cursor.get_u8();
    let kind = TokenKind::from_u8(token_byte)?;

    let incomplete = |e: tds_wire::WireError| -> Result<Option<(ParsedToken, usize)>> {
        if e.is_incomplete() {
            Ok(None)
        } else {
            Err(e.into())
        }
    };

    let token = match kind {
        TokenKind::ColMetaData => match ColMetaData::decode(&mut cursor) {
            Ok(meta) => ParsedToken::Metadata(meta),
            Err(e) => return incomplete(e),
        },
        TokenKind::Row => {
            let Some(meta) = meta else {
                return Err(Error::Protocol("ROW before COLMETADATA".into()));
            };
            match decode_row(meta, &mut cursor) {
                Ok(values) => ParsedToken::Row(values),
                Err(e) if e.is_incomplete() => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        TokenKind::NbcRow => {
            let Some(meta) = meta else {
                return Err(Error::Protocol("NBCROW before COLMETADATA".into()));
            };
            match decode_nbc_row(meta, &mut cursor) {
                Ok(values) => ParsedToken::Row(values),
                Err(e) if e.is_incomplete() => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        TokenKind::Error => match ServerMessage::decode(&mut cursor) {
            Ok(msg) => ParsedToken::ServerError(msg),
            Err(e) => return incomplete(e),
        },
        TokenKind::Info => match ServerMessage::decode(&mut cursor) {
            Ok(msg) => ParsedToken::Info(msg),
            Err(e) => return incomplete(e),
        },
        TokenKind::EnvChange => match EnvChange::decode(&mut cursor) {
            Ok(change) => ParsedToken::Env(change),
            Err(e) => return incomplete(e),
        },
        TokenKind::Order => match OrderToken::decode(&mut cursor) {
            Ok(_) => ParsedToken::Skipped,
            Err(e) => return incomplete(e),
        },
        TokenKind::ReturnStatus => {
            if cursor.remaining() < 4 {
                return Ok(None);
            }
            cursor.advance(4);
            ParsedToken::Skipped
        }
        TokenKind::Done | TokenKind::DoneProc | TokenKind::DoneInProc => {
            match Done::decode(&mut cursor) {
                Ok(done) => ParsedToken::Done(done, kind),
                Err(e) => return incomplete(e),
            }
        }
        other => {
            return Err(Error::Protocol(format!(
                "unexpected token {other:?} in result stream"
            )));
        }
    };

    let consumed = buffer.len() - cursor.remaining();
    Ok(Some((token, consumed)))
}
