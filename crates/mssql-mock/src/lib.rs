//! Scripted SQL Server double for integration tests.
//!
//! Listens on a loopback port, performs a plaintext TDS handshake (the
//! client must dial with `encrypt=off`), then answers each incoming
//! request with the next scripted [`Reply`]. Only the server-side subset
//! the federation core exercises is implemented.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HEADER_LEN: usize = 8;
const KIND_TABULAR: u8 = 0x04;
const KIND_ATTENTION: u8 = 0x06;
const KIND_PRELOGIN: u8 = 0x12;
const FLAG_EOM: u8 = 0x01;

/// One scripted answer to a client request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Send this token stream as a complete response.
    Tokens(Bytes),
    /// Send `meta`, then repeat `row` until an attention packet arrives,
    /// then acknowledge with DONE|ATTN.
    RowsUntilAttention {
        /// COLMETADATA token bytes.
        meta: Bytes,
        /// One ROW token to repeat.
        row: Bytes,
    },
}

/// A running scripted server.
pub struct ScriptedServer {
    /// The loopback address to dial.
    pub addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ScriptedServer {
    /// Spawn a server answering requests with `replies`, in order.
    pub async fn spawn(replies: Vec<Reply>) -> Self {
        Self::spawn_with_default(replies, None).await
    }

    /// Spawn a server that falls back to `default` once the scripted
    /// replies run out (useful for repeated health probes). Accepts any
    /// number of connections; the script queue is shared across them.
    pub async fn spawn_with_default(replies: Vec<Reply>, default: Option<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(Mutex::new(VecDeque::from(replies)));

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                socket.set_nodelay(true).ok();
                let queue = Arc::clone(&queue);
                let default = default.clone();
                tokio::spawn(async move {
                    serve(&mut socket, &queue, default.as_ref()).await;
                });
            }
        });

        Self { addr, handle }
    }

    /// Stop the server task.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn serve(
    socket: &mut TcpStream,
    queue: &Mutex<VecDeque<Reply>>,
    default: Option<&Reply>,
) {
    // PRELOGIN: read the request, answer "no encryption".
    let (kind, _payload) = read_message(socket).await.expect("prelogin request");
    assert_eq!(kind, KIND_PRELOGIN, "expected PRELOGIN first");
    write_message(socket, KIND_PRELOGIN, &prelogin_response()).await;

    // LOGIN7: accept anything, acknowledge.
    let (kind, _payload) = read_message(socket).await.expect("login request");
    assert_eq!(kind, 0x10, "expected LOGIN7");
    write_message(socket, KIND_TABULAR, &login_response()).await;

    loop {
        let Some((kind, _payload)) = read_message(socket).await else {
            return; // client hung up
        };
        if kind == KIND_ATTENTION {
            // Attention with no active query: acknowledge and move on.
            write_message(socket, KIND_TABULAR, &done_attention_ack()).await;
            continue;
        }

        let reply = queue
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| default.cloned());
        match reply {
            Some(Reply::Tokens(tokens)) => {
                write_message(socket, KIND_TABULAR, &tokens).await;
            }
            Some(Reply::RowsUntilAttention { meta, row }) => {
                stream_until_attention(socket, &meta, &row).await;
            }
            None => panic!("client sent a request beyond the script"),
        }
    }
}

/// Send metadata, then row packets without EOM until attention arrives.
async fn stream_until_attention(socket: &mut TcpStream, meta: &Bytes, row: &Bytes) {
    write_packet(socket, KIND_TABULAR, meta, false).await;

    loop {
        // A packet full of rows.
        let mut chunk = BytesMut::new();
        while chunk.len() + row.len() < 3000 {
            chunk.extend_from_slice(row);
        }
        write_packet(socket, KIND_TABULAR, &chunk, false).await;

        // Poll briefly for an attention packet between flights.
        match tokio::time::timeout(Duration::from_millis(10), read_message(socket)).await {
            Ok(Some((kind, _))) if kind == KIND_ATTENTION => {
                write_message(socket, KIND_TABULAR, &done_attention_ack()).await;
                return;
            }
            Ok(Some(_)) => panic!("unexpected request while streaming"),
            Ok(None) => return,
            Err(_) => {} // keep streaming
        }
    }
}

async fn read_message(socket: &mut TcpStream) -> Option<(u8, Bytes)> {
    let mut payload = BytesMut::new();
    loop {
        let mut header = [0u8; HEADER_LEN];
        if socket.read_exact(&mut header).await.is_err() {
            return None;
        }
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut chunk = vec![0u8; length - HEADER_LEN];
        socket.read_exact(&mut chunk).await.ok()?;
        payload.extend_from_slice(&chunk);
        if header[1] & FLAG_EOM != 0 {
            return Some((header[0], payload.freeze()));
        }
    }
}

async fn write_packet(socket: &mut TcpStream, kind: u8, payload: &[u8], eom: bool) {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u8(kind);
    frame.put_u8(if eom { FLAG_EOM } else { 0 });
    frame.put_u16((HEADER_LEN + payload.len()) as u16);
    frame.put_u16(0);
    frame.put_u8(1);
    frame.put_u8(0);
    frame.put_slice(payload);
    socket.write_all(&frame).await.unwrap();
    socket.flush().await.unwrap();
}

async fn write_message(socket: &mut TcpStream, kind: u8, payload: &[u8]) {
    // Fragment at the default packet size like a real server.
    let max_payload = 4096 - HEADER_LEN;
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(max_payload).collect()
    };
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        write_packet(socket, kind, chunk, i == last).await;
    }
}

// =============================================================================
// Token builders (server-side encodings)
// =============================================================================

fn prelogin_response() -> Bytes {
    let mut buf = BytesMut::new();
    let header = 3 * 5 + 1;
    // VERSION
    buf.put_u8(0x00);
    buf.put_u16(header);
    buf.put_u16(6);
    // ENCRYPTION
    buf.put_u8(0x01);
    buf.put_u16(header + 6);
    buf.put_u16(1);
    // FEDAUTHREQUIRED
    buf.put_u8(0x06);
    buf.put_u16(header + 7);
    buf.put_u16(1);
    buf.put_u8(0xFF);
    buf.put_u32(0x1000_0000); // 16.0
    buf.put_u16_le(0);
    buf.put_u8(0x02); // ENCRYPT_NOT_SUP
    buf.put_u8(0x00);
    buf.freeze()
}

fn put_b_varchar(buf: &mut BytesMut, s: &str) {
    buf.put_u8(s.encode_utf16().count() as u8);
    for u in s.encode_utf16() {
        buf.put_u16_le(u);
    }
}

fn login_response() -> Bytes {
    let mut buf = BytesMut::new();

    // ENVCHANGE: database master -> scratch
    let mut env = BytesMut::new();
    env.put_u8(1);
    put_b_varchar(&mut env, "scratch");
    put_b_varchar(&mut env, "master");
    buf.put_u8(0xE3);
    buf.put_u16_le(env.len() as u16);
    buf.extend_from_slice(&env);

    // LOGINACK
    let mut ack = BytesMut::new();
    ack.put_u8(1); // interface
    ack.put_u32_le(0x7400_0004);
    put_b_varchar(&mut ack, "Scripted SQL Server");
    ack.put_u32_le(0x1000_0000);
    buf.put_u8(0xAD);
    buf.put_u16_le(ack.len() as u16);
    buf.extend_from_slice(&ack);

    buf.extend_from_slice(&done_final(0, false));
    buf.freeze()
}

/// DONE with optional COUNT flag.
#[must_use]
pub fn done_final(rows: u64, with_count: bool) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xFD);
    buf.put_u16_le(if with_count { 0x0010 } else { 0x0000 });
    buf.put_u16_le(0xC1);
    buf.put_u64_le(rows);
    buf.freeze()
}

/// DONE with the MORE flag (another result set follows).
#[must_use]
pub fn done_more(rows: u64) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xFD);
    buf.put_u16_le(0x0011); // MORE | COUNT
    buf.put_u16_le(0xC1);
    buf.put_u64_le(rows);
    buf.freeze()
}

/// DONE acknowledging an attention.
#[must_use]
pub fn done_attention_ack() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xFD);
    buf.put_u16_le(0x0020);
    buf.put_u16_le(0);
    buf.put_u64_le(0);
    buf.freeze()
}

/// ERROR token.
#[must_use]
pub fn error_token(number: i32, class: u8, message: &str) -> Bytes {
    let mut body = BytesMut::new();
    body.put_i32_le(number);
    body.put_u8(1); // state
    body.put_u8(class);
    body.put_u16_le(message.encode_utf16().count() as u16);
    for u in message.encode_utf16() {
        body.put_u16_le(u);
    }
    put_b_varchar(&mut body, "scripted");
    put_b_varchar(&mut body, "");
    body.put_i32_le(1);

    let mut buf = BytesMut::new();
    buf.put_u8(0xAA);
    buf.put_u16_le(body.len() as u16);
    buf.extend_from_slice(&body);
    buf.freeze()
}

/// Column description for [`colmeta`].
#[derive(Debug, Clone, Copy)]
pub enum MockCol {
    /// INT NOT NULL.
    Int(&'static str),
    /// Nullable INT (wire type INTN).
    IntN(&'static str),
    /// NVARCHAR(n) NULL with the given collation info word.
    NVarChar(&'static str, u16, u32),
}

/// COLMETADATA token for the given columns.
#[must_use]
pub fn colmeta(cols: &[MockCol]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x81);
    buf.put_u16_le(cols.len() as u16);
    for col in cols {
        buf.put_u32_le(0); // usertype
        match col {
            MockCol::Int(name) => {
                buf.put_u16_le(0x0000);
                buf.put_u8(0x38); // INT4
                put_b_varchar(&mut buf, name);
            }
            MockCol::IntN(name) => {
                buf.put_u16_le(0x0001);
                buf.put_u8(0x26); // INTN
                buf.put_u8(4);
                put_b_varchar(&mut buf, name);
            }
            MockCol::NVarChar(name, chars, collation_info) => {
                buf.put_u16_le(0x0001);
                buf.put_u8(0xE7); // NVARCHAR
                buf.put_u16_le(chars * 2);
                buf.put_u32_le(*collation_info);
                buf.put_u8(0);
                put_b_varchar(&mut buf, name);
            }
        }
    }
    buf.freeze()
}

/// Value inside a [`row`].
#[derive(Debug, Clone)]
pub enum MockVal {
    /// INT value (matches [`MockCol::Int`]).
    Int(i32),
    /// NVARCHAR value (matches [`MockCol::NVarChar`]).
    NStr(&'static str),
    /// NULL in an NVARCHAR column.
    NNull,
    /// Nullable INT value (matches [`MockCol::IntN`]).
    NInt(Option<i32>),
}

/// ROW token for the given values.
#[must_use]
pub fn row(values: &[MockVal]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xD1);
    for value in values {
        match value {
            MockVal::Int(v) => buf.put_i32_le(*v),
            MockVal::NStr(s) => {
                buf.put_u16_le((s.encode_utf16().count() * 2) as u16);
                for u in s.encode_utf16() {
                    buf.put_u16_le(u);
                }
            }
            MockVal::NNull => buf.put_u16_le(0xFFFF),
            MockVal::NInt(Some(v)) => {
                buf.put_u8(4);
                buf.put_i32_le(*v);
            }
            MockVal::NInt(None) => buf.put_u8(0),
        }
    }
    buf.freeze()
}

/// Concatenate token byte blocks into one response stream.
#[must_use]
pub fn tokens(parts: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::new();
    for part in parts {
        buf.extend_from_slice(part);
    }
    buf.freeze()
}

/// Canned `SELECT 1` response, the shape health probes expect.
#[must_use]
pub fn select1_reply() -> Reply {
    Reply::Tokens(tokens(&[
        colmeta(&[MockCol::Int("")]),
        row(&[MockVal::Int(1)]),
        done_final(1, true),
    ]))
}

/// Case-insensitive Latin1 collation info word (en-US, CI).
pub const COLLATION_CI: u32 = 0x0010_0409;

/// Case-sensitive Latin1 collation info word (en-US, CS).
pub const COLLATION_CS: u32 = 0x0000_0409;
