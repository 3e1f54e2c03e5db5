//! Connection lifecycle: dial, handshake, execute, recycle.
//!
//! One `Connection` owns one socket (optionally TLS-wrapped) and moves
//! through the session states:
//!
//! ```text
//! Initial -> Prelogin -> TlsHandshake -> Login -> LoggedIn -> Idle
//!                     \______________________/        |
//!                        (plaintext path)      Idle <-> Executing
//! any -> Failed (I/O or fatal server error)    any -> Closed
//! ```
//!
//! Packets never interleave: a second request cannot start until the
//! current one has drained back to `Idle`, which the `&mut self` receivers
//! enforce statically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use mssql_auth::AuthStrategy;
use mssql_framing::{AttentionHandle, Link, Packet};
use mssql_tls::{TlsConnector, TlsSettings, TlsStream};
use tds_wire::prelogin::{EncryptionLevel, PreLogin};
use tds_wire::token::{
    ColMetaData, Done, DoneFlags, EnvChange, FedAuthInfo, LoginAck, OrderToken, ServerMessage,
    TokenKind, skip_feature_ext_ack,
};
use tds_wire::{
    HEADER_LEN, Login7, PacketFlags, PacketHeader, PacketKind, encode_fedauth_token,
    encode_sql_batch, encode_sp_executesql,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{ConnectInfo, EncryptionPolicy};
use crate::error::{Error, Result};

/// Connection identity source, unique per process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Session state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, socket not yet dialed.
    Initial,
    /// PRELOGIN exchange in progress.
    Prelogin,
    /// TLS handshake inside PRELOGIN framing.
    TlsHandshake,
    /// LOGIN7 / FEDAUTH exchange in progress.
    Login,
    /// Authenticated, not yet surrendered to a caller.
    LoggedIn,
    /// Ready for a request.
    Idle,
    /// A request is executing; the token stream is being drained.
    Executing,
    /// Unusable after an I/O or protocol failure. Terminal.
    Failed,
    /// Closed by the owner. Terminal.
    Closed,
}

/// The transport under a connection; chosen during PRELOGIN.
enum Transport {
    Plain(Link<TcpStream>),
    Tls(Box<Link<TlsStream<TcpStream>>>),
}

impl Transport {
    async fn send_message(
        &mut self,
        kind: PacketKind,
        payload: Bytes,
        reset: bool,
    ) -> std::result::Result<(), mssql_framing::FramingError> {
        match self {
            Self::Plain(link) => link.send_message(kind, payload, reset).await,
            Self::Tls(link) => link.send_message(kind, payload, reset).await,
        }
    }

    async fn recv_packet(
        &mut self,
    ) -> std::result::Result<Option<Packet>, mssql_framing::FramingError> {
        match self {
            Self::Plain(link) => link.recv_packet().await,
            Self::Tls(link) => link.recv_packet().await,
        }
    }

    async fn recv_message(
        &mut self,
    ) -> std::result::Result<Option<mssql_framing::Message>, mssql_framing::FramingError> {
        match self {
            Self::Plain(link) => link.recv_message().await,
            Self::Tls(link) => link.recv_message().await,
        }
    }

    async fn set_packet_size(&mut self, size: usize) {
        match self {
            Self::Plain(link) => link.set_packet_size(size).await,
            Self::Tls(link) => link.set_packet_size(size).await,
        }
    }

    fn attention_handle(&self) -> AttentionHandle {
        match self {
            Self::Plain(link) => link.attention_handle(),
            Self::Tls(link) => link.attention_handle(),
        }
    }
}

/// What the login exchange learned about the session.
#[derive(Debug, Default)]
struct LoginOutcome {
    tds_version: Option<u32>,
    database: Option<String>,
    collation: Option<tds_wire::Collation>,
    packet_size: Option<u32>,
}

/// An authenticated SQL Server session.
pub struct Connection {
    id: u64,
    transport: Transport,
    state: SessionState,
    packet_size: usize,
    collation: Option<tds_wire::Collation>,
    database: String,
    tds_version: Option<u32>,
    last_used: Instant,
    epoch: u64,
    needs_reset: bool,
}

impl Connection {
    /// Dial, negotiate, and authenticate a new connection.
    pub async fn connect(info: &ConnectInfo) -> Result<Self> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, host = %info.host, port = info.port, "connecting");

        let mut tcp = timeout(
            info.connect_timeout,
            TcpStream::connect((info.host.as_str(), info.port)),
        )
        .await
        .map_err(|_| Error::timeout("tcp connect"))?
        .map_err(|e| Error::io("tcp connect", e))?;
        let _ = tcp.set_nodelay(true);

        // PRELOGIN rides on the raw socket; the framed link is built after
        // the transport (plain or TLS) is settled.
        let wants_fedauth = info.auth.needs_fedauth();
        let client_level = match info.encryption {
            EncryptionPolicy::Off => EncryptionLevel::NotSupported,
            EncryptionPolicy::Preferred | EncryptionPolicy::Required => EncryptionLevel::On,
        };
        let request = PreLogin::client(client_level, wants_fedauth);

        timeout(info.login_timeout, async {
            write_raw_packet(&mut tcp, PacketKind::PreLogin, &request.encode()).await
        })
        .await
        .map_err(|_| Error::timeout("prelogin"))??;

        let response_payload = timeout(info.login_timeout, read_raw_message(&mut tcp))
            .await
            .map_err(|_| Error::timeout("prelogin"))??;
        let response = PreLogin::decode(&response_payload)?;

        tracing::debug!(
            id,
            server_version = format_args!("0x{:08X}", response.version),
            encryption = ?response.encryption,
            fed_auth_required = response.fed_auth_required,
            "prelogin response"
        );

        let use_tls = negotiate_encryption(info.encryption, response.encryption)?;

        let mut transport = if use_tls {
            let settings = TlsSettings::new()
                .trust_server_certificate(info.trust_server_certificate);
            let connector = TlsConnector::new(settings)?;
            let tls = timeout(
                info.login_timeout,
                connector.connect_within_prelogin(tcp, &info.host),
            )
            .await
            .map_err(|_| Error::timeout("tls handshake"))??;
            Transport::Tls(Box::new(Link::new(tls)))
        } else {
            tracing::warn!(id, "connection is NOT encrypted");
            Transport::Plain(Link::new(tcp))
        };

        // LOGIN7, then the FEDAUTH token exchange when negotiated.
        let mut login = Login7::new();
        login.packet_size = info.packet_size;
        login.hostname = hostname();
        login.app_name = info.app_name.clone();
        login.server_name = info.host.clone();
        login.database = info.database.clone();
        login.language = info.language.clone();
        login.read_only_intent = info.read_only_intent;
        info.auth
            .apply_to_login7(&mut login, response.fed_auth_required);

        transport
            .send_message(PacketKind::Login7, login.encode(), false)
            .await?;

        let outcome = timeout(
            info.login_timeout,
            run_login_exchange(&mut transport, &info.auth),
        )
        .await
        .map_err(|_| Error::timeout("login"))??;

        let packet_size = outcome
            .packet_size
            .map_or(info.packet_size as usize, |s| s as usize);
        transport.set_packet_size(packet_size).await;

        tracing::info!(
            id,
            database = outcome.database.as_deref().unwrap_or(""),
            packet_size,
            "connection established"
        );

        Ok(Self {
            id,
            transport,
            state: SessionState::Idle,
            packet_size,
            collation: outcome.collation,
            database: outcome.database.unwrap_or_default(),
            tds_version: outcome.tds_version,
            last_used: Instant::now(),
            epoch: 0,
            needs_reset: false,
        })
    }

    /// Pool-unique identity.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session collation from the login exchange, if announced.
    #[must_use]
    pub fn collation(&self) -> Option<tds_wire::Collation> {
        self.collation
    }

    /// Current database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Negotiated TDS version word.
    #[must_use]
    pub fn tds_version(&self) -> Option<u32> {
        self.tds_version
    }

    /// Instant of the last acquisition or completion.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Monotonic acquisition epoch, maintained by the pool.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stamp a new acquisition epoch and touch the clock.
    pub fn begin_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.last_used = Instant::now();
    }

    /// Request a state reset on the next batch (RESETCONNECTION flag).
    pub fn schedule_reset(&mut self) {
        self.needs_reset = true;
    }

    /// True when the connection can accept a request.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self.state, SessionState::Idle | SessionState::LoggedIn)
    }

    /// Mark the connection permanently unusable.
    pub fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Close the connection. The socket drops with the transport.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Handle for out-of-band cancellation of the active request.
    #[must_use]
    pub fn attention_handle(&self) -> AttentionHandle {
        self.transport.attention_handle()
    }

    fn ensure_idle(&self) -> Result<()> {
        if !self.is_usable() {
            return Err(Error::Protocol(format!(
                "connection {} is {:?}, cannot execute",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Send a SQL batch and enter `Executing`. The caller must drain the
    /// response (via [`crate::ResultStream`] or [`Connection::exec`]'s
    /// internal loop) before issuing another request.
    pub async fn begin_batch(&mut self, sql: &str) -> Result<()> {
        self.ensure_idle()?;
        let reset = std::mem::take(&mut self.needs_reset);
        tracing::debug!(id = self.id, reset, sql, "sending batch");

        self.transport
            .send_message(PacketKind::SqlBatch, encode_sql_batch(sql), reset)
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.state = SessionState::Executing;
        Ok(())
    }

    /// Send an `sp_executesql` RPC with NVARCHAR parameters and enter
    /// `Executing`.
    pub async fn begin_rpc(&mut self, statement: &str, params: &[(&str, &str)]) -> Result<()> {
        self.ensure_idle()?;
        let reset = std::mem::take(&mut self.needs_reset);
        tracing::debug!(id = self.id, reset, statement, "sending rpc");

        self.transport
            .send_message(
                PacketKind::Rpc,
                encode_sp_executesql(statement, params),
                reset,
            )
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.state = SessionState::Executing;
        Ok(())
    }

    /// Read the next response packet while `Executing`.
    pub async fn recv_result_packet(&mut self) -> Result<Option<Packet>> {
        match self.transport.recv_packet().await {
            Ok(packet) => Ok(packet),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Return to `Idle` after the response stream fully drained.
    pub fn finish_execution(&mut self) {
        if self.state == SessionState::Executing {
            self.state = SessionState::Idle;
            self.last_used = Instant::now();
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.state = SessionState::Failed;
        error
    }

    /// Execute a statement and return the affected-row count from the
    /// final DONE token. Any server error raises after the stream drains.
    pub async fn exec(&mut self, sql: &str) -> Result<u64> {
        self.begin_batch(sql).await?;
        self.consume_to_done().await
    }

    /// Health probe: `SELECT 1` with a short deadline.
    pub async fn ping(&mut self, deadline: Duration) -> Result<()> {
        match timeout(deadline, self.exec("SELECT 1")).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(self.fail(Error::timeout("health probe"))),
        }
    }

    /// Drain the current response to its final DONE, collecting row counts
    /// and deferring server errors to the end.
    async fn consume_to_done(&mut self) -> Result<u64> {
        let mut rows = 0u64;
        let mut pending_error: Option<Error> = None;
        let mut current_meta: Option<ColMetaData> = None;

        loop {
            let message = match self.transport.recv_message().await {
                Ok(Some(m)) => m,
                Ok(None) => return Err(self.fail(Error::Protocol("EOF before DONE".into()))),
                Err(e) => return Err(self.fail(e.into())),
            };

            let mut buf = message.payload;
            let mut finished = false;
            while buf.has_remaining() {
                let token_byte = buf.get_u8();
                let kind = TokenKind::from_u8(token_byte).map_err(|e| self.fail(e.into()))?;
                match kind {
                    TokenKind::Done | TokenKind::DoneProc | TokenKind::DoneInProc => {
                        let done = Done::decode(&mut buf).map_err(|e| self.fail(e.into()))?;
                        if done.flags.contains(DoneFlags::COUNT) {
                            rows = done.row_count;
                        }
                        if kind == TokenKind::Done && !done.has_more() {
                            finished = true;
                        }
                    }
                    TokenKind::Error => {
                        let msg =
                            ServerMessage::decode(&mut buf).map_err(|e| self.fail(e.into()))?;
                        if pending_error.is_none() {
                            pending_error = Some(Error::from_server_message(&msg));
                        }
                    }
                    TokenKind::Info => {
                        let msg =
                            ServerMessage::decode(&mut buf).map_err(|e| self.fail(e.into()))?;
                        tracing::debug!(number = msg.number, message = %msg.message, "server info");
                    }
                    TokenKind::EnvChange => {
                        let change =
                            EnvChange::decode(&mut buf).map_err(|e| self.fail(e.into()))?;
                        self.apply_env_change(&change).await;
                    }
                    TokenKind::ColMetaData => {
                        current_meta =
                            Some(ColMetaData::decode(&mut buf).map_err(|e| self.fail(e.into()))?);
                    }
                    TokenKind::Order => {
                        OrderToken::decode(&mut buf).map_err(|e| self.fail(e.into()))?;
                    }
                    TokenKind::ReturnStatus => {
                        if buf.remaining() < 4 {
                            return Err(self.fail(Error::Protocol(
                                "truncated RETURNSTATUS".into(),
                            )));
                        }
                        buf.advance(4);
                    }
                    // exec discards any rows the statement happens to
                    // produce; they still must be walked to stay in sync.
                    TokenKind::Row => {
                        let Some(meta) = current_meta.as_ref() else {
                            return Err(self.fail(Error::Protocol(
                                "ROW before COLMETADATA".into(),
                            )));
                        };
                        mssql_values::decode_row(meta, &mut buf)
                            .map_err(|e| self.fail(e.into()))?;
                    }
                    TokenKind::NbcRow => {
                        let Some(meta) = current_meta.as_ref() else {
                            return Err(self.fail(Error::Protocol(
                                "NBCROW before COLMETADATA".into(),
                            )));
                        };
                        mssql_values::decode_nbc_row(meta, &mut buf)
                            .map_err(|e| self.fail(e.into()))?;
                    }
                    other => {
                        return Err(self.fail(Error::Protocol(format!(
                            "unexpected token {other:?} in exec response"
                        ))));
                    }
                }
            }

            if finished {
                self.finish_execution();
                return match pending_error {
                    Some(e) => Err(e),
                    None => Ok(rows),
                };
            }
        }
    }

    async fn apply_env_change(&mut self, change: &EnvChange) {
        match change {
            EnvChange::Database { new, .. } => {
                self.database = new.clone();
            }
            EnvChange::PacketSize { size } => {
                self.packet_size = *size as usize;
                self.transport.set_packet_size(self.packet_size).await;
            }
            EnvChange::SqlCollation { collation } => {
                self.collation = *collation;
            }
            EnvChange::ResetAck | EnvChange::Language { .. } | EnvChange::Other { .. } => {}
        }
    }

    /// Apply a session-state token observed by the result stream.
    pub(crate) async fn note_env_change(&mut self, change: &EnvChange) {
        self.apply_env_change(change).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("database", &self.database)
            .field("packet_size", &self.packet_size)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Encryption negotiation matrix for the PRELOGIN answer.
fn negotiate_encryption(
    policy: EncryptionPolicy,
    server: EncryptionLevel,
) -> Result<bool> {
    match (policy, server) {
        (EncryptionPolicy::Off, EncryptionLevel::NotSupported | EncryptionLevel::Off) => Ok(false),
        (EncryptionPolicy::Off, _) => Err(Error::Protocol(
            "server requires encryption but encrypt=off was requested. Use encrypt=preferred or required"
                .into(),
        )),
        (EncryptionPolicy::Preferred, EncryptionLevel::NotSupported) => Ok(false),
        (EncryptionPolicy::Required, EncryptionLevel::NotSupported) => Err(Error::Protocol(
            "server does not support encryption but encrypt=required was requested".into(),
        )),
        _ => Ok(true),
    }
}

/// LOGIN7 has been sent; drive tokens until the final DONE, answering a
/// FEDAUTHINFO with the bearer token message.
async fn run_login_exchange(
    transport: &mut Transport,
    auth: &AuthStrategy,
) -> Result<LoginOutcome> {
    let mut outcome = LoginOutcome::default();

    loop {
        let message = transport
            .recv_message()
            .await?
            .ok_or_else(|| Error::Protocol("connection closed during login".into()))?;

        if message.kind != PacketKind::TabularResult {
            return Err(Error::Protocol(format!(
                "unexpected {:?} message during login",
                message.kind
            )));
        }

        let mut buf = message.payload;
        let mut fedauth_request: Option<FedAuthInfo> = None;
        let mut done = false;

        while buf.has_remaining() {
            let token_byte = buf.get_u8();
            match TokenKind::from_u8(token_byte)? {
                TokenKind::LoginAck => {
                    let ack = LoginAck::decode(&mut buf)?;
                    tracing::debug!(
                        tds_version = format_args!("0x{:08X}", ack.tds_version),
                        server = %ack.prog_name,
                        "login acknowledged"
                    );
                    outcome.tds_version = Some(ack.tds_version);
                }
                TokenKind::EnvChange => match EnvChange::decode(&mut buf)? {
                    EnvChange::Database { new, .. } => outcome.database = Some(new),
                    EnvChange::PacketSize { size } => outcome.packet_size = Some(size),
                    EnvChange::SqlCollation { collation } => outcome.collation = collation,
                    _ => {}
                },
                TokenKind::Info => {
                    let msg = ServerMessage::decode(&mut buf)?;
                    tracing::debug!(number = msg.number, message = %msg.message, "login info");
                }
                TokenKind::Error => {
                    let msg = ServerMessage::decode(&mut buf)?;
                    // 18456 is the canonical login-failed number.
                    if msg.number == 18456 {
                        return Err(Error::Auth(mssql_auth::AuthError::Negotiation(format!(
                            "login failed for the supplied principal: {}",
                            msg.message
                        ))));
                    }
                    return Err(Error::from_server_message(&msg));
                }
                TokenKind::FedAuthInfo => {
                    fedauth_request = Some(FedAuthInfo::decode(&mut buf)?);
                }
                TokenKind::FeatureExtAck => {
                    skip_feature_ext_ack(&mut buf)?;
                }
                TokenKind::Done | TokenKind::DoneProc | TokenKind::DoneInProc => {
                    let token = Done::decode(&mut buf)?;
                    if token.flags.contains(DoneFlags::ERROR) {
                        return Err(Error::Protocol("login rejected by server".into()));
                    }
                    done = true;
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected token {other:?} during login"
                    )));
                }
            }
        }

        if let Some(info) = fedauth_request {
            if !auth.needs_fedauth() {
                return Err(Error::Auth(mssql_auth::AuthError::Negotiation(
                    "server requested federated authentication but none was configured".into(),
                )));
            }
            tracing::debug!(sts = %info.sts_url, spn = %info.spn, "sending federated auth token");
            let token = auth.fetch_token().await?;
            transport
                .send_message(
                    PacketKind::FedAuthToken,
                    encode_fedauth_token(&token.secret, None),
                    false,
                )
                .await?;
            continue;
        }

        if done {
            return Ok(outcome);
        }
    }
}

/// Write one packet directly on the socket, before any link exists.
async fn write_raw_packet(
    tcp: &mut TcpStream,
    kind: PacketKind,
    payload: &[u8],
) -> Result<()> {
    let header = PacketHeader::new(
        kind,
        PacketFlags::END_OF_MESSAGE,
        (HEADER_LEN + payload.len()) as u16,
    );

    let mut frame = bytes::BytesMut::with_capacity(HEADER_LEN + payload.len());
    header.encode(&mut frame);
    frame.extend_from_slice(payload);

    tcp.write_all(&frame)
        .await
        .map_err(|e| Error::io("prelogin write", e))?;
    tcp.flush().await.map_err(|e| Error::io("prelogin write", e))
}

/// Read one full message directly off the socket (PRELOGIN responses fit
/// in a single packet, but fragmentation is handled anyway).
async fn read_raw_message(tcp: &mut TcpStream) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; HEADER_LEN];
        tcp.read_exact(&mut header)
            .await
            .map_err(|e| Error::io("prelogin read", e))?;

        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        if length < HEADER_LEN {
            return Err(Error::Protocol("prelogin packet shorter than header".into()));
        }

        let mut chunk = vec![0u8; length - HEADER_LEN];
        tcp.read_exact(&mut chunk)
            .await
            .map_err(|e| Error::io("prelogin read", e))?;
        payload.extend_from_slice(&chunk);

        if header[1] & PacketFlags::END_OF_MESSAGE.bits() != 0 {
            return Ok(payload);
        }
    }
}

/// Client machine name for LOGIN7.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
