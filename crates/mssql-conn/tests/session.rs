//! Session-layer integration against the scripted server.

#![allow(clippy::unwrap_used)]

use mssql_auth::AuthStrategy;
use mssql_conn::{ConnectInfo, Connection, EncryptionPolicy, Error, ResultStream, SessionState};
use mssql_mock::{
    COLLATION_CI, MockCol, MockVal, Reply, ScriptedServer, colmeta, done_final, done_more,
    error_token, row, tokens,
};
use mssql_values::SqlValue;

fn connect_info(addr: std::net::SocketAddr) -> ConnectInfo {
    let mut info = ConnectInfo::new(addr.ip().to_string());
    info.port = addr.port();
    info.database = "scratch".into();
    info.auth = AuthStrategy::sql("reader", "pw");
    info.encryption = EncryptionPolicy::Off;
    info
}

fn two_column_meta() -> bytes::Bytes {
    colmeta(&[
        MockCol::Int("id"),
        MockCol::NVarChar("name", 20, COLLATION_CI),
    ])
}

#[tokio::test]
async fn handshake_reaches_idle() {
    let server = ScriptedServer::spawn(vec![]).await;
    let conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    assert_eq!(conn.state(), SessionState::Idle);
    assert_eq!(conn.database(), "scratch");
    assert!(conn.tds_version().is_some());
    server.shutdown();
}

#[tokio::test]
async fn exec_returns_affected_rows() {
    let server = ScriptedServer::spawn(vec![Reply::Tokens(done_final(3, true))]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    let rows = conn.exec("DELETE FROM t WHERE x < 3").await.unwrap();
    assert_eq!(rows, 3);
    assert_eq!(conn.state(), SessionState::Idle);
    server.shutdown();
}

#[tokio::test]
async fn exec_surfaces_server_error() {
    let server = ScriptedServer::spawn(vec![Reply::Tokens(tokens(&[
        error_token(208, 16, "Invalid object name 'dbo.missing'."),
        done_final(0, false),
    ]))])
    .await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    let err = conn.exec("SELECT * FROM dbo.missing").await.unwrap_err();
    match err {
        Error::Remote {
            number, message, ..
        } => {
            assert_eq!(number, 208);
            assert!(message.contains("dbo.missing"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // The error was a clean server response; the connection survives.
    assert_eq!(conn.state(), SessionState::Idle);
    server.shutdown();
}

#[tokio::test]
async fn stream_yields_rows_in_batches() {
    let response = tokens(&[
        two_column_meta(),
        row(&[MockVal::Int(1), MockVal::NStr("a")]),
        row(&[MockVal::Int(2), MockVal::NStr("b")]),
        row(&[MockVal::Int(3), MockVal::NStr("c")]),
        done_final(3, true),
    ]);
    let server = ScriptedServer::spawn(vec![Reply::Tokens(response)]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT [id],[name] FROM [dbo].[t]")
        .await
        .unwrap();
    let mut stream = ResultStream::new(&mut conn, None, false);

    let first = stream.next_batch(2).await.unwrap().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.column_values(0), &[SqlValue::Int(1), SqlValue::Int(2)]);
    assert_eq!(
        first.column_values(1),
        &[SqlValue::String("a".into()), SqlValue::String("b".into())]
    );

    let second = stream.next_batch(2).await.unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.row(0), vec![SqlValue::Int(3), SqlValue::String("c".into())]);

    assert!(stream.next_batch(2).await.unwrap().is_none());
    assert!(stream.is_finished());

    drop(stream);
    assert_eq!(conn.state(), SessionState::Idle);
    server.shutdown();
}

#[tokio::test]
async fn deferred_error_raises_after_rows() {
    let response = tokens(&[
        two_column_meta(),
        row(&[MockVal::Int(1), MockVal::NStr("a")]),
        error_token(8134, 16, "Divide by zero error encountered."),
        done_final(1, true),
    ]);
    let server = ScriptedServer::spawn(vec![Reply::Tokens(response)]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT id, 1/0 FROM t").await.unwrap();
    let mut stream = ResultStream::new(&mut conn, None, false);

    // The row that preceded the error is still delivered...
    let batch = stream.next_batch(100).await.unwrap().unwrap();
    assert_eq!(batch.len(), 1);

    // ...and the error surfaces on the following pull.
    let err = stream.next_batch(100).await.unwrap_err();
    assert!(matches!(err, Error::Remote { number: 8134, .. }));
    server.shutdown();
}

#[tokio::test]
async fn multiple_result_sets_reexpose_metadata_when_allowed() {
    let response = tokens(&[
        colmeta(&[MockCol::Int("a")]),
        row(&[MockVal::Int(1)]),
        done_more(1),
        colmeta(&[MockCol::Int("b"), MockCol::Int("c")]),
        row(&[MockVal::Int(2), MockVal::Int(3)]),
        done_final(1, true),
    ]);
    let server = ScriptedServer::spawn(vec![Reply::Tokens(response)]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT a FROM t; SELECT b, c FROM u")
        .await
        .unwrap();
    let mut stream = ResultStream::new(&mut conn, None, true);

    let first = stream.next_batch(100).await.unwrap().unwrap();
    assert_eq!(first.columns().len(), 1);
    assert_eq!(first.row(0), vec![SqlValue::Int(1)]);

    let second = stream.next_batch(100).await.unwrap().unwrap();
    assert_eq!(second.columns().len(), 2);
    assert_eq!(second.row(0), vec![SqlValue::Int(2), SqlValue::Int(3)]);

    assert!(stream.next_batch(100).await.unwrap().is_none());
    server.shutdown();
}

#[tokio::test]
async fn metadata_change_without_permission_is_protocol_error() {
    let response = tokens(&[
        colmeta(&[MockCol::Int("a")]),
        row(&[MockVal::Int(1)]),
        done_more(1),
        colmeta(&[MockCol::Int("b")]),
        done_final(0, false),
    ]);
    let server = ScriptedServer::spawn(vec![Reply::Tokens(response)]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT a FROM t").await.unwrap();
    let mut stream = ResultStream::new(&mut conn, None, false);

    let _rows = stream.next_batch(100).await.unwrap().unwrap();
    let err = stream.next_batch(100).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    server.shutdown();
}

#[tokio::test]
async fn cancellation_drains_and_recycles_the_connection() {
    let server = ScriptedServer::spawn_with_default(
        vec![Reply::RowsUntilAttention {
            meta: two_column_meta(),
            row: row(&[MockVal::Int(9), MockVal::NStr("x")]),
        }],
        Some(mssql_mock::select1_reply()),
    )
    .await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT * FROM huge").await.unwrap();
    let mut stream = ResultStream::new(&mut conn, None, false);

    // Consume a little of the stream, then cancel.
    let mut seen = 0usize;
    while seen < 100 {
        let batch = stream.next_batch(50).await.unwrap().unwrap();
        seen += batch.len();
    }
    stream.cancel().await.unwrap();

    let err = stream.next_batch(10).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    drop(stream);

    // Idle again and usable for the next query.
    assert_eq!(conn.state(), SessionState::Idle);
    conn.ping(std::time::Duration::from_secs(5)).await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn bind_snapshot_mismatch_is_protocol_error() {
    let response = tokens(&[
        two_column_meta(),
        row(&[MockVal::Int(1), MockVal::NStr("a")]),
        done_final(1, true),
    ]);
    let server = ScriptedServer::spawn(vec![Reply::Tokens(response)]).await;
    let mut conn = Connection::connect(&connect_info(server.addr)).await.unwrap();

    conn.begin_batch("SELECT [id] FROM [dbo].[t]").await.unwrap();

    // Bind-time snapshot expects a single INT column; the server answers
    // with two columns.
    let expected = vec![mssql_conn::ColumnMeta {
        ordinal: 0,
        name: "id".into(),
        type_id: tds_wire::TypeId::Int4,
        nullable: false,
        max_length: 4,
        precision: None,
        scale: None,
        collation: None,
        is_identity: false,
    }];
    let mut stream = ResultStream::new(&mut conn, Some(expected), false);

    let err = stream.next_batch(10).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    server.shutdown();
}
