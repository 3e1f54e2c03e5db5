//! Catalog, cache, and scan behavior against the scripted server.

#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use mssql_federation::{
    Catalog, CompareOp, EntityKind, FilterExpr, ScalarExpr, ScanPlan, SortKey,
};
use mssql_mock::{
    COLLATION_CI, MockCol, MockVal, Reply, ScriptedServer, colmeta, done_final, row, tokens,
};
use mssql_values::SqlValue;

fn attach_options(addr: std::net::SocketAddr, extra: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut options = vec![
        ("host".to_string(), addr.ip().to_string()),
        ("port".to_string(), addr.port().to_string()),
        ("database".to_string(), "scratch".to_string()),
        ("user".to_string(), "reader".to_string()),
        ("password".to_string(), "pw".to_string()),
        ("encrypt".to_string(), "off".to_string()),
    ];
    for (k, v) in extra {
        options.push(((*k).to_string(), (*v).to_string()));
    }
    options
}

/// Health-probe reply consumed on every pooled reacquisition.
fn probe() -> Reply {
    mssql_mock::select1_reply()
}

fn name_col() -> Bytes {
    colmeta(&[MockCol::NVarChar("name", 128, COLLATION_CI)])
}

/// `sys.schemas` reply: dbo + sales.
fn schemas_reply() -> Reply {
    Reply::Tokens(tokens(&[
        name_col(),
        row(&[MockVal::NStr("dbo")]),
        row(&[MockVal::NStr("sales")]),
        done_final(2, true),
    ]))
}

/// `sys.objects` reply for dbo: table t, view v.
fn tables_reply() -> Reply {
    Reply::Tokens(tokens(&[
        colmeta(&[
            MockCol::NVarChar("name", 128, COLLATION_CI),
            MockCol::NVarChar("type", 2, COLLATION_CI),
        ]),
        row(&[MockVal::NStr("t"), MockVal::NStr("U ")]),
        row(&[MockVal::NStr("v"), MockVal::NStr("V ")]),
        done_final(2, true),
    ]))
}

/// Column-load reply for dbo.t: id INT PK, name NVARCHAR(20).
fn columns_reply() -> Reply {
    let meta = colmeta(&[
        MockCol::Int("column_id"),
        MockCol::NVarChar("name", 128, COLLATION_CI),
        MockCol::NVarChar("type_name", 128, COLLATION_CI),
        MockCol::Int("max_length"),
        MockCol::Int("precision"),
        MockCol::Int("scale"),
        MockCol::Int("is_nullable"),
        MockCol::Int("is_identity"),
        MockCol::NVarChar("collation_name", 128, COLLATION_CI),
        MockCol::IntN("key_ordinal"),
    ]);
    Reply::Tokens(tokens(&[
        meta,
        row(&[
            MockVal::Int(1),
            MockVal::NStr("id"),
            MockVal::NStr("int"),
            MockVal::Int(4),
            MockVal::Int(10),
            MockVal::Int(0),
            MockVal::Int(0),
            MockVal::Int(1),
            MockVal::NNull,
            MockVal::NInt(Some(1)),
        ]),
        row(&[
            MockVal::Int(2),
            MockVal::NStr("name"),
            MockVal::NStr("nvarchar"),
            MockVal::Int(40),
            MockVal::Int(0),
            MockVal::Int(0),
            MockVal::Int(1),
            MockVal::Int(0),
            MockVal::NStr("SQL_Latin1_General_CP1_CI_AS"),
            MockVal::NInt(None),
        ]),
        done_final(2, true),
    ]))
}

#[tokio::test]
async fn lazy_loads_walk_the_three_levels() {
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        columns_reply(),
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let schemas = catalog.schema_names().await.unwrap();
    assert_eq!(schemas, vec!["dbo", "sales"]);

    let tables = catalog.table_names("dbo").await.unwrap();
    assert_eq!(tables, vec!["t", "v"]);

    let table = catalog.table("dbo", "t").await.unwrap();
    assert_eq!(table.kind, EntityKind::Table);
    assert_eq!(table.columns.len(), 2);
    assert_eq!(table.columns[0].name, "id");
    assert!(table.columns[0].is_identity);
    assert!(!table.columns[0].nullable);
    assert_eq!(table.primary_key, vec!["id"]);
    assert_eq!(
        table.columns[1].collation_name.as_deref(),
        Some("SQL_Latin1_General_CP1_CI_AS")
    );

    // Everything cached: repeated reads issue no further queries (the
    // script is exhausted; an extra query would panic the server task).
    let again = catalog.table("dbo", "t").await.unwrap();
    assert_eq!(again.columns.len(), 2);
    let _ = catalog.schema_names().await.unwrap();

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn point_invalidation_reloads_exactly_one_level() {
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        columns_reply(),
        // the only extra load permitted after InvalidateTable (plus its
        // acquisition probe):
        probe(),
        columns_reply(),
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let before = catalog.table("dbo", "t").await.unwrap();
    assert_eq!(before.columns.len(), 2);

    catalog.invalidate_table("dbo", "t");

    // Schemas and tables must NOT reload; columns must reload once.
    let after = catalog.table("dbo", "t").await.unwrap();
    assert_eq!(after.columns.len(), 2);

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn schema_filter_applies_before_caching() {
    let server = ScriptedServer::spawn(vec![schemas_reply()]).await;
    let options = attach_options(server.addr, &[("schema_filter", "^sales$")]);
    let catalog = Catalog::attach("db", &options, None).unwrap();

    let schemas = catalog.schema_names().await.unwrap();
    assert_eq!(schemas, vec!["sales"]);

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn views_are_read_only() {
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        // column load for the view
        columns_reply(),
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let view = catalog.table("dbo", "v").await.unwrap();
    assert_eq!(view.kind, EntityKind::View);
    let err = catalog.check_writable(&view).unwrap_err();
    assert!(err.to_string().contains("read-only"));

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn scan_pushes_order_and_streams_rows() {
    let scan_response = Reply::Tokens(tokens(&[
        colmeta(&[
            MockCol::Int("id"),
            MockCol::NVarChar("name", 20, COLLATION_CI),
        ]),
        row(&[MockVal::Int(1), MockVal::NStr("a")]),
        row(&[MockVal::Int(2), MockVal::NStr("b")]),
        done_final(2, true),
    ]));
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        columns_reply(),
        probe(),
        scan_response,
    ])
    .await;

    let options = attach_options(server.addr, &[("order_pushdown", "true")]);
    let catalog = Catalog::attach("db", &options, None).unwrap();

    let table = catalog.table("dbo", "t").await.unwrap();
    let mut plan = ScanPlan::new(table, vec![0, 1]);
    plan.order_by = vec![SortKey {
        expr: ScalarExpr::Column("id".into()),
        ascending: true,
        nulls_first: true,
    }];

    let mut exec = catalog.start_scan(&plan).await.unwrap();
    assert_eq!(
        exec.sql,
        "SELECT [id], [name] FROM [dbo].[t] ORDER BY [id] ASC"
    );
    assert_eq!(exec.pushed_sort_keys, 1);

    let batch = exec.stream.next_batch(100).await.unwrap().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.row(0), vec![SqlValue::Int(1), SqlValue::String("a".into())]);
    assert_eq!(batch.row(1), vec![SqlValue::Int(2), SqlValue::String("b".into())]);
    assert!(exec.stream.next_batch(100).await.unwrap().is_none());

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn scan_with_residual_filter_still_prefilters() {
    // WHERE [id] >= 2 pushes; the ILIKE on a CS column stays residual.
    let scan_response = Reply::Tokens(tokens(&[
        colmeta(&[MockCol::Int("id")]),
        row(&[MockVal::Int(2)]),
        done_final(1, true),
    ]));
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        columns_reply(),
        probe(),
        scan_response,
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let mut table = catalog.table("dbo", "t").await.unwrap();
    // Flip name's collation to case-sensitive for the ILIKE gate.
    table.columns[1].collation_name = Some("Latin1_General_CS_AS".into());

    let mut plan = ScanPlan::new(table, vec![0]);
    plan.filters = vec![
        FilterExpr::Compare {
            op: CompareOp::Ge,
            left: ScalarExpr::Column("id".into()),
            right: ScalarExpr::Literal(SqlValue::Int(2)),
        },
        FilterExpr::Like {
            expr: ScalarExpr::Column("name".into()),
            pattern: "a%".into(),
            case_insensitive: true,
        },
    ];

    let exec = catalog.start_scan(&plan).await.unwrap();
    assert_eq!(exec.sql, "SELECT [id] FROM [dbo].[t] WHERE [id] >= 2");
    assert_eq!(exec.pushed_filters, vec![0]);

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn exec_and_passthrough_scan() {
    let select_response = Reply::Tokens(tokens(&[
        colmeta(&[MockCol::Int("n")]),
        row(&[MockVal::Int(41)]),
        row(&[MockVal::Int(42)]),
        done_final(2, true),
    ]));
    let server = ScriptedServer::spawn(vec![
        Reply::Tokens(done_final(5, true)),
        probe(),
        select_response,
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let affected = catalog.exec("UPDATE x SET y = 1").await.unwrap();
    assert_eq!(affected, 5);

    let mut exec = catalog.scan_sql("SELECT n FROM x").await.unwrap();
    let batch = exec.stream.next_batch(10).await.unwrap().unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.columns()[0].name, "n");

    catalog.detach();
    server.shutdown();
}

#[tokio::test]
async fn bind_time_stream_parks_and_redeems() {
    let scan_response = Reply::Tokens(tokens(&[
        colmeta(&[MockCol::Int("id")]),
        row(&[MockVal::Int(7)]),
        done_final(1, true),
    ]));
    let server = ScriptedServer::spawn(vec![
        schemas_reply(),
        probe(),
        tables_reply(),
        probe(),
        columns_reply(),
        probe(),
        scan_response,
    ])
    .await;
    let catalog = Catalog::attach("db", &attach_options(server.addr, &[]), None).unwrap();

    let table = catalog.table("dbo", "t").await.unwrap();
    let mut plan = ScanPlan::new(table, vec![0]);
    catalog.bind_scan_eager(&mut plan).await.unwrap();
    assert!(plan.bound_stream.is_some());
    assert_eq!(catalog.registry().len(), 1);

    // Init redeems the parked stream instead of re-executing; the script
    // holds no second scan response, so a re-execution would panic.
    let mut exec = catalog.start_scan(&plan).await.unwrap();
    let batch = exec.stream.next_batch(10).await.unwrap().unwrap();
    assert_eq!(batch.row(0), vec![SqlValue::Int(7)]);
    assert!(catalog.registry().is_empty());

    catalog.detach();
    server.shutdown();
}
