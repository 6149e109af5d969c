//! Tests for `PgWebSocketAdapter::create_io_server`.
//!
//! The server, database and fan-out library are replaced by doubles that
//! record how they were called.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::StubAdapter;
use pgsocket_api::adapter::PgWebSocketAdapter;
use pgsocket_api::ws::{WsServerFactory, WsServerOptions};
use pgsocket_core::error::{CoreError, FanoutError};
use pgsocket_core::options::FanoutOptions;
use pgsocket_core::ports::{
    AdapterFactory, DatabaseAccess, FanoutAdapter, ServerFactory, SocketServer,
};

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

/// Stand-in for a native connection pool; compared by `Arc` identity.
#[derive(Debug)]
struct FakePool;

struct FakeDatabase {
    master: Option<Arc<FakePool>>,
    lookups: AtomicUsize,
}

impl FakeDatabase {
    fn with_pool() -> Self {
        Self {
            master: Some(Arc::new(FakePool)),
            lookups: AtomicUsize::new(0),
        }
    }

    fn without_pool() -> Self {
        Self {
            master: None,
            lookups: AtomicUsize::new(0),
        }
    }
}

impl DatabaseAccess for FakeDatabase {
    type Pool = Arc<FakePool>;

    fn master_pool(&self) -> Result<Arc<FakePool>, CoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.master
            .clone()
            .ok_or_else(|| CoreError::DependencyUnavailable("database".into()))
    }
}

#[derive(Default)]
struct RecordingFactory {
    calls: Mutex<Vec<(Arc<FakePool>, FanoutOptions)>>,
    fail: bool,
}

impl RecordingFactory {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(Arc<FakePool>, FanoutOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterFactory<Arc<FakePool>> for RecordingFactory {
    async fn create_adapter(
        &self,
        pool: Arc<FakePool>,
        options: FanoutOptions,
    ) -> Result<Arc<dyn FanoutAdapter>, FanoutError> {
        let call = self.calls.lock().unwrap().len();
        self.calls.lock().unwrap().push((pool, options));
        if self.fail {
            return Err(FanoutError::InvalidOption("rejected".into()));
        }
        Ok(StubAdapter::new(&format!("stub-{call}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FakeOptions {
    cors: bool,
}

#[derive(Default)]
struct FakeServer {
    port: u16,
    options: Option<FakeOptions>,
    strategies: Vec<Arc<dyn FanoutAdapter>>,
}

impl SocketServer for FakeServer {
    fn attach_strategy(&mut self, adapter: Arc<dyn FanoutAdapter>) {
        self.strategies.push(adapter);
    }
}

#[derive(Default)]
struct FakeServerFactory {
    created: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ServerFactory for FakeServerFactory {
    type Server = FakeServer;
    type Options = FakeOptions;

    async fn create(
        &self,
        port: u16,
        options: Option<FakeOptions>,
    ) -> Result<FakeServer, CoreError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CoreError::Validation("port in use".into()));
        }
        Ok(FakeServer {
            port,
            options,
            ..FakeServer::default()
        })
    }
}

type TestAdapter = PgWebSocketAdapter<FakeServerFactory, FakeDatabase, RecordingFactory>;

fn build(database: FakeDatabase, factory: RecordingFactory) -> (TestAdapter, Arc<FakeDatabase>) {
    let database = Arc::new(database);
    let adapter = PgWebSocketAdapter::new(
        FakeServerFactory::default(),
        Arc::clone(&database),
        factory,
    );
    (adapter, database)
}

// ---------------------------------------------------------------------------
// Test: the server comes back as the base built it, with one strategy attached
// ---------------------------------------------------------------------------

#[tokio::test]
async fn returns_base_server_with_strategy_attached() {
    let (adapter, _db) = build(FakeDatabase::with_pool(), RecordingFactory::default());

    let server = adapter
        .create_io_server(3001, Some(FakeOptions { cors: true }))
        .await
        .unwrap();

    assert_eq!(server.port, 3001);
    assert_eq!(server.options, Some(FakeOptions { cors: true }));
    assert_eq!(server.strategies.len(), 1);
    assert_eq!(server.strategies[0].uid(), "stub-0");
}

// ---------------------------------------------------------------------------
// Test: the factory always gets the two-hour heartbeat, whatever the input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn factory_called_once_with_low_write_timing() {
    let inputs = [
        (0, None),
        (80, Some(FakeOptions { cors: false })),
        (2283, Some(FakeOptions { cors: true })),
        (u16::MAX, None),
    ];

    for (port, options) in inputs {
        let (adapter, _db) = build(FakeDatabase::with_pool(), RecordingFactory::default());

        adapter.create_io_server(port, options).await.unwrap();

        let calls = adapter_calls(&adapter);
        assert_eq!(calls.len(), 1, "port {port}");
        let (_, fanout) = &calls[0];
        assert_eq!(fanout.heartbeat_interval.as_millis(), 7_200_000);
        assert_eq!(fanout.heartbeat_timeout.as_millis(), 7_320_000);
    }
}

// ---------------------------------------------------------------------------
// Test: the pool handed to the factory is the database's primary pool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn factory_receives_the_primary_pool() {
    let (adapter, db) = build(FakeDatabase::with_pool(), RecordingFactory::default());

    adapter.create_io_server(3001, None).await.unwrap();

    let calls = adapter_calls(&adapter);
    let expected = db.master.as_ref().unwrap();
    assert!(Arc::ptr_eq(&calls[0].0, expected));
}

// ---------------------------------------------------------------------------
// Test: a missing pool fails creation and builds no strategy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_pool_fails_without_strategy() {
    let (adapter, db) = build(FakeDatabase::without_pool(), RecordingFactory::default());

    let result = adapter.create_io_server(3001, None).await;

    assert_matches!(result.err(), Some(CoreError::DependencyUnavailable(_)));
    assert_eq!(db.lookups.load(Ordering::SeqCst), 1);
    assert!(adapter_calls(&adapter).is_empty());
}

// ---------------------------------------------------------------------------
// Test: factory failures propagate unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn factory_error_propagates() {
    let (adapter, _db) = build(FakeDatabase::with_pool(), RecordingFactory::failing());

    let result = adapter.create_io_server(3001, None).await;

    assert_matches!(
        result.err(),
        Some(CoreError::Fanout(FanoutError::InvalidOption(_)))
    );
}

// ---------------------------------------------------------------------------
// Test: base construction failures stop before the pool lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn base_error_propagates_before_lookup() {
    let database = Arc::new(FakeDatabase::with_pool());
    let adapter = PgWebSocketAdapter::new(
        FakeServerFactory {
            fail: true,
            ..FakeServerFactory::default()
        },
        Arc::clone(&database),
        RecordingFactory::default(),
    );

    let result = adapter.create_io_server(3001, None).await;

    assert_matches!(result.err(), Some(CoreError::Validation(_)));
    assert_eq!(database.lookups.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Test: every call repeats the lookup and builds a fresh strategy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_calls_are_independent() {
    let (adapter, db) = build(FakeDatabase::with_pool(), RecordingFactory::default());

    let first = adapter.create_io_server(3001, None).await.unwrap();
    let second = adapter.create_io_server(3001, None).await.unwrap();
    let third = adapter.create_io_server(3002, None).await.unwrap();

    assert_eq!(db.lookups.load(Ordering::SeqCst), 3);
    assert_eq!(adapter_calls(&adapter).len(), 3);
    for server in [&first, &second, &third] {
        assert_eq!(server.strategies.len(), 1);
    }
    assert!(!Arc::ptr_eq(&first.strategies[0], &second.strategies[0]));
}

// ---------------------------------------------------------------------------
// Test: with the real server factory the strategy ends up on the WsServer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ws_server_gets_strategy_attached() {
    let database = Arc::new(FakeDatabase::with_pool());
    let adapter = PgWebSocketAdapter::new(WsServerFactory, database, RecordingFactory::default());

    let server = adapter
        .create_io_server(2283, Some(WsServerOptions::default()))
        .await
        .unwrap();

    assert_eq!(server.port(), 2283);
    assert_eq!(server.strategy().map(|s| s.uid()), Some("stub-0"));
}

/// The factory is owned by the adapter; reach it through a tiny accessor.
fn adapter_calls(adapter: &TestAdapter) -> Vec<(Arc<FakePool>, FanoutOptions)> {
    adapter.factory().calls()
}
