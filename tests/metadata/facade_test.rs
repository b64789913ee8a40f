//! MetadataFacade lifecycle tests against a recording in-memory driver.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbmeta::driver::{
    BufferedCursor, CatalogMetadata, Cursor, Driver, DriverConnection, DriverError,
    DriverRegistry, DriverResult,
};
use dbmeta::{
    CatalogOperation, DriverConfig, FacadeStatus, MetadataError, MetadataFacade, QueryOptions,
};

type Args = (Option<String>, Option<String>, Option<String>);

#[derive(Default)]
struct Recorder {
    connects: AtomicUsize,
    metadata_calls: AtomicUsize,
    closes: AtomicUsize,
    cursor_closes: Arc<AtomicUsize>,
    failing_connects: AtomicUsize,
    failing_metadata: AtomicUsize,
    fail_queries: AtomicBool,
    fail_close: AtomicBool,
    primary_key_args: Mutex<Vec<Args>>,
    table_args: Mutex<Vec<(Args, Vec<String>)>>,
}

impl Recorder {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Consume one scripted failure, if any remain.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn owned(catalog: Option<&str>, schema: Option<&str>, table: Option<&str>) -> Args {
    (
        catalog.map(str::to_string),
        schema.map(str::to_string),
        table.map(str::to_string),
    )
}

struct MockDriver(Arc<Recorder>);

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(
        &self,
        _url: &str,
        _user: Option<&str>,
        _password: Option<&str>,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.0.failing_connects) {
            return Err(DriverError::Other("connection refused".to_string()));
        }
        Ok(Box::new(MockConnection(self.0.clone())))
    }
}

struct MockConnection(Arc<Recorder>);

#[async_trait]
impl DriverConnection for MockConnection {
    async fn metadata(&self) -> DriverResult<Arc<dyn CatalogMetadata>> {
        self.0.metadata_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up behind the first one.
        tokio::time::sleep(Duration::from_millis(20)).await;
        if take_failure(&self.0.failing_metadata) {
            return Err(DriverError::Other("metadata unavailable".to_string()));
        }
        Ok(Arc::new(MockMetadata(self.0.clone())))
    }

    async fn close(&self) -> DriverResult<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Other("close failed".to_string()));
        }
        Ok(())
    }
}

struct MockMetadata(Arc<Recorder>);

impl MockMetadata {
    fn check(&self) -> DriverResult<()> {
        if self.0.fail_queries.load(Ordering::SeqCst) {
            return Err(DriverError::Other("catalog unavailable".to_string()));
        }
        Ok(())
    }
}

fn s(v: &str) -> Option<String> {
    Some(v.to_string())
}

#[async_trait]
impl CatalogMetadata for MockMetadata {
    async fn get_tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> DriverResult<Box<dyn Cursor>> {
        self.check()?;
        self.0
            .table_args
            .lock()
            .unwrap()
            .push((owned(catalog, schema_pattern, table_pattern), types.to_vec()));
        Ok(Box::new(BufferedCursor::with_columns(
            &["TABLE_CAT", "TABLE_SCHEM", "TABLE_NAME", "TABLE_TYPE"],
            vec![
                vec![s("hr"), None, s("departments"), s("TABLE")],
                vec![s("hr"), None, s("employees"), s("TABLE")],
            ],
        )))
    }

    async fn get_columns(
        &self,
        _catalog: Option<&str>,
        _schema_pattern: Option<&str>,
        _table_pattern: Option<&str>,
        _column_pattern: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.check()?;
        Ok(Box::new(BrokenCursor {
            closes: self.0.cursor_closes.clone(),
            row: 0,
        }))
    }

    async fn get_primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.check()?;
        self.0
            .primary_key_args
            .lock()
            .unwrap()
            .push(owned(catalog, schema, table));
        Ok(Box::new(BufferedCursor::with_columns(
            &["TABLE_NAME", "COLUMN_NAME", "KEY_SEQ", "PK_NAME"],
            vec![vec![s("employees"), s("id"), s("1"), s("pk_employees")]],
        )))
    }

    async fn get_imported_keys(
        &self,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        _table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.check()?;
        Ok(Box::new(BufferedCursor::with_columns(
            &["PKTABLE_NAME", "PKCOLUMN_NAME", "FKTABLE_NAME", "FKCOLUMN_NAME"],
            vec![vec![s("departments"), s("id"), s("employees"), s("dept_id")]],
        )))
    }

    async fn get_exported_keys(
        &self,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        _table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.check()?;
        Ok(Box::new(BufferedCursor::with_columns(
            &["PKTABLE_NAME", "FKTABLE_NAME"],
            vec![],
        )))
    }
}

/// Three rows, the second of which cannot be read.
struct BrokenCursor {
    closes: Arc<AtomicUsize>,
    row: usize,
}

impl Cursor for BrokenCursor {
    fn column_count(&self) -> DriverResult<usize> {
        Ok(1)
    }

    fn column_name(&self, _index: usize) -> DriverResult<String> {
        Ok("COLUMN_NAME".to_string())
    }

    fn next(&mut self) -> DriverResult<bool> {
        self.row += 1;
        match self.row {
            2 => Err(DriverError::Other("row 2 unreadable".to_string())),
            n => Ok(n <= 3),
        }
    }

    fn get_string(&self, _index: usize) -> DriverResult<Option<String>> {
        Ok(Some(format!("col{}", self.row)))
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn mock_facade() -> (MetadataFacade, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let registry = DriverRegistry::empty();
    registry.register("mock", Arc::new(MockDriver(recorder.clone())));

    let facade = MetadataFacade::with_registry(
        DriverConfig::new("mock", "mock://hr"),
        Arc::new(registry),
    );
    (facade, recorder)
}

#[tokio::test]
async fn test_construction_does_not_connect() {
    let (facade, recorder) = mock_facade();

    assert_eq!(facade.state().await, FacadeStatus::Cold);
    assert_eq!(Recorder::count(&recorder.connects), 0);
    assert_eq!(facade.config().url, "mock://hr");
}

#[tokio::test]
async fn test_metadata_is_acquired_once() {
    let (facade, recorder) = mock_facade();

    facade.tables(&QueryOptions::default()).await.unwrap();
    assert_eq!(facade.state().await, FacadeStatus::Ready);

    facade.primary_keys(&QueryOptions::default()).await.unwrap();
    facade.imported_keys(&QueryOptions::default()).await.unwrap();
    facade.exported_keys(&QueryOptions::default()).await.unwrap();
    facade.metadata().await.unwrap();

    assert_eq!(Recorder::count(&recorder.connects), 1);
    assert_eq!(Recorder::count(&recorder.metadata_calls), 1);
}

#[tokio::test]
async fn test_tables_are_normalized() {
    let (facade, _) = mock_facade();

    let tables = facade.tables(&QueryOptions::default()).await.unwrap();

    assert_eq!(tables.len(), 2);
    let fields: Vec<_> = tables[0].fields().collect();
    assert_eq!(fields, vec!["tableCat", "tableSchem", "tableName", "tableType"]);
    assert_eq!(tables[0].get("tableName"), Some("departments"));
    assert_eq!(tables[1].get("tableName"), Some("employees"));
    assert_eq!(tables[1].get("tableSchem"), None);
}

#[tokio::test]
async fn test_tables_pass_filters_and_types() {
    let (facade, recorder) = mock_facade();

    facade
        .tables(&QueryOptions::new().schema("public").types(["TABLE", "VIEW"]))
        .await
        .unwrap();
    facade.tables(&QueryOptions::default()).await.unwrap();

    let calls = recorder.table_args.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            (
                (None, s("public"), None),
                vec!["TABLE".to_string(), "VIEW".to_string()]
            ),
            ((None, None, None), vec![]),
        ]
    );
}

#[tokio::test]
async fn test_primary_keys_pass_table_only() {
    let (facade, recorder) = mock_facade();

    let keys = facade
        .primary_keys(&QueryOptions::new().table("employees"))
        .await
        .unwrap();

    assert_eq!(
        recorder.primary_key_args.lock().unwrap().as_slice(),
        &[(None, None, s("employees"))]
    );
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].get("columnName"), Some("id"));
    assert_eq!(keys[0].get("keySeq"), Some("1"));
    assert_eq!(keys[0].get("pkName"), Some("pk_employees"));
}

#[tokio::test]
async fn test_close_before_any_query() {
    let (facade, recorder) = mock_facade();

    facade.close().await.unwrap();
    facade.close().await.unwrap();

    assert_eq!(facade.state().await, FacadeStatus::Cold);
    assert_eq!(Recorder::count(&recorder.connects), 0);
    assert_eq!(Recorder::count(&recorder.closes), 0);
}

#[tokio::test]
async fn test_close_twice_releases_once() {
    let (facade, recorder) = mock_facade();
    facade.tables(&QueryOptions::default()).await.unwrap();

    facade.close().await.unwrap();
    facade.close().await.unwrap();

    assert_eq!(facade.state().await, FacadeStatus::Closed);
    assert_eq!(Recorder::count(&recorder.closes), 1);
}

#[tokio::test]
async fn test_queries_fail_after_close() {
    let (facade, recorder) = mock_facade();
    facade.tables(&QueryOptions::default()).await.unwrap();
    facade.close().await.unwrap();

    let result = facade.tables(&QueryOptions::default()).await;
    assert!(matches!(result, Err(MetadataError::Closed)));
    assert!(matches!(facade.metadata().await, Err(MetadataError::Closed)));
    assert_eq!(Recorder::count(&recorder.connects), 1);
}

#[tokio::test]
async fn test_failed_open_is_retried() {
    let (facade, recorder) = mock_facade();
    recorder.failing_connects.store(1, Ordering::SeqCst);

    let result = facade.tables(&QueryOptions::default()).await;
    assert!(matches!(result, Err(MetadataError::Connection(_))));
    assert_eq!(facade.state().await, FacadeStatus::Cold);

    facade.tables(&QueryOptions::default()).await.unwrap();
    assert_eq!(Recorder::count(&recorder.connects), 2);
    assert_eq!(Recorder::count(&recorder.metadata_calls), 1);
}

#[tokio::test]
async fn test_failed_metadata_does_not_reopen() {
    let (facade, recorder) = mock_facade();
    recorder.failing_metadata.store(1, Ordering::SeqCst);

    let result = facade.primary_keys(&QueryOptions::default()).await;
    assert!(matches!(result, Err(MetadataError::MetadataAcquisition(_))));
    assert_eq!(facade.state().await, FacadeStatus::ConnectedNoMetadata);

    facade.primary_keys(&QueryOptions::default()).await.unwrap();
    assert_eq!(Recorder::count(&recorder.connects), 1);
    assert_eq!(Recorder::count(&recorder.metadata_calls), 2);
}

#[tokio::test]
async fn test_close_after_failed_metadata_releases_connection() {
    let (facade, recorder) = mock_facade();
    recorder.failing_metadata.store(1, Ordering::SeqCst);
    assert!(facade.metadata().await.is_err());

    facade.close().await.unwrap();

    assert_eq!(facade.state().await, FacadeStatus::Closed);
    assert_eq!(Recorder::count(&recorder.closes), 1);
}

#[tokio::test]
async fn test_query_error_names_operation() {
    let (facade, recorder) = mock_facade();
    facade.tables(&QueryOptions::default()).await.unwrap();
    recorder.fail_queries.store(true, Ordering::SeqCst);

    match facade.imported_keys(&QueryOptions::new().table("employees")).await {
        Err(MetadataError::Query { operation, .. }) => {
            assert_eq!(operation, CatalogOperation::ImportedKeys);
        }
        other => panic!("expected query error, got {:?}", other),
    }

    recorder.fail_queries.store(false, Ordering::SeqCst);
    let keys = facade.imported_keys(&QueryOptions::default()).await.unwrap();
    assert_eq!(keys[0].get("fkcolumnName"), Some("dept_id"));
    assert_eq!(Recorder::count(&recorder.metadata_calls), 1);
}

#[tokio::test]
async fn test_cursor_failure_closes_cursor_and_returns_nothing() {
    let (facade, recorder) = mock_facade();

    let result = facade.columns(&QueryOptions::default()).await;

    assert!(matches!(result, Err(MetadataError::Cursor(_))));
    assert_eq!(Recorder::count(&recorder.cursor_closes), 1);
    assert_eq!(facade.state().await, FacadeStatus::Ready);
}

#[tokio::test]
async fn test_close_failure_is_reported_once() {
    let (facade, recorder) = mock_facade();
    facade.tables(&QueryOptions::default()).await.unwrap();
    recorder.fail_close.store(true, Ordering::SeqCst);

    assert!(matches!(facade.close().await, Err(MetadataError::Close(_))));
    assert_eq!(facade.state().await, FacadeStatus::Closed);

    facade.close().await.unwrap();
    assert_eq!(Recorder::count(&recorder.closes), 1);
}

#[tokio::test]
async fn test_unregistered_driver_without_libpath() {
    let facade = MetadataFacade::with_registry(
        DriverConfig::new("com.example.Driver", "jdbc:example://db"),
        Arc::new(DriverRegistry::empty()),
    );

    let result = facade.tables(&QueryOptions::default()).await;
    assert!(matches!(
        result,
        Err(MetadataError::Config(DriverError::UnknownDriver(name))) if name == "com.example.Driver"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_calls_acquire_metadata_once() {
    let (facade, recorder) = mock_facade();
    let facade = Arc::new(facade);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let facade = facade.clone();
            tokio::spawn(async move { facade.tables(&QueryOptions::default()).await })
        })
        .collect();

    for task in tasks {
        let tables = task.await.unwrap().unwrap();
        assert_eq!(tables.len(), 2);
    }

    assert_eq!(Recorder::count(&recorder.connects), 1);
    assert_eq!(Recorder::count(&recorder.metadata_calls), 1);
}
