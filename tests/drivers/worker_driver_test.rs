//! End-to-end check of a driver loaded from `libpath`, using a shell script
//! that speaks the worker protocol.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use dbmeta::driver::{Driver, DriverError, DriverRegistry};
use dbmeta::worker::WorkerError;
use dbmeta::{
    CatalogOperation, DriverConfig, FacadeStatus, MetadataError, MetadataFacade, QueryOptions,
    Record,
};

/// Catalog calls other than primary keys answer with one row holding the
/// method name and the raw request params. `@BEFORE_LOOP@` and
/// `@AFTER_REPLY@` are filled in per script.
const FAKE_WORKER: &str = r#"#!/bin/sh
@BEFORE_LOOP@
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"id":"\([^"]*\)".*/\1/p')
  method=$(printf '%s\n' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  params=$(printf '%s\n' "$line" | sed -n 's/.*"params":\(.*\)}$/\1/p')
  case "$params" in
    *__unsupported__*)
      printf '{"id":"%s","success":false,"error":{"code":"INVALID_REQUEST","message":"unsupported table"}}\n' "$id"
      continue
      ;;
  esac
  case "$method" in
    driver.register|connection.close) result='null' ;;
    connection.open) result='{"connection_id":"c1"}' ;;
    connection.metadata) result='{}' ;;
    catalog.get_primary_keys) result='{"columns":["TABLE_NAME","COLUMN_NAME","KEY_SEQ","PK_NAME"],"rows":[["orders","order_id","1","PRIMARY"]]}' ;;
    catalog.*)
      escaped=$(printf '%s' "$params" | sed 's/"/\\"/g')
      result=$(printf '{"columns":["METHOD","PARAMS"],"rows":[["%s","%s"]]}' "$method" "$escaped")
      ;;
    *)
      printf '{"id":"%s","success":false,"error":{"code":"METHOD_NOT_FOUND","message":"%s"}}\n' "$id" "$method"
      continue
      ;;
  esac
  printf '{"id":"%s","success":true,"result":%s}\n' "$id" "$result"
  @AFTER_REPLY@
done
"#;

/// First run only: stop right after answering the first request.
const EXIT_ON_FIRST_RUN: (&str, &str) = (
    r#"marker="$0.ran"; first=""; [ -e "$marker" ] || { first=1; : > "$marker"; }"#,
    r#"[ -n "$first" ] && exit 0"#,
);

fn write_script(dir: &Path, name: &str, before_loop: &str, after_reply: &str) -> PathBuf {
    let path = dir.join(name);
    let script = FAKE_WORKER
        .replace("@BEFORE_LOOP@", before_loop)
        .replace("@AFTER_REPLY@", after_reply);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_worker(dir: &Path) -> PathBuf {
    write_script(dir, "fake-worker.sh", "", ":")
}

fn mysql_config(worker: &Path) -> DriverConfig {
    DriverConfig::new("com.mysql.jdbc.Driver", "jdbc:mysql://localhost:3306/shop")
        .with_libpath(worker)
        .with_credentials("root", "secret")
}

/// The method and params a catalog call sent, as echoed by the worker.
fn echoed(records: &[Record]) -> (String, Value) {
    assert_eq!(records.len(), 1);
    let method = records[0].get("method").unwrap().to_string();
    let params = serde_json::from_str(records[0].get("params").unwrap()).unwrap();
    (method, params)
}

#[tokio::test]
async fn test_worker_driver_through_facade() {
    let dir = tempfile::tempdir().unwrap();
    let worker = write_worker(dir.path());

    let registry = Arc::new(DriverRegistry::with_builtin());
    let facade = MetadataFacade::with_registry(mysql_config(&worker), registry.clone());

    let tables = facade.tables(&QueryOptions::default()).await.unwrap();
    assert!(registry.contains("com.mysql.jdbc.Driver"));
    assert_eq!(facade.state().await, FacadeStatus::Ready);
    assert_eq!(
        echoed(&tables),
        (
            "catalog.get_tables".to_string(),
            json!({
                "connection_id": "c1",
                "catalog": null,
                "schema": null,
                "table": null,
                "column": null,
                "types": [],
            })
        )
    );

    let keys = facade
        .primary_keys(&QueryOptions::new().table("orders"))
        .await
        .unwrap();
    assert_eq!(keys[0].get("columnName"), Some("order_id"));
    assert_eq!(keys[0].get("pkName"), Some("PRIMARY"));

    match facade
        .columns(&QueryOptions::new().table("__unsupported__"))
        .await
    {
        Err(MetadataError::Query {
            operation,
            source: DriverError::Worker(WorkerError::InvalidRequest(message)),
        }) => {
            assert_eq!(operation, CatalogOperation::Columns);
            assert_eq!(message, "unsupported table");
        }
        other => panic!("expected invalid-request query error, got {:?}", other),
    }

    facade.close().await.unwrap();
    assert_eq!(facade.state().await, FacadeStatus::Closed);
}

#[tokio::test]
async fn test_catalog_filters_reach_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let worker = write_worker(dir.path());
    let facade = MetadataFacade::new(mysql_config(&worker));

    let tables = facade
        .tables(&QueryOptions::new().schema("shop").table("ord%").types(["TABLE"]))
        .await
        .unwrap();
    let (_, params) = echoed(&tables);
    assert_eq!(params["schema"], "shop");
    assert_eq!(params["table"], "ord%");
    assert_eq!(params["types"], json!(["TABLE"]));
    assert!(params["catalog"].is_null());

    let columns = facade
        .columns(&QueryOptions::new().table("orders").column("order_%"))
        .await
        .unwrap();
    let (method, params) = echoed(&columns);
    assert_eq!(method, "catalog.get_columns");
    assert_eq!(params["table"], "orders");
    assert_eq!(params["column"], "order_%");
    assert!(params["types"].is_null());

    let imported = facade
        .imported_keys(&QueryOptions::new().catalog("def").table("order_lines"))
        .await
        .unwrap();
    let (method, params) = echoed(&imported);
    assert_eq!(method, "catalog.get_imported_keys");
    assert_eq!(params["catalog"], "def");
    assert_eq!(params["table"], "order_lines");
    assert!(params["column"].is_null());

    let exported = facade
        .exported_keys(&QueryOptions::new().table("orders"))
        .await
        .unwrap();
    let (method, params) = echoed(&exported);
    assert_eq!(method, "catalog.get_exported_keys");
    assert_eq!(params["table"], "orders");
    assert!(params["schema"].is_null());

    facade.close().await.unwrap();
}

#[tokio::test]
async fn test_exited_worker_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let (before_loop, after_reply) = EXIT_ON_FIRST_RUN;
    let worker = write_script(dir.path(), "flaky-worker.sh", before_loop, after_reply);

    let registry = Arc::new(DriverRegistry::with_builtin());
    let first = MetadataFacade::with_registry(mysql_config(&worker), registry.clone());

    // Registration succeeds, then the worker is gone before the open.
    let result = first.tables(&QueryOptions::default()).await;
    assert!(
        matches!(
            result,
            Err(MetadataError::Connection(DriverError::Worker(
                WorkerError::WorkerExited | WorkerError::WriteFailed(_)
            )))
        ),
        "unexpected result: {:?}",
        result
    );
    assert_eq!(first.state().await, FacadeStatus::Cold);
    let stale = registry.get("com.mysql.jdbc.Driver").unwrap();
    assert!(!stale.is_available());

    let second = MetadataFacade::with_registry(mysql_config(&worker), registry.clone());
    let tables = second.tables(&QueryOptions::default()).await.unwrap();
    assert_eq!(echoed(&tables).0, "catalog.get_tables");

    let fresh = registry.get("com.mysql.jdbc.Driver").unwrap();
    assert!(fresh.is_available());
    assert!(!Arc::ptr_eq(&stale, &fresh));

    // The first facade re-resolves its driver on the next call.
    let tables = first.tables(&QueryOptions::default()).await.unwrap();
    assert_eq!(tables.len(), 1);

    first.close().await.unwrap();
    second.close().await.unwrap();
}
