//! Built-in SQLite driver.
//!
//! SQLite has neither catalogs nor schemas, so those filters are ignored and
//! reported as NULL. Catalog calls are answered from `sqlite_master` and the
//! `pragma_table_info` / `pragma_foreign_key_list` table-valued functions,
//! with result columns named like every other catalog API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::{
    BufferedCursor, CatalogMetadata, Cursor, Driver, DriverConnection, DriverError, DriverResult,
};

/// URL prefixes accepted before the database path.
const URL_PREFIXES: &[&str] = &["jdbc:sqlite:", "sqlite:"];

const MEMORY: &str = ":memory:";

/// `name NOT LIKE 'sqlite\_%'` hides SQLite's internal tables.
const TABLES_SQL: &str = r#"
SELECT NULL AS TABLE_CAT,
       NULL AS TABLE_SCHEM,
       name AS TABLE_NAME,
       upper(type) AS TABLE_TYPE,
       NULL AS REMARKS,
       NULL AS TYPE_CAT,
       NULL AS TYPE_SCHEM,
       NULL AS TYPE_NAME,
       NULL AS SELF_REFERENCING_COL_NAME,
       NULL AS REF_GENERATION
FROM sqlite_master
WHERE type IN ('table', 'view')
  AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
  AND name LIKE ?1
ORDER BY TABLE_TYPE, TABLE_NAME
"#;

const COLUMNS_SQL: &str = r#"
SELECT NULL AS TABLE_CAT,
       NULL AS TABLE_SCHEM,
       m.name AS TABLE_NAME,
       p.name AS COLUMN_NAME,
       p.type AS TYPE_NAME,
       CASE WHEN p."notnull" = 1 THEN 0 ELSE 1 END AS NULLABLE,
       NULL AS REMARKS,
       p.dflt_value AS COLUMN_DEF,
       p.cid + 1 AS ORDINAL_POSITION,
       CASE WHEN p."notnull" = 1 THEN 'NO' ELSE 'YES' END AS IS_NULLABLE
FROM sqlite_master AS m, pragma_table_info(m.name) AS p
WHERE m.type IN ('table', 'view')
  AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
  AND m.name LIKE ?1
  AND p.name LIKE ?2
ORDER BY m.name, p.cid
"#;

const PRIMARY_KEYS_SQL: &str = r#"
SELECT NULL AS TABLE_CAT,
       NULL AS TABLE_SCHEM,
       m.name AS TABLE_NAME,
       p.name AS COLUMN_NAME,
       p.pk AS KEY_SEQ,
       NULL AS PK_NAME
FROM sqlite_master AS m, pragma_table_info(m.name) AS p
WHERE m.type = 'table'
  AND p.pk > 0
  AND (?1 IS NULL OR m.name = ?1 COLLATE NOCASE)
ORDER BY m.name, p.pk
"#;

/// Shared select list for imported and exported keys. Referential actions use
/// the standard numeric codes; 7 is "not deferrable". A foreign key written
/// without a column list references the parent's primary key.
const FOREIGN_KEYS_SELECT: &str = r#"
SELECT NULL AS PKTABLE_CAT,
       NULL AS PKTABLE_SCHEM,
       f."table" AS PKTABLE_NAME,
       COALESCE(f."to",
                (SELECT k.name FROM pragma_table_info(f."table") AS k
                 WHERE k.pk = f.seq + 1)) AS PKCOLUMN_NAME,
       NULL AS FKTABLE_CAT,
       NULL AS FKTABLE_SCHEM,
       m.name AS FKTABLE_NAME,
       f."from" AS FKCOLUMN_NAME,
       f.seq + 1 AS KEY_SEQ,
       CASE upper(f.on_update)
            WHEN 'CASCADE' THEN 0 WHEN 'RESTRICT' THEN 1 WHEN 'SET NULL' THEN 2
            WHEN 'SET DEFAULT' THEN 4 ELSE 3 END AS UPDATE_RULE,
       CASE upper(f.on_delete)
            WHEN 'CASCADE' THEN 0 WHEN 'RESTRICT' THEN 1 WHEN 'SET NULL' THEN 2
            WHEN 'SET DEFAULT' THEN 4 ELSE 3 END AS DELETE_RULE,
       NULL AS FK_NAME,
       NULL AS PK_NAME,
       7 AS DEFERRABILITY
FROM sqlite_master AS m, pragma_foreign_key_list(m.name) AS f
WHERE m.type = 'table'
"#;

/// The driver registered under `sqlite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

/// Database path named by a connection URL, or `:memory:`.
pub fn database_path(url: &str) -> DriverResult<&str> {
    let trimmed = url.trim();
    let path = match URL_PREFIXES.iter().find_map(|p| trimmed.strip_prefix(p)) {
        Some(rest) => rest,
        None if trimmed.starts_with("jdbc:") || trimmed.contains("://") => {
            return Err(DriverError::InvalidUrl(url.to_string()));
        }
        None => trimmed,
    };

    if path.is_empty() {
        return Err(DriverError::InvalidUrl(url.to_string()));
    }
    Ok(path)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    /// Opens the database read-only. SQLite has no authentication, so the
    /// credentials are ignored.
    async fn connect(
        &self,
        url: &str,
        _user: Option<&str>,
        _password: Option<&str>,
    ) -> DriverResult<Box<dyn DriverConnection>> {
        let path = database_path(url)?.to_string();

        let conn = tokio::task::spawn_blocking(move || {
            if path == MEMORY {
                Connection::open_in_memory()
            } else {
                Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            }
        })
        .await??;

        debug!(url, "sqlite connection opened");

        Ok(Box::new(SqliteConnection {
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

type SharedConnection = Arc<Mutex<Option<Connection>>>;

struct SqliteConnection {
    conn: SharedConnection,
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn metadata(&self) -> DriverResult<Arc<dyn CatalogMetadata>> {
        if lock(&self.conn)?.is_none() {
            return Err(DriverError::Closed);
        }
        Ok(Arc::new(SqliteMetadata {
            conn: self.conn.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || match lock(&conn)?.take() {
            Some(c) => c.close().map_err(|(_, e)| DriverError::Sqlite(e)),
            None => Ok(()),
        })
        .await?
    }
}

/// Metadata handle sharing its connection's slot; empty once closed.
struct SqliteMetadata {
    conn: SharedConnection,
}

impl SqliteMetadata {
    /// Run one catalog query on the blocking pool and buffer its rows.
    async fn query(
        &self,
        sql: String,
        params: Vec<Option<String>>,
        keep: Option<Box<dyn Fn(&[Option<String>]) -> bool + Send>>,
    ) -> DriverResult<Box<dyn Cursor>> {
        let conn = self.conn.clone();
        let cursor = tokio::task::spawn_blocking(move || -> DriverResult<BufferedCursor> {
            let guard = lock(&conn)?;
            let conn = guard.as_ref().ok_or(DriverError::Closed)?;
            let (columns, mut rows) = query_rows(conn, &sql, &params)?;
            if let Some(keep) = keep {
                rows.retain(|row| keep(row.as_slice()));
            }
            Ok(BufferedCursor::new(columns, rows))
        })
        .await??;

        Ok(Box::new(cursor))
    }

    async fn foreign_keys(&self, filter: &str, table: Option<&str>) -> DriverResult<Box<dyn Cursor>> {
        let sql = format!(
            "{}  AND (?1 IS NULL OR {} = ?1 COLLATE NOCASE)\n\
             ORDER BY PKTABLE_NAME, FKTABLE_NAME, f.id, KEY_SEQ",
            FOREIGN_KEYS_SELECT, filter
        );
        self.query(sql, vec![table.map(str::to_string)], None).await
    }
}

#[async_trait]
impl CatalogMetadata for SqliteMetadata {
    async fn get_tables(
        &self,
        _catalog: Option<&str>,
        _schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> DriverResult<Box<dyn Cursor>> {
        let keep: Option<Box<dyn Fn(&[Option<String>]) -> bool + Send>> = if types.is_empty() {
            None
        } else {
            let wanted: Vec<String> = types.iter().map(|t| t.to_uppercase()).collect();
            // Column 4 is TABLE_TYPE.
            Some(Box::new(move |row: &[Option<String>]| {
                matches!(row.get(3), Some(Some(kind)) if wanted.contains(kind))
            }))
        };

        self.query(TABLES_SQL.to_string(), vec![Some(pattern(table_pattern))], keep)
            .await
    }

    async fn get_columns(
        &self,
        _catalog: Option<&str>,
        _schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.query(
            COLUMNS_SQL.to_string(),
            vec![Some(pattern(table_pattern)), Some(pattern(column_pattern))],
            None,
        )
        .await
    }

    async fn get_primary_keys(
        &self,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.query(
            PRIMARY_KEYS_SQL.to_string(),
            vec![table.map(str::to_string)],
            None,
        )
        .await
    }

    async fn get_imported_keys(
        &self,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.foreign_keys("m.name", table).await
    }

    async fn get_exported_keys(
        &self,
        _catalog: Option<&str>,
        _schema: Option<&str>,
        table: Option<&str>,
    ) -> DriverResult<Box<dyn Cursor>> {
        self.foreign_keys(r#"f."table""#, table).await
    }
}

fn pattern(value: Option<&str>) -> String {
    value.unwrap_or("%").to_string()
}

fn lock(conn: &SharedConnection) -> DriverResult<std::sync::MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|_| DriverError::Other("sqlite connection lock poisoned".to_string()))
}

type Rows = Vec<Vec<Option<String>>>;

fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &[Option<String>],
) -> rusqlite::Result<(Vec<String>, Rows)> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let count = columns.len();

    let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            (0..count)
                .map(|i| row.get_ref(i).map(value_to_string))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Rows>>()?;

    Ok((columns, rows))
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
