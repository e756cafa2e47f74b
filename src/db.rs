//! # Database Module
//!
//! Manages the persistent .db file using WAL mode for concurrent access.
//! Handles database initialization, the embedded schema bootstrap, and
//! provides utilities for executing queries safely.

use crate::error::{ApiError, ApiResult};
use rusqlite::TransactionBehavior;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// The embedded schema. Applied on every startup; all statements are
/// idempotent.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    display_name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS brands (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS machine_models (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    brand_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    FOREIGN KEY (brand_id) REFERENCES brands(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS material_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS materials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    FOREIGN KEY (category_id) REFERENCES material_categories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS material_aliases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    material_id INTEGER NOT NULL,
    alias TEXT NOT NULL,
    FOREIGN KEY (material_id) REFERENCES materials(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    machine_model_id INTEGER NOT NULL,
    material_id INTEGER NOT NULL,
    operation_id INTEGER NOT NULL,
    power INTEGER NOT NULL,
    speed INTEGER NOT NULL,
    passes INTEGER NOT NULL DEFAULT 1,
    frequency INTEGER,
    dpi INTEGER,
    notes TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (machine_model_id) REFERENCES machine_models(id),
    FOREIGN KEY (material_id) REFERENCES materials(id),
    FOREIGN KEY (operation_id) REFERENCES operations(id),
    UNIQUE (user_id, machine_model_id, material_id, operation_id)
);

CREATE TABLE IF NOT EXISTS votes (
    user_id INTEGER NOT NULL,
    setting_id INTEGER NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (user_id, setting_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (setting_id) REFERENCES settings(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_settings_lookup
    ON settings(machine_model_id, material_id, operation_id);
CREATE INDEX IF NOT EXISTS idx_votes_setting ON votes(setting_id);
"#;

/// The Laserscribe store: manages the database connection and provides
/// query utilities for the handler layer.
pub struct Store {
    conn: Connection,
    path: String,
}

impl Store {
    /// Opens (or creates) the database at `path`, applies pragmas and the
    /// embedded schema.
    pub async fn new<P: AsRef<Path>>(path: P) -> ApiResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!("Opening database at: {}", path_str);

        let conn = Connection::open(&path_str)
            .await
            .map_err(|e| ApiError::Database(format!("failed to open database: {}", e)))?;

        Self::initialize_pragmas(&conn).await?;
        Self::initialize_schema(&conn).await?;

        Ok(Self {
            conn,
            path: path_str,
        })
    }

    /// Creates an in-memory database (useful for testing)
    pub async fn in_memory() -> ApiResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| ApiError::Database(format!("failed to create database: {}", e)))?;

        Self::initialize_pragmas(&conn).await?;
        Self::initialize_schema(&conn).await?;

        Ok(Self {
            conn,
            path: ":memory:".to_string(),
        })
    }

    /// WAL for concurrent readers, NORMAL sync, and foreign keys enforced
    /// (vote and setting integrity depend on them).
    async fn initialize_pragmas(conn: &Connection) -> ApiResult<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(|e| ApiError::Database(format!("failed to set pragmas: {}", e)))?;

        debug!("Database pragmas configured");
        Ok(())
    }

    async fn initialize_schema(conn: &Connection) -> ApiResult<()> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(|e| ApiError::Database(format!("schema bootstrap failed: {}", e)))?;

        debug!("Schema bootstrap complete");
        Ok(())
    }

    /// Execute a write query (INSERT, UPDATE, DELETE), returning the number
    /// of affected rows.
    pub async fn execute(&self, sql: &'static str, params: Vec<SqlValue>) -> ApiResult<u64> {
        self.conn
            .call(move |conn| {
                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
                let affected = conn.execute(sql, params_refs.as_slice())?;
                Ok(affected as u64)
            })
            .await
            .map_err(ApiError::from)
    }

    /// Run a typed read/write closure against the connection.
    ///
    /// Constraint violations propagate structurally so the error layer can
    /// classify them.
    pub async fn with_conn<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| f(conn).map_err(tokio_rusqlite::Error::Rusqlite))
            .await
            .map_err(ApiError::from)
    }

    /// Run a closure inside an IMMEDIATE transaction. Used where a write and
    /// a dependent read must observe each other (vote upsert + score).
    pub async fn with_transaction<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
            .map_err(ApiError::from)
    }

    /// Get the database file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if database is in-memory
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// SQL value wrapper for positional parameters
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlValue::Null => Ok(rusqlite::types::ToSqlOutput::Owned(
                rusqlite::types::Value::Null,
            )),
            SqlValue::Integer(i) => Ok(rusqlite::types::ToSqlOutput::Owned(
                rusqlite::types::Value::Integer(*i),
            )),
            SqlValue::Text(s) => Ok(rusqlite::types::ToSqlOutput::Owned(
                rusqlite::types::Value::Text(s.clone()),
            )),
        }
    }
}
