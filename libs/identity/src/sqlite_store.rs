use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use cws_core::CustomerId;
use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

use crate::{IdentityStore, StoreError};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS widget_identity (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

const CUSTOMER_ID_KEY: &str = "customer_id";

/// Identity stored in a single-row key/value table.
#[derive(Clone)]
pub struct SqliteIdentityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIdentityStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create identity directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open identity database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("identity database lock poisoned"))?;
            func(&guard)
        })
        .await
        .map_err(|err| StoreError::Internal(err.into()))?
    }
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn get(&self) -> Result<Option<CustomerId>> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM widget_identity WHERE key = ?1",
                    params![CUSTOMER_ID_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(CustomerId::from))
        })
        .await
    }

    async fn set(&self, customer_id: &CustomerId) -> Result<()> {
        let value = customer_id.to_string();
        let updated_at = OffsetDateTime::now_utc().unix_timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO widget_identity (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![CUSTOMER_ID_KEY, value, updated_at],
            )?;
            Ok(())
        })
        .await
    }
}
