//! Identity stores hold the durable customer id of this device.
//!
//! The store is read once when a session activates and written once when
//! the backend provisions a new customer. Values never expire.
mod file_store;
mod memory;
#[cfg(feature = "store_sqlite")]
mod sqlite_store;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use cws_core::CustomerId;
use tracing::warn;

pub use file_store::FileIdentityStore;
pub use memory::MemoryIdentityStore;
#[cfg(feature = "store_sqlite")]
pub use sqlite_store::SqliteIdentityStore;

/// Shared identity store handle passed into the session controller.
pub type SharedIdentityStore = Arc<dyn IdentityStore>;

/// Directory under the platform data dir that holds widget state.
pub const DATA_DIR_NAME: &str = "cws";
pub const IDENTITY_FILE_NAME: &str = "identity.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity store io error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("identity document is malformed")]
    Malformed(#[source] serde_json::Error),
    #[error("identity store error")]
    Internal(#[source] anyhow::Error),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the stored customer id, or `None` when this device has
    /// never been provisioned.
    async fn get(&self) -> Result<Option<CustomerId>>;
    async fn set(&self, customer_id: &CustomerId) -> Result<()>;
}

/// Returns an in-memory identity store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedIdentityStore {
    Arc::new(MemoryIdentityStore::new())
}

/// Default identity file location inside the platform data directory.
pub fn default_identity_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(DATA_DIR_NAME).join(IDENTITY_FILE_NAME))
}

/// Builds an identity store for `path`, or for the default location when
/// `path` is `None`.
///
/// With the `store_sqlite` feature, a path ending in `.db`, `.sqlite` or
/// `.sqlite3` opens a SQLite store; any other path is a JSON file store.
/// Falls back to the in-memory store when no data directory can be
/// resolved, in which case the customer id lives only as long as the
/// process.
pub fn store_for_path(path: Option<PathBuf>) -> Result<SharedIdentityStore> {
    let Some(path) = path.or_else(default_identity_path) else {
        warn!("no data directory available; customer id will not survive restarts");
        return Ok(shared_memory_store());
    };
    #[cfg(feature = "store_sqlite")]
    if is_sqlite_path(&path) {
        return Ok(Arc::new(SqliteIdentityStore::open(&path)?));
    }
    Ok(Arc::new(FileIdentityStore::new(path)))
}

#[cfg(feature = "store_sqlite")]
fn is_sqlite_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "db" | "sqlite" | "sqlite3"))
}
