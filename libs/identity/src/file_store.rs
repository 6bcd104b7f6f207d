use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use cws_core::CustomerId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, sync::Mutex};
use tracing::debug;

use crate::{IdentityStore, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct IdentityDocument {
    customer_id: CustomerId,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

/// Identity stored as a small JSON document on disk.
///
/// Writes go through a sibling temp file and a rename so a crash never
/// leaves a truncated document behind.
pub struct FileIdentityStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self) -> Result<Option<CustomerId>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err).into()),
        };
        let document: IdentityDocument =
            serde_json::from_slice(&raw).map_err(StoreError::Malformed)?;
        Ok(Some(document.customer_id))
    }

    async fn set(&self, customer_id: &CustomerId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let document = IdentityDocument {
            customer_id: customer_id.clone(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_vec_pretty(&document).map_err(StoreError::Malformed)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)
            .await
            .map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        debug!(path = %self.path.display(), "persisted customer id");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("identity.json"));
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn value_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.json");

        FileIdentityStore::new(&path)
            .set(&CustomerId::from("cust1"))
            .await
            .unwrap();

        let reopened = FileIdentityStore::new(&path);
        assert_eq!(reopened.get().await.unwrap(), Some(CustomerId::from("cust1")));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = FileIdentityStore::new(&path).get().await.unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }
}
