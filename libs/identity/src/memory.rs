use anyhow::Result;
use async_trait::async_trait;
use cws_core::CustomerId;
use tokio::sync::RwLock;

use crate::IdentityStore;

#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: RwLock<Option<CustomerId>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(customer_id: CustomerId) -> Self {
        Self {
            inner: RwLock::new(Some(customer_id)),
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self) -> Result<Option<CustomerId>> {
        Ok(self.inner.read().await.clone())
    }

    async fn set(&self, customer_id: &CustomerId) -> Result<()> {
        *self.inner.write().await = Some(customer_id.clone());
        Ok(())
    }
}
