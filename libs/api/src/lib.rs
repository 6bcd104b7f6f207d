//! Conversation backend client.
//!
//! Three request/response operations back the widget: listing a
//! customer's conversations, provisioning a customer and opening a
//! conversation. Failures are returned to the caller as [`ApiError`];
//! nothing here retries.
mod client;
mod error;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use cws_core::{AccountId, Conversation, Customer, CustomerId};

pub use client::ReqwestConversationApi;
pub use error::ApiError;
pub use mock::{ApiCall, MockConversationApi};
pub use reqwest::StatusCode;

#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Lists the customer's conversations, most recent first.
    async fn fetch_customer_conversations(
        &self,
        customer_id: &CustomerId,
        account_id: &AccountId,
    ) -> Result<Vec<Conversation>, ApiError>;

    async fn create_new_customer(&self, account_id: &AccountId) -> Result<Customer, ApiError>;

    async fn create_new_conversation(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<Conversation, ApiError>;
}

pub type SharedConversationApi = Arc<dyn ConversationApi>;
