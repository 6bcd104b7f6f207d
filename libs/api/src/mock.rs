use async_trait::async_trait;
use cws_core::{AccountId, Conversation, Customer, CustomerId};
use reqwest::StatusCode;
use tokio::sync::{Mutex, oneshot};

use crate::{ApiError, ConversationApi};

/// A call observed by [`MockConversationApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    FetchCustomerConversations {
        customer_id: CustomerId,
        account_id: AccountId,
    },
    CreateNewCustomer {
        account_id: AccountId,
    },
    CreateNewConversation {
        account_id: AccountId,
        customer_id: CustomerId,
    },
}

/// Scripted conversation backend that records every call.
///
/// Failures are scripted as HTTP statuses and surface as
/// [`ApiError::Remote`].
pub struct MockConversationApi {
    calls: Mutex<Vec<ApiCall>>,
    conversations: Result<Vec<Conversation>, StatusCode>,
    customer: Result<Customer, StatusCode>,
    conversation: Result<Conversation, StatusCode>,
    fetch_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockConversationApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            conversations: Ok(Vec::new()),
            customer: Ok(Customer {
                id: CustomerId::from("cust-mock"),
            }),
            conversation: Ok(Conversation::new("conv-mock")),
            fetch_gate: Mutex::new(None),
        }
    }

    pub fn with_conversations(mut self, conversations: Vec<Conversation>) -> Self {
        self.conversations = Ok(conversations);
        self
    }

    pub fn failing_fetch(mut self, status: StatusCode) -> Self {
        self.conversations = Err(status);
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer = Ok(Customer {
            id: customer_id.into(),
        });
        self
    }

    pub fn failing_customer(mut self, status: StatusCode) -> Self {
        self.customer = Err(status);
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Ok(conversation);
        self
    }

    pub fn failing_conversation(mut self, status: StatusCode) -> Self {
        self.conversation = Err(status);
        self
    }

    /// Holds the next conversation lookup until the returned sender fires
    /// or is dropped.
    pub async fn gate_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.fetch_gate.lock().await = Some(rx);
        tx
    }

    pub async fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|call| predicate(call)).count()
    }

    async fn record(&self, call: ApiCall) {
        self.calls.lock().await.push(call);
    }
}

impl Default for MockConversationApi {
    fn default() -> Self {
        Self::new()
    }
}

fn scripted<T: Clone>(response: &Result<T, StatusCode>) -> Result<T, ApiError> {
    response.clone().map_err(|status| ApiError::Remote {
        status,
        message: "scripted failure".into(),
    })
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn fetch_customer_conversations(
        &self,
        customer_id: &CustomerId,
        account_id: &AccountId,
    ) -> Result<Vec<Conversation>, ApiError> {
        self.record(ApiCall::FetchCustomerConversations {
            customer_id: customer_id.clone(),
            account_id: account_id.clone(),
        })
        .await;
        let gate = self.fetch_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        scripted(&self.conversations)
    }

    async fn create_new_customer(&self, account_id: &AccountId) -> Result<Customer, ApiError> {
        self.record(ApiCall::CreateNewCustomer {
            account_id: account_id.clone(),
        })
        .await;
        scripted(&self.customer)
    }

    async fn create_new_conversation(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<Conversation, ApiError> {
        self.record(ApiCall::CreateNewConversation {
            account_id: account_id.clone(),
            customer_id: customer_id.clone(),
        })
        .await;
        scripted(&self.conversation)
    }
}
