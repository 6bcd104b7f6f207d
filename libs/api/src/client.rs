use std::time::Instant;

use async_trait::async_trait;
use cws_core::{AccountId, Conversation, Customer, CustomerId};
use metrics::{counter, histogram};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use tracing::debug;

use crate::{ApiError, ConversationApi};

const MAX_ERROR_BODY: usize = 512;

pub struct ReqwestConversationApi {
    client: Client,
    base_url: Url,
}

impl ReqwestConversationApi {
    pub fn new(client: Client, base_url: &str) -> Result<Self, ApiError> {
        let mut url = Url::parse(base_url).map_err(|err| ApiError::Config(err.into()))?;
        if !base_url.ends_with('/') {
            url = url
                .join(&format!("{}/", url.path().trim_end_matches('/')))
                .map_err(|err| ApiError::Config(err.into()))?;
        }
        Ok(Self {
            client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::Config(err.into()))
    }

    async fn execute<T>(&self, endpoint: &'static str, request: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let response = request.send().await.map_err(|err| {
            counter!(
                "widget_api_errors_total",
                "kind" => "transport",
                "endpoint" => endpoint
            )
            .increment(1);
            ApiError::Transport(err)
        })?;

        let status_label = response.status().as_str().to_string();
        histogram!(
            "widget_api_roundtrip_seconds",
            "endpoint" => endpoint,
            "status" => status_label
        )
        .record(started.elapsed().as_secs_f64());

        map_response(endpoint, response).await
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct NewCustomer<'a> {
    account_id: &'a AccountId,
    #[serde(with = "time::serde::rfc3339")]
    first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    last_seen: OffsetDateTime,
}

#[derive(Debug, Serialize)]
struct NewConversation<'a> {
    account_id: &'a AccountId,
    customer_id: &'a CustomerId,
}

#[derive(Debug, Serialize)]
struct CustomerRequest<'a> {
    customer: NewCustomer<'a>,
}

#[derive(Debug, Serialize)]
struct ConversationRequest<'a> {
    conversation: NewConversation<'a>,
}

#[async_trait]
impl ConversationApi for ReqwestConversationApi {
    async fn fetch_customer_conversations(
        &self,
        customer_id: &CustomerId,
        account_id: &AccountId,
    ) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint("api/conversations/customer")?;
        debug!(%customer_id, %account_id, "fetching customer conversations");
        let request = self.client.get(url).query(&[
            ("customer_id", customer_id.as_str()),
            ("account_id", account_id.as_str()),
        ]);
        self.execute("conversations.customer", request)
            .await
            .map(|envelope: DataEnvelope<Vec<Conversation>>| envelope.data)
    }

    async fn create_new_customer(&self, account_id: &AccountId) -> Result<Customer, ApiError> {
        let url = self.endpoint("api/customers")?;
        let now = OffsetDateTime::now_utc();
        let body = CustomerRequest {
            customer: NewCustomer {
                account_id,
                first_seen: now,
                last_seen: now,
            },
        };
        let request = self.client.post(url).json(&body);
        self.execute("customers.create", request)
            .await
            .map(|envelope: DataEnvelope<Customer>| envelope.data)
    }

    async fn create_new_conversation(
        &self,
        account_id: &AccountId,
        customer_id: &CustomerId,
    ) -> Result<Conversation, ApiError> {
        let url = self.endpoint("api/conversations")?;
        let body = ConversationRequest {
            conversation: NewConversation {
                account_id,
                customer_id,
            },
        };
        let request = self.client.post(url).json(&body);
        self.execute("conversations.create", request)
            .await
            .map(|envelope: DataEnvelope<Conversation>| envelope.data)
    }
}

async fn map_response<T>(endpoint: &'static str, response: reqwest::Response) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let status_label = status.as_str().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".into());
        counter!(
            "widget_api_errors_total",
            "kind" => "remote",
            "endpoint" => endpoint,
            "status" => status_label
        )
        .increment(1);
        return Err(ApiError::Remote {
            status,
            message: truncate(body, MAX_ERROR_BODY),
        });
    }

    response.json::<T>().await.map_err(|err| {
        counter!(
            "widget_api_errors_total",
            "kind" => "decode",
            "endpoint" => endpoint
        )
        .increment(1);
        ApiError::Decode(err.into())
    })
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
