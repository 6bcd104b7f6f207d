#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cws_api::MockConversationApi;
use cws_channel::{
    ChannelError, LoopbackClient, LoopbackHub, RealtimeChannel, SharedRealtimeChannel, Subscription,
};
use cws_core::{AccountId, CustomerId};
use cws_identity::{IdentityStore, MemoryIdentityStore};
use cws_session::{SessionController, SessionDeps, SessionSnapshot};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

pub const ACCOUNT: &str = "acct1";

pub struct Harness {
    pub controller: SessionController,
    pub api: Arc<MockConversationApi>,
    pub identity: Arc<MemoryIdentityStore>,
    pub hub: LoopbackHub,
}

pub fn harness(api: MockConversationApi, identity: MemoryIdentityStore) -> Harness {
    let hub = LoopbackHub::new();
    let channel: SharedRealtimeChannel = Arc::new(hub.client());
    harness_with_channel(api, identity, hub, channel)
}

pub fn harness_with_channel(
    api: MockConversationApi,
    identity: MemoryIdentityStore,
    hub: LoopbackHub,
    channel: SharedRealtimeChannel,
) -> Harness {
    let api = Arc::new(api);
    let identity = Arc::new(identity);
    let controller = SessionController::new(SessionDeps {
        account_id: AccountId::from(ACCOUNT),
        identity: identity.clone(),
        api: api.clone(),
        channel,
    });
    Harness {
        controller,
        api,
        identity,
        hub,
    }
}

pub fn known_customer(id: &str) -> MemoryIdentityStore {
    MemoryIdentityStore::with_customer(CustomerId::from(id))
}

pub async fn stored_customer(identity: &MemoryIdentityStore) -> Option<CustomerId> {
    identity.get().await.unwrap()
}

pub async fn wait_for_snapshot(
    controller: &SessionController,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut watch = controller.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), watch.wait_for(predicate))
        .await
        .expect("snapshot in time")
        .expect("controller alive");
    snapshot.clone()
}

/// Channel operation observed by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Subscribe(String),
    Push(String),
    Leave(String),
}

/// Loopback channel that records every call in order.
pub struct RecordingChannel {
    inner: LoopbackClient,
    calls: Mutex<Vec<ChannelCall>>,
}

impl RecordingChannel {
    pub fn new(hub: &LoopbackHub) -> Self {
        Self {
            inner: hub.client(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: ChannelCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RealtimeChannel for RecordingChannel {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        self.record(ChannelCall::Subscribe(topic.to_string())).await;
        self.inner.subscribe(topic, events).await
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        self.record(ChannelCall::Push(topic.to_string())).await;
        self.inner.push(topic, event, payload).await
    }

    async fn leave(&self, topic: &str) -> Result<(), ChannelError> {
        self.record(ChannelCall::Leave(topic.to_string())).await;
        self.inner.leave(topic).await
    }
}

/// Channel without a leave capability.
pub struct NoLeaveChannel {
    inner: LoopbackClient,
}

impl NoLeaveChannel {
    pub fn new(hub: &LoopbackHub) -> Self {
        Self {
            inner: hub.client(),
        }
    }
}

#[async_trait]
impl RealtimeChannel for NoLeaveChannel {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        self.inner.subscribe(topic, events).await
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        self.inner.push(topic, event, payload).await
    }
}

/// Channel whose pushes always fail.
pub struct BrokenPushChannel {
    inner: LoopbackClient,
}

impl BrokenPushChannel {
    pub fn new(hub: &LoopbackHub) -> Self {
        Self {
            inner: hub.client(),
        }
    }
}

#[async_trait]
impl RealtimeChannel for BrokenPushChannel {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        self.inner.subscribe(topic, events).await
    }

    async fn push(&self, _topic: &str, _event: &str, _payload: Value) -> Result<(), ChannelError> {
        Err(ChannelError::Closed)
    }
}

/// Channel whose first subscribe waits for a release signal and whose
/// leave always fails.
pub struct GatedJoinChannel {
    inner: LoopbackClient,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    leaves: Mutex<Vec<String>>,
}

impl GatedJoinChannel {
    pub fn new(hub: &LoopbackHub) -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let channel = Self {
            inner: hub.client(),
            gate: Mutex::new(Some(gate)),
            leaves: Mutex::new(Vec::new()),
        };
        (channel, release)
    }

    pub async fn leaves(&self) -> Vec<String> {
        self.leaves.lock().await.clone()
    }
}

#[async_trait]
impl RealtimeChannel for GatedJoinChannel {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.subscribe(topic, events).await
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        self.inner.push(topic, event, payload).await
    }

    async fn leave(&self, topic: &str) -> Result<(), ChannelError> {
        self.leaves.lock().await.push(topic.to_string());
        Err(ChannelError::Closed)
    }
}

/// Channel whose pushes take `delay` and then succeed or fail.
pub struct SlowPushChannel {
    inner: LoopbackClient,
    delay: Duration,
    fail: bool,
}

impl SlowPushChannel {
    pub fn new(hub: &LoopbackHub, delay: Duration) -> Self {
        Self {
            inner: hub.client(),
            delay,
            fail: false,
        }
    }

    pub fn failing(hub: &LoopbackHub, delay: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(hub, delay)
        }
    }
}

#[async_trait]
impl RealtimeChannel for SlowPushChannel {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        self.inner.subscribe(topic, events).await
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(ChannelError::Closed);
        }
        self.inner.push(topic, event, payload).await
    }
}
