//! In-process channel relay.
//!
//! Every push is delivered to all subscribers of the topic, the publisher
//! included, which mirrors the broadcast behaviour of the chat server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::debug;

use crate::{ChannelError, InboundEvent, JoinAck, RealtimeChannel, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    pub client: u64,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

struct Subscriber {
    client: u64,
    events: HashSet<String>,
    sender: mpsc::UnboundedSender<InboundEvent>,
}

struct HubState {
    topics: HashMap<String, Vec<Subscriber>>,
    pushes: Vec<PushRecord>,
    join_reply: JoinAck,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            pushes: Vec::new(),
            join_reply: JoinAck::Ok(json!({})),
        }
    }
}

#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
    next_client: Arc<AtomicU64>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> LoopbackClient {
        LoopbackClient {
            id: self.next_client.fetch_add(1, Ordering::Relaxed) + 1,
            hub: self.clone(),
        }
    }

    /// Reply handed to every later join.
    pub async fn set_join_reply(&self, reply: JoinAck) {
        self.state.lock().await.join_reply = reply;
    }

    /// Delivers an event from outside any client, e.g. an agent reply.
    /// Returns the number of subscribers reached.
    pub async fn broadcast(&self, topic: &str, event: &str, payload: Value) -> usize {
        let mut state = self.state.lock().await;
        deliver(&mut state, topic, event, &payload)
    }

    pub async fn pushes(&self) -> Vec<PushRecord> {
        self.state.lock().await.pushes.clone()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|subscriber| !subscriber.sender.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }
}

fn deliver(state: &mut HubState, topic: &str, event: &str, payload: &Value) -> usize {
    let Some(subscribers) = state.topics.get_mut(topic) else {
        return 0;
    };
    subscribers.retain(|subscriber| !subscriber.sender.is_closed());
    let mut delivered = 0;
    for subscriber in subscribers.iter() {
        if !subscriber.events.contains(event) {
            continue;
        }
        let inbound = InboundEvent {
            topic: topic.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        if subscriber.sender.send(inbound).is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// One connection's view of a [`LoopbackHub`].
#[derive(Clone)]
pub struct LoopbackClient {
    id: u64,
    hub: LoopbackHub,
}

impl LoopbackClient {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl RealtimeChannel for LoopbackClient {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        let mut state = self.hub.state.lock().await;
        let subscribers = state.topics.entry(topic.to_string()).or_default();
        subscribers.retain(|subscriber| subscriber.client != self.id);
        subscribers.push(Subscriber {
            client: self.id,
            events: events.iter().map(|event| event.to_string()).collect(),
            sender,
        });
        let _ = ack_tx.send(state.join_reply.clone());
        debug!(client = self.id, topic, "loopback subscribe");
        Ok(Subscription {
            topic: topic.to_string(),
            events: receiver,
            ack: ack_rx,
        })
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        let mut state = self.hub.state.lock().await;
        let subscribed = state.topics.get(topic).is_some_and(|subscribers| {
            subscribers
                .iter()
                .any(|subscriber| subscriber.client == self.id)
        });
        if !subscribed {
            return Err(ChannelError::NotJoined(topic.to_string()));
        }
        state.pushes.push(PushRecord {
            client: self.id,
            topic: topic.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        deliver(&mut state, topic, event, &payload);
        Ok(())
    }

    async fn leave(&self, topic: &str) -> Result<(), ChannelError> {
        let mut state = self.hub.state.lock().await;
        let Some(subscribers) = state.topics.get_mut(topic) else {
            return Err(ChannelError::NotJoined(topic.to_string()));
        };
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.client != self.id);
        if subscribers.len() == before {
            return Err(ChannelError::NotJoined(topic.to_string()));
        }
        debug!(client = self.id, topic, "loopback leave");
        Ok(())
    }
}
