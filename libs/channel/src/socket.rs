//! Owned Phoenix websocket connection.
//!
//! [`PhoenixSocket::connect`] spawns a driver task that owns the websocket.
//! Handles talk to it over a command queue, so the socket can be shared
//! behind an `Arc` and torn down explicitly with [`PhoenixSocket::disconnect`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, Span, debug, info, trace, warn};
use url::Url;

use crate::backoff;
use crate::frame::{
    HEARTBEAT, HEARTBEAT_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_JOIN, PHX_LEAVE, PHX_REPLY, PhoenixFrame,
    VSN,
};
use crate::{ChannelError, InboundEvent, JoinAck, RealtimeChannel, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Socket mount point, e.g. `ws://localhost:4000/socket`.
    pub url: String,
    /// Extra connect params appended to the query string.
    pub params: BTreeMap<String, String>,
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Pushes held per topic while it is not joined. Buffered pushes also
    /// expire after `join_timeout`.
    pub max_buffered_pushes: usize,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: BTreeMap::new(),
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect_base: backoff::DEFAULT_BASE_DELAY,
            reconnect_max: backoff::DEFAULT_MAX_DELAY,
            max_buffered_pushes: 100,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Websocket endpoint: the mount point plus `/websocket`, connect params
    /// and the serializer version.
    pub fn endpoint_url(&self) -> Result<Url, ChannelError> {
        let mut url =
            Url::parse(&self.url).map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(ChannelError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| ChannelError::InvalidUrl(format!("cannot use scheme {scheme}")))?;

        let mount = url.path().trim_end_matches('/').to_string();
        if !mount.ends_with("/websocket") {
            url.set_path(&format!("{mount}/websocket"));
        }
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
            query.append_pair("vsn", VSN);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
}

enum Command {
    Join {
        topic: String,
        events: Vec<String>,
        sender: mpsc::UnboundedSender<InboundEvent>,
        ack: oneshot::Sender<JoinAck>,
    },
    Push {
        topic: String,
        event: String,
        payload: Value,
        done: oneshot::Sender<Result<(), ChannelError>>,
    },
    Leave {
        topic: String,
        done: oneshot::Sender<Result<(), ChannelError>>,
    },
    Disconnect,
}

pub struct PhoenixSocket {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PhoenixSocket {
    /// Starts connecting in the background. Must be called from within a
    /// Tokio runtime. Subscriptions and pushes issued before the socket is
    /// open are queued.
    pub fn connect(config: SocketConfig) -> Result<Self, ChannelError> {
        let endpoint = config.endpoint_url()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        info!(endpoint = %redacted(&endpoint), "realtime socket connecting");
        let driver = Driver {
            config,
            endpoint,
            commands: receiver,
            state: state_tx,
            topics: HashMap::new(),
            replies: HashMap::new(),
            next_ref: 0,
            heartbeat_ref: None,
        };
        let handle = tokio::spawn(driver.run().instrument(Span::current()));
        Ok(Self {
            commands,
            state,
            driver: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Closes the websocket and waits for the driver to stop. Every live
    /// subscription stream ends.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
        if let Some(handle) = self.driver.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "realtime driver task failed");
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), ChannelError> {
        self.commands.send(command).map_err(|_| ChannelError::Closed)
    }
}

#[async_trait]
impl RealtimeChannel for PhoenixSocket {
    async fn subscribe(&self, topic: &str, events: &[&str]) -> Result<Subscription, ChannelError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Join {
            topic: topic.to_string(),
            events: events.iter().map(|event| event.to_string()).collect(),
            sender,
            ack: ack_tx,
        })?;
        Ok(Subscription {
            topic: topic.to_string(),
            events: receiver,
            ack: ack_rx,
        })
    }

    async fn push(&self, topic: &str, event: &str, payload: Value) -> Result<(), ChannelError> {
        let (done, result) = oneshot::channel();
        self.send(Command::Push {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            done,
        })?;
        result.await.map_err(|_| ChannelError::Closed)?
    }

    async fn leave(&self, topic: &str) -> Result<(), ChannelError> {
        let (done, result) = oneshot::channel();
        self.send(Command::Leave {
            topic: topic.to_string(),
            done,
        })?;
        result.await.map_err(|_| ChannelError::Closed)?
    }
}

struct TopicState {
    events: HashSet<String>,
    sender: mpsc::UnboundedSender<InboundEvent>,
    ack: Option<oneshot::Sender<JoinAck>>,
    join_ref: Option<String>,
    joined: bool,
    /// When an unjoined topic gets its join re-sent.
    retry_at: Option<Instant>,
    buffer: Vec<BufferedPush>,
}

impl TopicState {
    /// Drops pushes queued at least `ttl` ago and returns how many.
    fn expire_buffer(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.buffer.len();
        self.buffer
            .retain(|push| now.saturating_duration_since(push.queued_at) < ttl);
        before - self.buffer.len()
    }
}

struct BufferedPush {
    event: String,
    payload: Value,
    queued_at: Instant,
}

enum Reply {
    Join(String),
    Heartbeat,
}

enum Flow {
    Reconnect,
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
enum Interrupt {
    #[error("websocket write failed: {0}")]
    Write(#[from] WsError),
    #[error("heartbeat reply missing")]
    HeartbeatTimeout,
}

struct Driver {
    config: SocketConfig,
    endpoint: Url,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    topics: HashMap<String, TopicState>,
    replies: HashMap<String, Reply>,
    next_ref: u64,
    heartbeat_ref: Option<String>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            let connected =
                tokio::time::timeout(self.config.connect_timeout, connect_async(self.endpoint.as_str()))
                    .await;
            let flow = match connected {
                Ok(Ok((ws, _response))) => {
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Open);
                    counter!("widget_socket_connections_total").increment(1);
                    info!(endpoint = %redacted(&self.endpoint), "realtime socket open");
                    self.run_open(ws).await
                }
                Ok(Err(err)) => {
                    counter!("widget_socket_errors_total", "kind" => "connect").increment(1);
                    warn!(error = %err, "realtime socket connect failed");
                    Flow::Reconnect
                }
                Err(_) => {
                    counter!("widget_socket_errors_total", "kind" => "connect_timeout").increment(1);
                    warn!("realtime socket connect timed out");
                    Flow::Reconnect
                }
            };
            if let Flow::Shutdown = flow {
                break;
            }

            self.reset_joins();
            attempt = attempt.saturating_add(1);
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt });
            let delay =
                backoff::delay_for(attempt, self.config.reconnect_base, self.config.reconnect_max);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            if let Flow::Shutdown = self.wait_offline(delay).await {
                break;
            }
        }
        self.state.send_replace(ConnectionState::Closed);
        info!("realtime socket closed");
    }

    async fn wait_offline(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Reconnect,
                command = self.commands.recv() => match command {
                    None | Some(Command::Disconnect) => return Flow::Shutdown,
                    Some(command) => self.handle_offline(command),
                },
            }
        }
    }

    fn handle_offline(&mut self, command: Command) {
        match command {
            Command::Join {
                topic,
                events,
                sender,
                ack,
            } => self.register(topic, events, sender, ack),
            Command::Push {
                topic,
                event,
                payload,
                done,
            } => {
                let _ = done.send(self.enqueue(topic, event, payload));
            }
            Command::Leave { topic, done } => {
                let result = match self.topics.remove(&topic) {
                    Some(_) => Ok(()),
                    None => Err(ChannelError::NotJoined(topic)),
                };
                let _ = done.send(result);
            }
            Command::Disconnect => {}
        }
    }

    async fn run_open(&mut self, ws: WsStream) -> Flow {
        let (mut sink, mut stream) = ws.split();

        let topics: Vec<String> = self.topics.keys().cloned().collect();
        for topic in topics {
            if let Err(err) = self.send_join(&mut sink, &topic).await {
                warn!(error = %err, "rejoin failed");
                return Flow::Reconnect;
            }
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.next_retry();
            let result = tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Disconnect) => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return Flow::Shutdown;
                    }
                    Some(command) => self.handle_online(&mut sink, command).await,
                },
                message = stream.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(&mut sink, text.as_str()).await,
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "server closed realtime socket");
                        return Flow::Reconnect;
                    }
                    Some(Ok(_)) => Ok(()),
                    Some(Err(err)) => {
                        counter!("widget_socket_errors_total", "kind" => "read").increment(1);
                        warn!(error = %err, "realtime socket read failed");
                        return Flow::Reconnect;
                    }
                    None => return Flow::Reconnect,
                },
                _ = heartbeat.tick() => self.send_heartbeat(&mut sink).await,
                _ = sleep_until(deadline) => self.retry_joins(&mut sink).await,
            };
            if let Err(err) = result {
                counter!("widget_socket_errors_total", "kind" => "write").increment(1);
                warn!(error = %err, "realtime socket interrupted; reconnecting");
                return Flow::Reconnect;
            }
        }
    }

    async fn handle_online(&mut self, sink: &mut WsSink, command: Command) -> Result<(), Interrupt> {
        match command {
            Command::Join {
                topic,
                events,
                sender,
                ack,
            } => {
                self.register(topic.clone(), events, sender, ack);
                self.send_join(sink, &topic).await
            }
            Command::Push {
                topic,
                event,
                payload,
                done,
            } => {
                let joined = self
                    .topics
                    .get(&topic)
                    .map(|state| (state.joined, state.join_ref.clone()));
                let join_ref = match joined {
                    Some((true, join_ref)) => join_ref,
                    _ => {
                        let _ = done.send(self.enqueue(topic, event, payload));
                        return Ok(());
                    }
                };
                let _ = done.send(Ok(()));
                let reference = self.next_ref();
                let frame = PhoenixFrame::new(topic, event, payload)
                    .with_refs(join_ref, Some(reference));
                if let Err(err) = send_frame(sink, &frame).await {
                    if let Some(state) = self.topics.get_mut(&frame.topic) {
                        state.buffer.push(BufferedPush {
                            event: frame.event,
                            payload: frame.payload,
                            queued_at: Instant::now(),
                        });
                    }
                    return Err(err.into());
                }
                Ok(())
            }
            Command::Leave { topic, done } => {
                let Some(state) = self.topics.remove(&topic) else {
                    let _ = done.send(Err(ChannelError::NotJoined(topic)));
                    return Ok(());
                };
                let _ = done.send(Ok(()));
                debug!(topic = %topic, "leaving channel");
                let Some(join_ref) = state.join_ref else {
                    return Ok(());
                };
                self.replies.remove(&join_ref);
                let reference = self.next_ref();
                let frame = PhoenixFrame::new(topic, PHX_LEAVE, json!({}))
                    .with_refs(Some(join_ref), Some(reference));
                send_frame(sink, &frame).await.map_err(Interrupt::from)
            }
            Command::Disconnect => Ok(()),
        }
    }

    async fn handle_frame(&mut self, sink: &mut WsSink, raw: &str) -> Result<(), Interrupt> {
        let Some(frame) = PhoenixFrame::decode(raw) else {
            debug!("ignoring undecodable frame");
            return Ok(());
        };
        match frame.event.as_str() {
            PHX_REPLY => self.handle_reply(sink, frame).await,
            PHX_ERROR => {
                let retry_at = Instant::now() + self.config.join_timeout;
                if let Some(state) = self.topics.get_mut(&frame.topic) {
                    if state.join_ref == frame.join_ref {
                        warn!(topic = %frame.topic, "channel errored; scheduling rejoin");
                        state.joined = false;
                        state.retry_at = Some(retry_at);
                    }
                }
                Ok(())
            }
            PHX_CLOSE => {
                let current = self
                    .topics
                    .get(&frame.topic)
                    .is_some_and(|state| state.join_ref == frame.join_ref);
                if current {
                    info!(topic = %frame.topic, "channel closed by server");
                    self.topics.remove(&frame.topic);
                }
                Ok(())
            }
            _ => {
                self.dispatch(frame);
                Ok(())
            }
        }
    }

    async fn handle_reply(&mut self, sink: &mut WsSink, frame: PhoenixFrame) -> Result<(), Interrupt> {
        let Some(reference) = frame.reference.clone() else {
            return Ok(());
        };
        let Some(reply) = self.replies.remove(&reference) else {
            trace!(reference = %reference, "reply without pending request");
            return Ok(());
        };
        let (status, response) = frame.reply();
        match reply {
            Reply::Heartbeat => {
                if self.heartbeat_ref.as_deref() == Some(reference.as_str()) {
                    self.heartbeat_ref = None;
                }
                Ok(())
            }
            Reply::Join(topic) => {
                let retry_at = Instant::now() + self.config.join_timeout;
                let Some(state) = self.topics.get_mut(&topic) else {
                    return Ok(());
                };
                if state.join_ref.as_deref() != Some(reference.as_str()) {
                    return Ok(());
                }
                if status != "ok" {
                    counter!("widget_channel_join_errors_total").increment(1);
                    warn!(topic = %topic, response = %response, "channel join rejected");
                    state.joined = false;
                    state.retry_at = Some(retry_at);
                    if let Some(ack) = state.ack.take() {
                        let _ = ack.send(JoinAck::Error(response));
                    }
                    return Ok(());
                }

                debug!(topic = %topic, "channel joined");
                state.joined = true;
                state.retry_at = None;
                if let Some(ack) = state.ack.take() {
                    let _ = ack.send(JoinAck::Ok(response));
                }
                let expired = state.expire_buffer(Instant::now(), self.config.join_timeout);
                report_expired(&topic, expired);
                let join_ref = state.join_ref.clone();
                let buffered = std::mem::take(&mut state.buffer);
                self.flush(sink, &topic, join_ref, buffered).await
            }
        }
    }

    async fn flush(
        &mut self,
        sink: &mut WsSink,
        topic: &str,
        join_ref: Option<String>,
        buffered: Vec<BufferedPush>,
    ) -> Result<(), Interrupt> {
        if !buffered.is_empty() {
            debug!(topic, count = buffered.len(), "flushing buffered pushes");
        }
        let mut pending = buffered.into_iter();
        while let Some(push) = pending.next() {
            let reference = self.next_ref();
            let frame = PhoenixFrame::new(topic, push.event, push.payload)
                .with_refs(join_ref.clone(), Some(reference));
            if let Err(err) = send_frame(sink, &frame).await {
                if let Some(state) = self.topics.get_mut(topic) {
                    let mut rest = vec![BufferedPush {
                        event: frame.event,
                        payload: frame.payload,
                        queued_at: push.queued_at,
                    }];
                    rest.extend(pending);
                    rest.append(&mut state.buffer);
                    state.buffer = rest;
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn dispatch(&self, frame: PhoenixFrame) {
        let Some(state) = self.topics.get(&frame.topic) else {
            trace!(topic = %frame.topic, event = %frame.event, "event for unknown topic");
            return;
        };
        if frame.join_ref.is_some() && frame.join_ref != state.join_ref {
            trace!(topic = %frame.topic, "event from a previous join");
            return;
        }
        if !state.events.contains(&frame.event) {
            trace!(topic = %frame.topic, event = %frame.event, "event not subscribed");
            return;
        }
        counter!("widget_channel_events_total", "event" => frame.event.clone()).increment(1);
        let event = InboundEvent {
            topic: frame.topic,
            event: frame.event,
            payload: frame.payload,
        };
        if state.sender.send(event).is_err() {
            debug!("subscriber dropped; discarding event");
        }
    }

    async fn send_join(&mut self, sink: &mut WsSink, topic: &str) -> Result<(), Interrupt> {
        let reference = self.next_ref();
        let retry_at = Instant::now() + self.config.join_timeout;
        let Some(state) = self.topics.get_mut(topic) else {
            return Ok(());
        };
        let previous = state.join_ref.replace(reference.clone());
        state.joined = false;
        state.retry_at = Some(retry_at);
        if let Some(previous) = previous {
            self.replies.remove(&previous);
        }
        self.replies
            .insert(reference.clone(), Reply::Join(topic.to_string()));
        debug!(topic, "joining channel");
        let frame = PhoenixFrame::new(topic, PHX_JOIN, json!({}))
            .with_refs(Some(reference.clone()), Some(reference));
        send_frame(sink, &frame).await.map_err(Interrupt::from)
    }

    async fn retry_joins(&mut self, sink: &mut WsSink) -> Result<(), Interrupt> {
        let now = Instant::now();
        let due: Vec<String> = self
            .topics
            .iter()
            .filter(|(_, state)| !state.joined && state.retry_at.is_some_and(|at| at <= now))
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in due {
            if let Some(state) = self.topics.get_mut(&topic) {
                let expired = state.expire_buffer(now, self.config.join_timeout);
                report_expired(&topic, expired);
                if let Some(ack) = state.ack.take() {
                    counter!("widget_channel_join_errors_total").increment(1);
                    warn!(topic = %topic, "channel join timed out");
                    let _ = ack.send(JoinAck::Timeout);
                }
            }
            debug!(topic = %topic, "retrying channel join");
            self.send_join(sink, &topic).await?;
        }
        Ok(())
    }

    async fn send_heartbeat(&mut self, sink: &mut WsSink) -> Result<(), Interrupt> {
        if let Some(pending) = self.heartbeat_ref.take() {
            self.replies.remove(&pending);
            return Err(Interrupt::HeartbeatTimeout);
        }
        let reference = self.next_ref();
        self.heartbeat_ref = Some(reference.clone());
        self.replies.insert(reference.clone(), Reply::Heartbeat);
        let frame = PhoenixFrame::new(HEARTBEAT_TOPIC, HEARTBEAT, json!({}))
            .with_refs(None, Some(reference));
        send_frame(sink, &frame).await.map_err(Interrupt::from)
    }

    /// Holds a push until `topic` is joined.
    fn enqueue(&mut self, topic: String, event: String, payload: Value) -> Result<(), ChannelError> {
        let now = Instant::now();
        let ttl = self.config.join_timeout;
        let limit = self.config.max_buffered_pushes;
        let Some(state) = self.topics.get_mut(&topic) else {
            return Err(ChannelError::NotJoined(topic));
        };
        let expired = state.expire_buffer(now, ttl);
        report_expired(&topic, expired);
        if state.buffer.len() >= limit {
            counter!("widget_channel_push_rejected_total").increment(1);
            warn!(topic = %topic, limit, "push buffer full; rejecting push");
            return Err(ChannelError::BufferFull(topic));
        }
        state.buffer.push(BufferedPush {
            event,
            payload,
            queued_at: now,
        });
        Ok(())
    }

    fn register(
        &mut self,
        topic: String,
        events: Vec<String>,
        sender: mpsc::UnboundedSender<InboundEvent>,
        ack: oneshot::Sender<JoinAck>,
    ) {
        if let Some(previous) = self.topics.get(&topic) {
            debug!(topic = %topic, "replacing existing subscription");
            if let Some(join_ref) = &previous.join_ref {
                self.replies.remove(join_ref);
            }
        }
        self.topics.insert(
            topic,
            TopicState {
                events: events.into_iter().collect(),
                sender,
                ack: Some(ack),
                join_ref: None,
                joined: false,
                retry_at: None,
                buffer: Vec::new(),
            },
        );
    }

    /// Forgets per-connection join state; topics and buffers survive.
    fn reset_joins(&mut self) {
        for state in self.topics.values_mut() {
            state.joined = false;
            state.join_ref = None;
            state.retry_at = None;
        }
        self.replies.clear();
        self.heartbeat_ref = None;
    }

    fn next_retry(&self) -> Option<Instant> {
        self.topics
            .values()
            .filter(|state| !state.joined)
            .filter_map(|state| state.retry_at)
            .min()
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }
}

async fn send_frame(sink: &mut WsSink, frame: &PhoenixFrame) -> Result<(), WsError> {
    match frame.encode() {
        Ok(raw) => sink.send(WsMessage::Text(raw.into())).await,
        Err(err) => {
            warn!(error = %err, topic = %frame.topic, event = %frame.event, "dropping unencodable frame");
            Ok(())
        }
    }
}

fn report_expired(topic: &str, expired: usize) {
    if expired > 0 {
        counter!("widget_channel_push_timeouts_total").increment(expired as u64);
        warn!(topic, expired, "dropping buffered pushes older than the join timeout");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Endpoint without its query string; connect params may carry tokens.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
