use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cws_api::SharedConversationApi;
use cws_channel::{
    ChannelError, InboundEvent, JoinAck, SHOUT, SharedRealtimeChannel, conversation_topic,
};
use cws_core::{
    AccountId, Conversation, ConversationId, CustomerId, Message, OutboundShout, hydrate_messages,
    inbound_message,
};
use cws_identity::SharedIdentityStore;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, warn};

use crate::telemetry::{record_error, record_received, record_sent, span_for_session};
use crate::{
    Bootstrap, InputEvent, Key, Phase, SessionError, SessionSnapshot, SubmitOutcome, ViewEvent,
};

const VIEW_EVENT_CAPACITY: usize = 64;

/// Collaborators of a session. The realtime connection is owned by the
/// caller, which connects it before and disconnects it after the session.
pub struct SessionDeps {
    pub account_id: AccountId,
    pub identity: SharedIdentityStore,
    pub api: SharedConversationApi,
    pub channel: SharedRealtimeChannel,
}

/// Drives one widget session. Cloning yields another handle to the same
/// session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    account_id: AccountId,
    identity: SharedIdentityStore,
    api: SharedConversationApi,
    channel: SharedRealtimeChannel,
    /// Bumped by every bootstrap attempt; results from older attempts are
    /// discarded.
    generation: AtomicU64,
    state: Mutex<State>,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<ViewEvent>,
}

#[derive(Default)]
struct State {
    view: SessionSnapshot,
    subscription: Option<ActiveSubscription>,
}

struct ActiveSubscription {
    generation: u64,
    topic: String,
    relay: JoinHandle<()>,
    ack: JoinHandle<()>,
}

impl ActiveSubscription {
    fn abort(&self) {
        self.relay.abort();
        self.ack.abort();
    }
}

impl SessionController {
    pub fn new(deps: SessionDeps) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(VIEW_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                account_id: deps.account_id,
                identity: deps.identity,
                api: deps.api,
                channel: deps.channel,
                generation: AtomicU64::new(0),
                state: Mutex::new(State::default()),
                snapshot,
                events,
            }),
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.inner.account_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn view_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves identity and conversation, then joins the conversation
    /// channel. Failures are logged and reported as [`Bootstrap::Degraded`].
    pub async fn activate(&self) -> Bootstrap {
        let generation = self.inner.begin();
        let span = span_for_session("activate", &self.inner.account_id, None, None);
        self.inner.activate(generation).instrument(span).await
    }

    /// Creates a fresh conversation for the current customer (provisioning
    /// one when none is known) and switches the channel to it.
    pub async fn initialize_new_conversation(&self) -> Bootstrap {
        let generation = self.inner.begin();
        let known = self.snapshot().customer_id.filter(|id| !id.is_blank());
        let span = span_for_session(
            "new_conversation",
            &self.inner.account_id,
            known.as_ref(),
            None,
        );
        let inner = &self.inner;
        async move {
            let known = match known {
                Some(customer_id) => Some(customer_id),
                None => inner.read_identity().await,
            };
            inner.provision(generation, known).await
        }
        .instrument(span)
        .await
    }

    pub async fn handle_input(
        &self,
        input: InputEvent,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        match input {
            InputEvent::DraftChanged(draft) => {
                self.set_draft(draft).await;
                Ok(None)
            }
            InputEvent::KeyDown(Key::Enter) | InputEvent::SubmitClicked => {
                self.submit().await.map(Some)
            }
            InputEvent::KeyDown(Key::Other(_)) => Ok(None),
        }
    }

    pub async fn set_draft(&self, draft: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.view.draft = draft.into();
        self.inner.snapshot.send_replace(state.view.clone());
    }

    /// Publishes the draft as a `shout`.
    ///
    /// The draft is taken and cleared before the push, so a second submit
    /// racing this one sees an empty draft. The sent message is not
    /// appended locally; it shows up once the channel relays it back on the
    /// subscription. A failed publish puts the text back unless the user
    /// has typed something new in the meantime.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let inner = &self.inner;
        let (topic, shout) = {
            let mut state = inner.state.lock().await;
            if state.view.draft.trim().is_empty() {
                return Ok(SubmitOutcome::EmptyDraft);
            }
            let ready = (
                state.view.phase,
                state.subscription.as_ref().map(|current| current.topic.clone()),
                state.view.conversation_id.clone(),
                state.view.customer_id.clone(),
            );
            let (Phase::Active, Some(topic), Some(conversation_id), Some(customer_id)) = ready
            else {
                debug!("submit before the conversation channel is active; keeping draft");
                return Ok(SubmitOutcome::NotReady);
            };
            let body = std::mem::take(&mut state.view.draft);
            inner.snapshot.send_replace(state.view.clone());
            let shout = OutboundShout::from_customer(
                body,
                conversation_id,
                inner.account_id.clone(),
                customer_id,
            );
            (topic, shout)
        };

        let span = span_for_session(
            "submit",
            &inner.account_id,
            Some(&shout.customer_id),
            Some(&shout.conversation_id),
        );
        let published = match serde_json::to_value(&shout) {
            Ok(payload) => inner
                .channel
                .push(&topic, SHOUT, payload)
                .instrument(span.clone())
                .await
                .map_err(SessionError::from),
            Err(err) => Err(SessionError::from(err)),
        };
        if let Err(err) = published {
            span.in_scope(|| report(&err, "publishing message failed; restoring draft"));
            inner.restore_draft(shout.body).await;
            return Err(err);
        }

        record_sent();
        span.in_scope(|| debug!(topic = %topic, "message published"));
        Ok(SubmitOutcome::Sent)
    }

    /// Stops relaying and leaves the current conversation channel.
    pub async fn close(&self) {
        self.inner.begin();
        let previous = self.inner.state.lock().await.subscription.take();
        if let Some(previous) = previous {
            self.inner.leave(previous).await;
        }
    }
}

impl Inner {
    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Applies `apply` unless `generation` is stale, then publishes the
    /// new snapshot.
    async fn update(&self, generation: u64, apply: impl FnOnce(&mut SessionSnapshot)) -> bool {
        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            return false;
        }
        apply(&mut state.view);
        self.snapshot.send_replace(state.view.clone());
        true
    }

    fn superseded(&self, step: &'static str) -> Bootstrap {
        info!(step, "newer bootstrap in progress; discarding result");
        Bootstrap::Superseded
    }

    /// Ends a failed attempt. A session that still holds a live
    /// subscription stays active on it.
    async fn degraded(&self, generation: u64) -> Bootstrap {
        let mut state = self.state.lock().await;
        if self.is_current(generation) && state.subscription.is_some() {
            state.view.phase = Phase::Active;
            self.snapshot.send_replace(state.view.clone());
        }
        Bootstrap::Degraded
    }

    /// Puts an unsent body back into an empty draft.
    async fn restore_draft(&self, body: String) {
        let mut state = self.state.lock().await;
        if state.view.draft.is_empty() {
            state.view.draft = body;
            self.snapshot.send_replace(state.view.clone());
        } else {
            debug!("draft edited while publishing; not restoring unsent text");
        }
    }

    async fn read_identity(&self) -> Option<CustomerId> {
        match self.identity.get().await {
            Ok(Some(customer_id)) if customer_id.is_blank() => {
                debug!("stored customer id is blank; treating customer as unknown");
                None
            }
            Ok(customer_id) => customer_id,
            Err(err) => {
                report(
                    &SessionError::Identity(err),
                    "identity store read failed; treating customer as unknown",
                );
                None
            }
        }
    }

    async fn activate(self: &Arc<Self>, generation: u64) -> Bootstrap {
        if !self
            .update(generation, |view| view.phase = Phase::ResolvingIdentity)
            .await
        {
            return self.superseded("resolve_identity");
        }

        let Some(customer_id) = self.read_identity().await else {
            debug!("no stored customer id");
            return self.provision(generation, None).await;
        };
        let recorded = self
            .update(generation, |view| {
                view.customer_id = Some(customer_id.clone());
                view.phase = Phase::ResolvingConversation;
            })
            .await;
        if !recorded {
            return self.superseded("resolve_identity");
        }

        match self
            .api
            .fetch_customer_conversations(&customer_id, &self.account_id)
            .await
        {
            Ok(conversations) => match conversations.into_iter().next() {
                Some(latest) => self.resume(generation, latest).await,
                None => {
                    info!(customer_id = %customer_id, "customer has no conversations");
                    self.provision(generation, Some(customer_id)).await
                }
            },
            Err(err) => {
                report(
                    &SessionError::Api(err),
                    "conversation lookup failed; starting a new conversation",
                );
                self.provision(generation, Some(customer_id)).await
            }
        }
    }

    async fn resume(self: &Arc<Self>, generation: u64, conversation: Conversation) -> Bootstrap {
        let conversation_id = conversation.id;
        let messages = hydrate_messages(conversation.messages);
        let count = messages.len();
        let applied = self
            .update(generation, |view| {
                view.conversation_id = Some(conversation_id.clone());
                view.messages = messages;
            })
            .await;
        if !applied {
            return self.superseded("resolve_conversation");
        }
        info!(conversation_id = %conversation_id, messages = count, "resuming latest conversation");
        self.join(generation, conversation_id).await
    }

    /// Creates the customer when `known` is `None`, persists it, then
    /// creates a conversation with an empty message list.
    async fn provision(self: &Arc<Self>, generation: u64, known: Option<CustomerId>) -> Bootstrap {
        if !self
            .update(generation, |view| view.phase = Phase::ResolvingConversation)
            .await
        {
            return self.superseded("provision");
        }

        let customer_id = match known {
            Some(customer_id) => customer_id,
            None => {
                let customer = match self.api.create_new_customer(&self.account_id).await {
                    Ok(customer) => customer,
                    Err(err) => {
                        report(&SessionError::Api(err), "customer provisioning failed");
                        return self.degraded(generation).await;
                    }
                };
                if !self.is_current(generation) {
                    return self.superseded("create_customer");
                }
                if let Err(err) = self.identity.set(&customer.id).await {
                    report(&SessionError::Identity(err), "failed to persist customer id");
                }
                let recorded = self
                    .update(generation, |view| view.customer_id = Some(customer.id.clone()))
                    .await;
                if !recorded {
                    return self.superseded("create_customer");
                }
                info!(customer_id = %customer.id, "provisioned customer");
                customer.id
            }
        };

        let conversation = match self
            .api
            .create_new_conversation(&self.account_id, &customer_id)
            .await
        {
            Ok(conversation) => conversation,
            Err(err) => {
                report(&SessionError::Api(err), "conversation creation failed");
                return self.degraded(generation).await;
            }
        };
        let conversation_id = conversation.id;
        let applied = self
            .update(generation, |view| {
                view.customer_id = Some(customer_id.clone());
                view.conversation_id = Some(conversation_id.clone());
                view.messages.clear();
            })
            .await;
        if !applied {
            return self.superseded("create_conversation");
        }
        info!(customer_id = %customer_id, conversation_id = %conversation_id, "created conversation");
        self.join(generation, conversation_id).await
    }

    /// Leaves the previous subscription, subscribes to the conversation
    /// topic and marks the session active without waiting for the join
    /// acknowledgement.
    async fn join(self: &Arc<Self>, generation: u64, conversation_id: ConversationId) -> Bootstrap {
        let previous = {
            let mut state = self.state.lock().await;
            if !self.is_current(generation) {
                return self.superseded("join");
            }
            state.view.phase = Phase::ChannelJoining;
            self.snapshot.send_replace(state.view.clone());
            state.subscription.take()
        };
        if let Some(previous) = previous {
            self.leave(previous).await;
        }

        let topic = conversation_topic(&conversation_id);
        let subscription = match self.channel.subscribe(&topic, &[SHOUT]).await {
            Ok(subscription) => subscription,
            Err(err) => {
                report(&SessionError::Channel(err), "conversation channel subscribe failed");
                return self.degraded(generation).await;
            }
        };

        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            let replaced_same_topic = state
                .subscription
                .as_ref()
                .is_some_and(|current| current.topic == topic);
            drop(state);
            if !replaced_same_topic {
                self.leave_topic(&topic).await;
            }
            return self.superseded("join");
        }
        let relay = tokio::spawn(
            relay(Arc::downgrade(self), generation, subscription.events)
                .instrument(Span::current()),
        );
        let ack = tokio::spawn(log_join_ack(topic.clone(), subscription.ack).instrument(Span::current()));
        state.subscription = Some(ActiveSubscription {
            generation,
            topic: topic.clone(),
            relay,
            ack,
        });
        state.view.phase = Phase::Active;
        self.snapshot.send_replace(state.view.clone());
        drop(state);

        let _ = self.events.send(ViewEvent::ScrollToLatest);
        info!(topic = %topic, "session active");
        Bootstrap::Joined(conversation_id)
    }

    async fn leave(&self, previous: ActiveSubscription) {
        previous.abort();
        self.leave_topic(&previous.topic).await;
    }

    async fn leave_topic(&self, topic: &str) {
        match self.channel.leave(topic).await {
            Ok(()) => debug!(topic, "left conversation channel"),
            Err(ChannelError::LeaveUnsupported) => debug!(topic, "channel cannot leave; skipping"),
            Err(err) => report(&SessionError::Channel(err), "leaving conversation channel failed"),
        }
    }

    /// Appends an inbound message if `generation` still owns the
    /// subscription.
    async fn append(&self, generation: u64, message: Message) -> bool {
        let mut state = self.state.lock().await;
        let owner = state.subscription.as_ref().map(|current| current.generation);
        if owner != Some(generation) {
            return false;
        }
        state.view.messages.push(message);
        self.snapshot.send_replace(state.view.clone());
        drop(state);

        record_received();
        let _ = self.events.send(ViewEvent::ScrollToLatest);
        true
    }
}

async fn relay(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<InboundEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let Some(message) = inbound_message(&event.payload) else {
            record_error("decode");
            warn!(topic = %event.topic, "dropping inbound message without a body");
            continue;
        };
        if !inner.append(generation, message).await {
            debug!("subscription replaced; stopping relay");
            break;
        }
    }
}

async fn log_join_ack(topic: String, ack: oneshot::Receiver<JoinAck>) {
    match ack.await {
        Ok(JoinAck::Ok(_)) => info!(topic = %topic, "joined conversation channel"),
        Ok(JoinAck::Error(response)) => {
            record_error("join");
            warn!(topic = %topic, response = %response, "conversation channel join failed");
        }
        Ok(JoinAck::Timeout) => {
            record_error("join");
            warn!(topic = %topic, "conversation channel join timed out");
        }
        Err(_) => debug!(topic = %topic, "join acknowledgement dropped"),
    }
}

fn report(err: &SessionError, message: &'static str) {
    record_error(err.kind());
    warn!(kind = err.kind(), error = %chain(err), "{message}");
}

fn chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
