//! Broker engine
//!
//! This module contains the in-process message broker sitting between the
//! engine and the platform. It is responsible for:
//! - registering handlers by direction, topic and action
//! - dispatching every message to its exact, topic and global subscribers
//! - correlating replies with publishers blocked in a synchronous publish
//!
//! Concurrency and usage notes:
//! - Each direction has its own [`Executor`]. Every publish for a direction,
//!   synchronous or not, runs on that executor, so messages are delivered in
//!   the order they were published. A synchronous publish holds its executor
//!   until the reply arrives or times out, which also holds back every later
//!   message in that direction. Handlers should return quickly for the same
//!   reason.
//! - Incoming and outgoing traffic are not ordered relative to each other.
//! - The subscriber map and the pending-reply table have separate locks.
//! - A synchronous publish must not be sent from a handler running on the
//!   executor of the same direction; it would wait behind itself until timeout.
//! - `shutdown` must be called once before handlers' captured state is torn
//!   down. It drains both executors, so a synchronous publish already in
//!   flight still receives its reply. Any other publish action sent after
//!   shutdown starts returns `INVALID`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use super::message::{Direction, Message, MessageType};
use super::pending::{PendingReplies, ReplyPromise};
use super::publish::PublishMessage;
use super::subscription::{MessageHandler, SubscriberMap, WILDCARD, dispatch_keys, subscription_key};
use crate::config::BrokerSettings;
use crate::executor::{Executor, panic_reason};
use crate::utils::{BrokerError, Result};

pub struct MessageBroker {
    subscribers: SubscriberMap,
    pending_replies: PendingReplies,
    incoming: Executor,
    outgoing: Executor,
    timeout_ms: AtomicU64,
    is_shutdown: AtomicBool,
    this: Weak<MessageBroker>,
}

impl MessageBroker {
    /// Default time a synchronous publish waits for its reply.
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

    pub fn create() -> Result<Arc<Self>> {
        Self::with_settings(&BrokerSettings::default())
    }

    pub fn with_settings(settings: &BrokerSettings) -> Result<Arc<Self>> {
        let incoming = Executor::new(format!("{}-incoming", settings.executor_name_prefix))?;
        let outgoing = Executor::new(format!("{}-outgoing", settings.executor_name_prefix))?;

        Ok(Arc::new_cyclic(|this| Self {
            subscribers: SubscriberMap::new(),
            pending_replies: PendingReplies::new(),
            incoming,
            outgoing,
            timeout_ms: AtomicU64::new(settings.message_timeout_ms),
            is_shutdown: AtomicBool::new(false),
            this: this.clone(),
        }))
    }

    /// Wait for both directions to drain, then stop their executors.
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            warn!("message broker already shut down");
            return;
        }

        self.outgoing.wait_for_submitted_tasks();
        self.incoming.wait_for_submitted_tasks();

        self.outgoing.shutdown();
        self.incoming.shutdown();
        debug!("message broker shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Timeout applied to publish actions created from now on.
    pub fn set_message_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms.store(millis, Ordering::Relaxed);
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Subscribe to every action of `topic`.
    pub fn subscribe_topic<F>(&self, topic: &str, handler: F, direction: Direction)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.subscribe(topic, WILDCARD, handler, direction);
    }

    /// Register `handler` for messages matching `direction`, `topic` and
    /// `action`. An empty topic or action matches like `*`.
    pub fn subscribe<F>(&self, topic: &str, action: &str, handler: F, direction: Direction)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        debug!(%direction, topic, action, "subscribe");
        let handler: MessageHandler = Arc::new(handler);
        self.subscribers
            .subscribe(subscription_key(direction, topic, action), handler);
    }

    /// Create a publish action for `payload`. Nothing is sent until
    /// [`PublishMessage::send`] is called.
    pub fn publish(&self, payload: impl Into<String>, direction: Direction) -> PublishMessage {
        PublishMessage::new(
            Message::new(payload, direction),
            self.message_timeout(),
            self.this.clone(),
        )
    }

    /// Number of synchronous publishes currently waiting for a reply.
    pub fn pending_reply_count(&self) -> usize {
        self.pending_replies.len()
    }

    pub(crate) fn route(&self, pm: &PublishMessage, sync: bool) -> Result<Message> {
        let message = pm.message();

        if self.is_shutdown() {
            // a publisher blocked before shutdown began still gets its reply
            if message.message_type() == MessageType::Reply {
                if let Some(promise) = self.get_sync_message_promise(message.reply_to()) {
                    Self::fulfill(&promise, message);
                    return Ok(Message::INVALID);
                }
            }
            return Err(BrokerError::BrokerShutdown);
        }

        match message.message_type() {
            MessageType::Publish if sync => self.publish_sync(message, pm.timeout()),
            MessageType::Publish => {
                self.publish_async(message.clone())?;
                Ok(Message::INVALID)
            }
            MessageType::Reply => {
                self.reply(message);
                Ok(Message::INVALID)
            }
            MessageType::Unknown => Err(BrokerError::InvalidMessageType),
        }
    }

    // Async messages go through the executor too so that all messages of a
    // direction are sequenced in publish order, including behind a blocked
    // synchronous publish.
    fn publish_async(&self, message: Message) -> Result<()> {
        trace!(message = %message, payload = message.payload(), "publish async");
        let this = self.this.clone();

        self.executor(message.direction()).submit(move || match this.upgrade() {
            Some(broker) => {
                broker.notify_subscribers(&message);
            }
            None => error!(reason = %BrokerError::InvalidWeakPtrReference, "dropping async message"),
        })?;

        Ok(())
    }

    fn publish_sync(&self, message: &Message, timeout: Duration) -> Result<Message> {
        trace!(message = %message, payload = message.payload(), "publish sync");
        let this = self.this.clone();
        let request = message.clone();

        let task = self.executor(message.direction()).submit(move || -> Result<String> {
            let broker = this.upgrade().ok_or(BrokerError::InvalidWeakPtrReference)?;
            let (promise, reply) = mpsc::sync_channel(1);

            broker.add_sync_message_promise(request.id(), promise)?;
            let outcome = broker.await_reply(&request, &reply, timeout);
            broker.remove_sync_message_promise(request.id());

            outcome
        })?;

        let reply = task.wait()??;
        Ok(Message::new(reply, message.reply_direction()))
    }

    fn await_reply(&self, request: &Message, reply: &Receiver<String>, timeout: Duration) -> Result<String> {
        if self.notify_subscribers(request) == 0 {
            return Err(BrokerError::NoSubscribers);
        }

        match reply.recv_timeout(timeout) {
            Ok(payload) => Ok(payload),
            Err(RecvTimeoutError::Timeout) => Err(BrokerError::SyncMessageTimeout(request.to_string())),
            Err(RecvTimeoutError::Disconnected) => Err(BrokerError::InvalidMessageResponse),
        }
    }

    fn reply(&self, message: &Message) {
        trace!(message = %message, payload = message.payload(), "reply");

        match self.get_sync_message_promise(message.reply_to()) {
            Some(promise) => Self::fulfill(&promise, message),
            None => {
                trace!(message = %message, "publishing reply message because no promise is registered");
                if let Err(e) = self.publish_async(message.clone()) {
                    error!(reason = %e, message = %message, "reply broadcast failed");
                }
            }
        }
    }

    fn fulfill(promise: &ReplyPromise, message: &Message) {
        if promise.try_send(message.payload().to_string()).is_err() {
            error!(reply_to = message.reply_to(), "reply already fulfilled or abandoned");
        }
    }

    /// Deliver `message` to its exact, topic and global subscribers, in that
    /// order. Returns how many handlers were invoked.
    fn notify_subscribers(&self, message: &Message) -> usize {
        dispatch_keys(message)
            .iter()
            .map(|key| self.notify_key(key, message))
            .sum()
    }

    fn notify_key(&self, key: &str, message: &Message) -> usize {
        let handlers = self.subscribers.handlers(key);
        if !handlers.is_empty() {
            debug!(key, count = handlers.len(), id = message.id(), "notify subscribers");
        }

        for (index, handler) in handlers.iter().enumerate() {
            let delivered = message.clone();
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(delivered))) {
                error!(
                    key,
                    handler = index,
                    reason = panic_reason(panic.as_ref()),
                    "subscriber panicked"
                );
            }
        }

        handlers.len()
    }

    pub(crate) fn add_sync_message_promise(&self, message_id: &str, promise: ReplyPromise) -> Result<()> {
        self.pending_replies
            .add(message_id, promise)
            .inspect_err(|e| error!(reason = %e, "add sync message promise"))
    }

    pub(crate) fn remove_sync_message_promise(&self, message_id: &str) {
        if let Err(e) = self.pending_replies.remove(message_id) {
            error!(reason = %e, "remove sync message promise");
        }
    }

    pub(crate) fn get_sync_message_promise(&self, message_id: &str) -> Option<ReplyPromise> {
        match self.pending_replies.get(message_id) {
            Ok(promise) => Some(promise),
            Err(e) => {
                debug!(reason = %e, pending = ?self.pending_replies.ids(), "no sync message promise");
                None
            }
        }
    }

    fn executor(&self, direction: Direction) -> &Executor {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }
}
