//! Deferred publish actions
//!
//! `MessageBroker::publish` does not send anything. It returns a
//! `PublishMessage` bound to the message and to a weak handle on the broker;
//! calling [`PublishMessage::send`] performs the publish. Because the handle is
//! weak, an action that outlives its broker fails with `INVALID` instead of
//! keeping the broker alive.

use std::sync::Weak;
use std::time::Duration;

use tracing::{error, warn};

use super::engine::MessageBroker;
use super::message::Message;
use crate::utils::BrokerError;

#[derive(Clone)]
pub struct PublishMessage {
    message: Message,
    timeout: Duration,
    broker: Weak<MessageBroker>,
}

impl PublishMessage {
    pub(crate) fn new(message: Message, timeout: Duration, broker: Weak<MessageBroker>) -> Self {
        Self {
            message,
            timeout,
            broker,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// How long a synchronous send waits for its reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish the message.
    ///
    /// - a reply is routed to its waiting publisher (or broadcast) and returns `INVALID`
    /// - an asynchronous publish is queued and returns `INVALID` at once
    /// - a synchronous publish blocks until the reply arrives or the timeout expires,
    ///   returning the reply or `INVALID`
    ///
    /// The action can be sent any number of times.
    pub fn send(&self, sync: bool) -> Message {
        let result = self
            .broker
            .upgrade()
            .ok_or(BrokerError::InvalidWeakPtrReference)
            .and_then(|broker| broker.route(self, sync));

        match result {
            Ok(reply) => reply,
            Err(BrokerError::BrokerShutdown) => {
                warn!(message = %self.message, "discarding message since broker is shut down");
                Message::INVALID
            }
            Err(e) => {
                error!(reason = %e, message = %self.message, "publish failed");
                Message::INVALID
            }
        }
    }

    pub fn send_sync(&self) -> Message {
        self.send(true)
    }
}
