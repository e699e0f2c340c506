//! Subscription management
//!
//! Handlers are stored under a derived key `"{direction}:{topic}:{action}"`
//! where an empty topic or action is stored as `*`. Every message is matched
//! against three keys, most specific first: `dir:topic:action`,
//! `dir:topic:*` and `dir:*:*`.
//!
//! Concurrency note: the map has its own lock, held only while a handler is
//! appended or while a dispatch copies the handler list for one key. Handlers
//! are invoked with no lock held, so a handler may subscribe from inside a
//! callback. A handler registered while a dispatch is already running may or
//! may not see that particular message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::message::{Direction, Message};

pub const WILDCARD: &str = "*";

/// Callback invoked with every message matching a subscription.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Computes the subscription key for a direction, topic and action.
pub fn subscription_key(direction: Direction, topic: &str, action: &str) -> String {
    format!("{}:{}:{}", direction, or_wildcard(topic), or_wildcard(action))
}

/// The three keys a message is delivered under, in precedence order.
pub fn dispatch_keys(message: &Message) -> [String; 3] {
    let direction = message.direction();
    [
        subscription_key(direction, message.topic(), message.action()),
        subscription_key(direction, message.topic(), WILDCARD),
        subscription_key(direction, WILDCARD, WILDCARD),
    ]
}

fn or_wildcard(value: &str) -> &str {
    if value.is_empty() { WILDCARD } else { value }
}

#[derive(Default)]
pub struct SubscriberMap {
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
}

impl SubscriberMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler under `key`, creating the list if needed.
    pub fn subscribe(&self, key: String, handler: MessageHandler) {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.entry(key).or_default().push(handler);
    }

    /// Copy of the handlers registered under `key`, in registration order.
    pub fn handlers(&self, key: &str) -> Vec<MessageHandler> {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.get(key).cloned().unwrap_or_default()
    }

    pub fn handler_count(&self, key: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map_or(0, Vec::len)
    }
}
