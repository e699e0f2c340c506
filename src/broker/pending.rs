//! Pending synchronous replies
//!
//! Maps the id of a message published synchronously to the sending half of
//! the channel its publisher is waiting on. At most one entry exists per id.
//! The table has its own lock, independent of the subscriber map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc::SyncSender;

use crate::utils::{BrokerError, Result};

/// Fulfils one synchronous publish with the reply envelope.
pub type ReplyPromise = SyncSender<String>;

#[derive(Debug, Default)]
pub struct PendingReplies {
    promises: Mutex<HashMap<String, ReplyPromise>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `promise` for `message_id`. An existing entry is left untouched.
    pub fn add(&self, message_id: &str, promise: ReplyPromise) -> Result<()> {
        let mut promises = self.lock();
        if promises.contains_key(message_id) {
            return Err(BrokerError::MessageIdAlreadyExists(message_id.to_string()));
        }
        promises.insert(message_id.to_string(), promise);
        Ok(())
    }

    pub fn remove(&self, message_id: &str) -> Result<()> {
        self.lock()
            .remove(message_id)
            .map(|_| ())
            .ok_or_else(|| BrokerError::MessageIdDoesNotExist(message_id.to_string()))
    }

    pub fn get(&self, message_id: &str) -> Result<ReplyPromise> {
        self.lock()
            .get(message_id)
            .cloned()
            .ok_or_else(|| BrokerError::MessageIdDoesNotExist(message_id.to_string()))
    }

    /// Ids that currently have a publisher waiting on them.
    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ReplyPromise>> {
        self.promises
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
