//! The `error` module defines the failure reasons raised inside the broker.
//!
//! Internal operations return [`Result`]; the public surface logs these and
//! converts them into `Message::INVALID` or a no-op, so none of them ever
//! escapes into collaborator code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker was dropped while a publish action or task was outstanding.
    #[error("invalidWeakPtrReference")]
    InvalidWeakPtrReference,

    /// A publish action was invoked on a message that is neither a publish nor a reply.
    #[error("invalidMessageType")]
    InvalidMessageType,

    /// No reply arrived before the caller's timeout.
    #[error("syncMessageTimeout: {0}")]
    SyncMessageTimeout(String),

    /// The reply wait finished without producing a value.
    #[error("invalidMessageResponse")]
    InvalidMessageResponse,

    #[error("messageIdAlreadyExists: {0}")]
    MessageIdAlreadyExists(String),

    #[error("messageIdDoesNotExist: {0}")]
    MessageIdDoesNotExist(String),

    /// A synchronous publish reached no handler, so nobody could reply.
    #[error("noSubscribers")]
    NoSubscribers,

    #[error("executorShutdown: {0}")]
    ExecutorShutdown(String),

    /// A task was dropped without producing a value, usually because it panicked.
    #[error("taskAborted: {0}")]
    TaskAborted(String),

    #[error("brokerShutdown")]
    BrokerShutdown,

    #[error("config: {0}")]
    Config(String),
}

impl From<config::ConfigError> for BrokerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
