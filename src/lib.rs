//! # AASB Broker
//!
//! `aasb_broker` is the in-process message broker that connects the engine
//! core to the platform and application layer. Collaborators exchange
//! serialized JSON envelopes through it: they subscribe by direction, topic and
//! action, publish asynchronously, or publish synchronously and block until a
//! correlated reply arrives.
//!
//! ## Core Modules
//!
//! - `broker`: subscriber registration, ordered dispatch and reply correlation.
//! - `executor`: the ordered single-thread task queue used per message direction.
//! - `config`: loads broker and logging settings from file and environment.
//! - `utils`: the shared error type and tracing initialisation.
//!
//! ## Example
//!
//! ```no_run
//! use aasb_broker::{Direction, MessageBroker};
//!
//! let broker = MessageBroker::create().expect("spawn executors");
//! broker.subscribe("Lights", "TurnOn", |msg| println!("{msg}"), Direction::Incoming);
//!
//! let payload = r#"{"header":{"messageType":"Publish","messageDescription":{"topic":"Lights","action":"TurnOn"}}}"#;
//! broker.publish(payload, Direction::Incoming).send(false);
//!
//! broker.shutdown();
//! ```

pub mod broker;
pub mod config;
pub mod executor;
pub mod utils;

pub use broker::{Direction, Message, MessageBroker, MessageType, PublishMessage};
pub use utils::{BrokerError, Result};
