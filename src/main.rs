//! Demo for the AASB broker
//!
//! Registers an echo responder on the outgoing direction, sends it one
//! synchronous and one asynchronous request and logs what comes back.

use std::time::Duration;

use aasb_broker::config::load_config;
use aasb_broker::utils::logging;
use aasb_broker::{BrokerError, Direction, MessageBroker};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

fn main() {
    let _ = dotenvy::dotenv();

    if let Err(e) = run() {
        error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), BrokerError> {
    let config = load_config()?;
    logging::init(&config.logging);

    let broker = MessageBroker::with_settings(&config.broker)?;
    info!(timeout = ?broker.message_timeout(), "message broker created");

    let responder = std::sync::Arc::downgrade(&broker);
    broker.subscribe(
        "Demo",
        "Echo",
        move |request| {
            let Some(broker) = responder.upgrade() else {
                return;
            };
            let reply = envelope("Reply", "Demo", "Echo", Some(request.id()), json!({ "echo": true }));
            broker.publish(reply, request.reply_direction()).send(false);
        },
        Direction::Outgoing,
    );
    broker.subscribe_topic(
        "Demo",
        |message| info!(message = %message, "observed on Demo topic"),
        Direction::Incoming,
    );

    let request = envelope("Publish", "Demo", "Echo", None, json!({ "text": "hello" }));
    let reply = broker
        .publish(request.clone(), Direction::Outgoing)
        .with_timeout(Duration::from_millis(500))
        .send_sync();
    if reply.is_valid() {
        info!(reply = %reply, payload = reply.payload(), "sync reply received");
    } else {
        error!("sync publish returned no reply");
    }

    broker.publish(request, Direction::Outgoing).send(false);

    broker.shutdown();
    info!("done");
    Ok(())
}

fn envelope(
    message_type: &str,
    topic: &str,
    action: &str,
    reply_to: Option<&str>,
    payload: serde_json::Value,
) -> String {
    let mut description = json!({ "topic": topic, "action": action });
    if let Some(reply_to) = reply_to {
        description["replyToId"] = json!(reply_to);
    }

    json!({
        "header": {
            "version": "4.0",
            "messageType": message_type,
            "id": Uuid::new_v4().to_string(),
            "messageDescription": description,
        },
        "payload": payload,
    })
    .to_string()
}
