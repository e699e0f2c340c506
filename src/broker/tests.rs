use super::message::{Direction, Message, MessageType};
use super::pending::PendingReplies;
use super::subscription::{SubscriberMap, dispatch_keys, subscription_key};
use super::MessageBroker;
use crate::utils::BrokerError;
use serde_json::json;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn publish_envelope(id: &str, topic: &str, action: &str) -> String {
    json!({
        "header": {
            "version": "4.0",
            "messageType": "Publish",
            "id": id,
            "messageDescription": { "topic": topic, "action": action }
        },
        "payload": { "value": 1 }
    })
    .to_string()
}

fn reply_envelope(id: &str, reply_to: &str, topic: &str, action: &str) -> String {
    json!({
        "header": {
            "version": "4.0",
            "messageType": "Reply",
            "id": id,
            "messageDescription": { "topic": topic, "action": action, "replyToId": reply_to }
        },
        "payload": { "ok": true }
    })
    .to_string()
}

#[test]
fn test_message_reads_header_metadata() {
    let message = Message::new(reply_envelope("r-1", "p-1", "Phone", "Dial"), Direction::Outgoing);

    assert!(message.is_valid());
    assert_eq!(message.id(), "r-1");
    assert_eq!(message.reply_to(), "p-1");
    assert_eq!(message.topic(), "Phone");
    assert_eq!(message.action(), "Dial");
    assert_eq!(message.message_type(), MessageType::Reply);
    assert_eq!(message.direction(), Direction::Outgoing);
    assert_eq!(message.reply_direction(), Direction::Incoming);
    assert!(message.payload().contains("\"ok\":true"));
    assert!(message.timestamp() > 0);
}

#[test]
fn test_message_defaults_for_missing_fields() {
    let message = Message::new(r#"{"header":{}}"#, Direction::Incoming);

    assert_eq!(message.message_type(), MessageType::Publish);
    assert_eq!(message.topic(), "");
    assert_eq!(message.action(), "");
    assert_eq!(message.reply_to(), "");
    assert!(uuid::Uuid::parse_str(message.id()).is_ok());

    let other = Message::new(r#"{"header":{}}"#, Direction::Incoming);
    assert_ne!(message.id(), other.id());
}

#[test]
fn test_message_unknown_types() {
    let unknown = Message::new(
        r#"{"header":{"messageType":"Broadcast","id":"x"}}"#,
        Direction::Incoming,
    );
    assert_eq!(unknown.message_type(), MessageType::Unknown);

    let garbage = Message::new("not json", Direction::Incoming);
    assert!(garbage.is_valid());
    assert_eq!(garbage.message_type(), MessageType::Unknown);
    assert_eq!(garbage.payload(), "not json");
}

#[test]
fn test_invalid_message() {
    let invalid = Message::invalid();
    assert!(!invalid.is_valid());
    assert_eq!(invalid, Message::INVALID);
    assert_eq!(invalid, Message::default());
    assert_eq!(invalid.id(), "");
    assert_eq!(invalid.payload(), "");
    assert_eq!(invalid.to_string(), "INVALID");
}

#[test]
fn test_subscription_key_wildcards() {
    assert_eq!(
        subscription_key(Direction::Incoming, "Lights", "TurnOn"),
        "INCOMING:Lights:TurnOn"
    );
    assert_eq!(
        subscription_key(Direction::Outgoing, "Lights", ""),
        subscription_key(Direction::Outgoing, "Lights", "*")
    );
    assert_eq!(
        subscription_key(Direction::Outgoing, "", ""),
        "OUTGOING:*:*"
    );
}

#[test]
fn test_dispatch_keys_precedence() {
    let message = Message::new(publish_envelope("m-1", "Lights", "TurnOn"), Direction::Incoming);
    assert_eq!(
        dispatch_keys(&message),
        [
            "INCOMING:Lights:TurnOn".to_string(),
            "INCOMING:Lights:*".to_string(),
            "INCOMING:*:*".to_string(),
        ]
    );
}

#[test]
fn test_subscriber_map_keeps_registration_order() {
    let map = SubscriberMap::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let seen = seen.clone();
        map.subscribe("INCOMING:a:*".to_string(), Arc::new(move |_: Message| seen.lock().unwrap().push(i)));
    }
    assert_eq!(map.handler_count("INCOMING:a:*"), 3);
    assert_eq!(map.handler_count("INCOMING:b:*"), 0);

    for handler in map.handlers("INCOMING:a:*") {
        handler(Message::INVALID);
    }
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_pending_replies_reject_duplicates() {
    let pending = PendingReplies::new();
    let (first_tx, first_rx) = mpsc::sync_channel(1);
    let (second_tx, second_rx) = mpsc::sync_channel(1);

    pending.add("m-1", first_tx).unwrap();
    assert_eq!(
        pending.add("m-1", second_tx),
        Err(BrokerError::MessageIdAlreadyExists("m-1".to_string()))
    );
    assert_eq!(pending.len(), 1);

    pending.get("m-1").unwrap().send("reply".to_string()).unwrap();
    assert_eq!(first_rx.try_recv().unwrap(), "reply");
    assert!(second_rx.try_recv().is_err());
}

#[test]
fn test_pending_replies_missing_ids() {
    let pending = PendingReplies::new();
    assert_eq!(
        pending.remove("nope"),
        Err(BrokerError::MessageIdDoesNotExist("nope".to_string()))
    );
    assert!(pending.get("nope").is_err());

    let (tx, _rx) = mpsc::sync_channel(1);
    pending.add("m-2", tx).unwrap();
    assert_eq!(pending.ids(), vec!["m-2".to_string()]);
    pending.remove("m-2").unwrap();
    assert!(pending.is_empty());
}

#[test]
fn test_broker_duplicate_promise_keeps_first_entry() {
    let broker = MessageBroker::create().unwrap();
    let (first_tx, first_rx) = mpsc::sync_channel(1);
    let (second_tx, _second_rx) = mpsc::sync_channel(1);

    broker.add_sync_message_promise("dup", first_tx).unwrap();
    assert!(broker.add_sync_message_promise("dup", second_tx).is_err());
    assert_eq!(broker.pending_reply_count(), 1);

    let promise = broker.get_sync_message_promise("dup").unwrap();
    promise.send("first".to_string()).unwrap();
    assert_eq!(first_rx.recv().unwrap(), "first");

    broker.remove_sync_message_promise("dup");
    assert!(broker.get_sync_message_promise("dup").is_none());
    // removing twice is logged, not fatal
    broker.remove_sync_message_promise("dup");
    broker.shutdown();
}

#[test]
fn test_panicking_handler_does_not_block_others() {
    let broker = MessageBroker::create().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let first = seen.clone();
    broker.subscribe("Lights", "TurnOn", move |_| first.lock().unwrap().push("exact"), Direction::Incoming);
    broker.subscribe("Lights", "TurnOn", |_| panic!("handler failure"), Direction::Incoming);
    let after = seen.clone();
    broker.subscribe("Lights", "TurnOn", move |_| after.lock().unwrap().push("exact-after"), Direction::Incoming);
    let global = seen.clone();
    broker.subscribe("", "", move |_| global.lock().unwrap().push("global"), Direction::Incoming);

    broker
        .publish(publish_envelope("m-1", "Lights", "TurnOn"), Direction::Incoming)
        .send(false);
    broker.shutdown();

    assert_eq!(*seen.lock().unwrap(), vec!["exact", "exact-after", "global"]);
}

#[test]
fn test_handler_can_subscribe_during_dispatch() {
    let broker = MessageBroker::create().unwrap();
    let (tx, rx) = mpsc::channel();

    let inner = Arc::downgrade(&broker);
    broker.subscribe_topic(
        "Setup",
        move |_| {
            if let Some(broker) = inner.upgrade() {
                let tx = tx.clone();
                broker.subscribe_topic("Late", move |m| tx.send(m.id().to_string()).unwrap(), Direction::Incoming);
            }
        },
        Direction::Incoming,
    );

    broker.publish(publish_envelope("s-1", "Setup", "Go"), Direction::Incoming).send(false);
    broker.publish(publish_envelope("l-1", "Late", "Go"), Direction::Incoming).send(false);

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "l-1");
    broker.shutdown();
}

#[test]
fn test_unknown_message_type_is_rejected() {
    let broker = MessageBroker::create().unwrap();
    let (tx, rx) = mpsc::channel();
    broker.subscribe("", "", move |m| tx.send(m).unwrap(), Direction::Incoming);

    let pm = broker.publish(
        r#"{"header":{"messageType":"Broadcast","id":"bad"}}"#,
        Direction::Incoming,
    );
    assert_eq!(pm.send(false), Message::INVALID);
    assert_eq!(pm.send(true), Message::INVALID);

    broker.shutdown();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_sync_publish_without_subscribers_fails_fast() {
    let broker = MessageBroker::create().unwrap();

    let started = Instant::now();
    let reply = broker
        .publish(publish_envelope("lonely", "Nobody", "Listens"), Direction::Outgoing)
        .with_timeout(Duration::from_secs(5))
        .send(true);

    assert!(!reply.is_valid());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(broker.pending_reply_count(), 0);
    broker.shutdown();
}

#[test]
fn test_message_timeout_applies_to_new_actions() {
    let broker = MessageBroker::create().unwrap();
    assert_eq!(broker.message_timeout(), Duration::from_millis(MessageBroker::DEFAULT_TIMEOUT_MS));

    let before = broker.publish(publish_envelope("a", "T", "A"), Direction::Incoming);
    broker.set_message_timeout(Duration::from_millis(20));
    let after = broker.publish(publish_envelope("b", "T", "A"), Direction::Incoming);

    assert_eq!(before.timeout(), Duration::from_millis(1000));
    assert_eq!(after.timeout(), Duration::from_millis(20));
    assert_eq!(after.with_timeout(Duration::from_millis(5)).timeout(), Duration::from_millis(5));
    broker.shutdown();
}

#[test]
fn test_second_shutdown_is_noop() {
    let broker = MessageBroker::create().unwrap();
    broker.shutdown();
    broker.shutdown();
    assert!(broker.is_shutdown());
}
