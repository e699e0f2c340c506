pub mod engine;
pub mod message;
pub mod pending;
pub mod publish;
pub mod subscription;

pub use engine::MessageBroker;
pub use message::{Direction, Message, MessageType};
pub use publish::PublishMessage;

#[cfg(test)]
mod tests;
