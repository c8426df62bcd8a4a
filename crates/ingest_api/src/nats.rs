mod nats_message_publisher;

pub use nats_message_publisher::*;
