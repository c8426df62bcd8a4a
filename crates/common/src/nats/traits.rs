use crate::domain::PublishAck;
use anyhow::Result;
use async_nats::{jetstream, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;

/// Trait for JetStream consumer operations
/// Abstracts creating (or binding to) a durable pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create a durable pull consumer on a stream, binding to it if it already exists
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Trait for pull consumer operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch up to max_messages, waiting at most `expires` for the batch to fill
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<Box<dyn DeliveredMessage>>>;
}

/// A message handed out by the broker that still owes exactly one ack or nak
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveredMessage: Send + Sync {
    fn subject(&self) -> String;

    fn payload(&self) -> Bytes;

    fn headers(&self) -> Option<HeaderMap>;

    /// Remove the message from the consumer's pending set
    async fn ack(&self) -> Result<()>;

    /// Ask the broker to redeliver the message
    async fn nak(&self) -> Result<()>;
}

/// Trait for JetStream publisher operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish a message and wait until the stream has persisted it
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<PublishAck>;
}
