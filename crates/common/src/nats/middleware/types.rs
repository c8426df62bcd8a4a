use crate::domain::{MessageEnvelope, PublishAck};
use async_nats::HeaderMap;
use bytes::Bytes;

/// Request to publish one message to NATS
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub subject: String,
    /// Deduplication id, sent as the `Nats-Msg-Id` header
    pub msg_id: String,
    pub payload: Bytes,
    /// Trace context is injected here by the tracing layer
    pub headers: HeaderMap,
}

impl PublishRequest {
    pub fn new(
        subject: impl Into<String>,
        msg_id: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            subject: subject.into(),
            msg_id: msg_id.into(),
            payload: payload.into(),
            headers: HeaderMap::new(),
        }
    }
}

impl From<MessageEnvelope> for PublishRequest {
    fn from(envelope: MessageEnvelope) -> Self {
        Self::new(envelope.subject, envelope.msg_id, envelope.payload)
    }
}

/// Response from a publish operation
#[derive(Debug, Clone)]
pub struct PublishResponse {
    pub subject: String,
    pub ack: PublishAck,
}
