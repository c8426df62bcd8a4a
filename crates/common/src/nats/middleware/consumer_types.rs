use crate::nats::headers::msg_id;
use async_nats::HeaderMap;
use bytes::Bytes;

/// One delivered NATS message, owned so it can travel through Tower layers.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Carries the trace context and the `Nats-Msg-Id`
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(subject: String, payload: Bytes, headers: Option<HeaderMap>) -> Self {
        Self {
            subject,
            payload,
            headers,
        }
    }

    /// The publisher-assigned deduplication id, if the message carries one.
    pub fn msg_id(&self) -> Option<String> {
        self.headers.as_ref().and_then(msg_id)
    }
}

/// Whether the message should be acknowledged or handed back for redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    Ack,
    Nak(Option<String>),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(Some(reason.into()))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn is_nak(&self) -> bool {
        matches!(self, Self::Nak(_))
    }
}
