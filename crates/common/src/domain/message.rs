use crate::domain::result::DomainResult;
use async_trait::async_trait;
use bytes::Bytes;

/// One message ready for the broker.
///
/// Every envelope mints a fresh `msg_id`, so each publish attempt carries its
/// own id in the `Nats-Msg-Id` header. The stream only drops a repeat of the
/// same id inside its duplicate window. Redeliveries of a stored message are
/// collapsed by the document store, which keeps one row per `msg_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub subject: String,
    pub msg_id: String,
    pub payload: Bytes,
}

impl MessageEnvelope {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            msg_id: xid::new().to_string(),
            payload: payload.into(),
        }
    }

    pub fn with_msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = msg_id.into();
        self
    }
}

/// Broker acknowledgement for a persisted publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
    pub duplicate: bool,
    pub msg_id: String,
}

/// Publishes envelopes and waits until the broker has persisted them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope) -> DomainResult<PublishAck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_envelope_gets_its_own_id() {
        let a = MessageEnvelope::new("msg.targets", Bytes::from_static(b"{}"));
        let b = MessageEnvelope::new("msg.targets", Bytes::from_static(b"{}"));

        assert_eq!(a.msg_id.len(), 20);
        assert_ne!(a.msg_id, b.msg_id);
    }

    #[test]
    fn test_with_msg_id_overrides() {
        let envelope = MessageEnvelope::new("msg.points", Bytes::new()).with_msg_id("fixed");
        assert_eq!(envelope.msg_id, "fixed");
        assert_eq!(envelope.subject, "msg.points");
    }
}
