use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which shape of message travels through the broker.
///
/// `Targets` re-serializes the stamped [`crate::domain::Target`]; `Points`
/// forwards the vendor's request body byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    #[default]
    Targets,
    Points,
}

impl PipelineVariant {
    pub fn stream_name(&self) -> &'static str {
        match self {
            PipelineVariant::Targets => "TARGETS",
            PipelineVariant::Points => "POINTS",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            PipelineVariant::Targets => "msg.targets",
            PipelineVariant::Points => "msg.points",
        }
    }

    pub fn consumer_name(&self) -> &'static str {
        self.stream_name()
    }

    pub fn collection(&self) -> &'static str {
        match self {
            PipelineVariant::Targets => "targets",
            PipelineVariant::Points => "points",
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for PipelineVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "targets" => Ok(PipelineVariant::Targets),
            "points" => Ok(PipelineVariant::Points),
            other => Err(format!(
                "unknown pipeline variant '{other}', expected 'targets' or 'points'"
            )),
        }
    }
}

/// Decision taken for one delivered message.
///
/// The transport adapter owns the mapping to broker signals: `Commit` and
/// `DropPermanently` acknowledge, `RetryLater` negatively acknowledges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Document is in the store (possibly from an earlier delivery).
    Commit {
        document_id: String,
        duplicate: bool,
    },
    /// Transient failure, ask the broker to redeliver.
    RetryLater(String),
    /// Payload can never be stored, remove it from the pending set.
    DropPermanently(String),
}

impl CommitOutcome {
    pub fn should_ack(&self) -> bool {
        !matches!(self, CommitOutcome::RetryLater(_))
    }
}
