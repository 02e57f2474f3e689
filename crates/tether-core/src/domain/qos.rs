//! QoS profile passed through to the transport at registration time.
//!
//! The core only validates and forwards these values; what they mean on the
//! wire is up to the transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    BestEffort,
    #[default]
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum History {
    /// Keep every request until it is delivered.
    #[default]
    KeepAll,
    /// Keep at most `depth` undelivered requests.
    KeepLast { depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidQos {
    #[error("history depth must be at least 1 for keep_last")]
    ZeroDepth,
}

/// Defaults to reliable / keep-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QosProfile {
    pub reliability: Reliability,
    pub history: History,
}

impl QosProfile {
    pub fn reliable() -> Self {
        Self::default()
    }

    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepAll,
        }
    }

    pub fn keep_last(mut self, depth: usize) -> Self {
        self.history = History::KeepLast { depth };
        self
    }

    pub fn validate(&self) -> Result<(), InvalidQos> {
        match self.history {
            History::KeepLast { depth: 0 } => Err(InvalidQos::ZeroDepth),
            _ => Ok(()),
        }
    }

    /// `None` means unbounded.
    pub fn history_depth(&self) -> Option<usize> {
        match self.history {
            History::KeepAll => None,
            History::KeepLast { depth } => Some(depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_reliable_and_unbounded() {
        let qos = QosProfile::default();
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.history_depth(), None);
        assert!(qos.validate().is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let qos = QosProfile::reliable().keep_last(0);
        assert_eq!(qos.validate(), Err(InvalidQos::ZeroDepth));
    }

    #[test]
    fn deserializes_partial_config() {
        let qos: QosProfile = serde_json::from_str(r#"{"reliability":"best_effort"}"#).unwrap();
        assert_eq!(qos.reliability, Reliability::BestEffort);
        assert_eq!(qos.history, History::KeepAll);

        let qos: QosProfile =
            serde_json::from_str(r#"{"history":{"kind":"keep_last","depth":10}}"#).unwrap();
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.history_depth(), Some(10));
    }
}
