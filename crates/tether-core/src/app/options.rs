//! ServiceOptions - create_service に渡す設定
//!
//! JSON から読み込めます（未指定のフィールドはデフォルト）。
//!
//! ```json
//! {
//!   "qos": { "reliability": "reliable", "history": { "kind": "keep_last", "depth": 10 } },
//!   "on_handler_error": "drop"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::QosProfile;

/// What an endpoint does with a request whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerErrorPolicy {
    /// Send an error response carrying the request id. Falls back to `Drop`
    /// when the transport has no error responses.
    #[default]
    SendError,
    /// Log, count and abandon the request id.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    pub qos: QosProfile,
    pub on_handler_error: HandlerErrorPolicy,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_qos(mut self, qos: QosProfile) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_error_policy(mut self, policy: HandlerErrorPolicy) -> Self {
        self.on_handler_error = policy;
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Reliability;

    #[test]
    fn empty_json_gives_defaults() {
        let opts = ServiceOptions::from_json_str("{}").unwrap();
        assert_eq!(opts, ServiceOptions::default());
        assert_eq!(opts.on_handler_error, HandlerErrorPolicy::SendError);
        assert_eq!(opts.qos.reliability, Reliability::Reliable);
    }

    #[test]
    fn full_json() {
        let opts = ServiceOptions::from_json_str(
            r#"{
                "qos": { "reliability": "best_effort", "history": { "kind": "keep_last", "depth": 5 } },
                "on_handler_error": "drop"
            }"#,
        )
        .unwrap();
        assert_eq!(opts.on_handler_error, HandlerErrorPolicy::Drop);
        assert_eq!(opts.qos.reliability, Reliability::BestEffort);
        assert_eq!(opts.qos.history_depth(), Some(5));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(ServiceOptions::from_json_str(r#"{"on_handler_error":"retry"}"#).is_err());
    }
}
