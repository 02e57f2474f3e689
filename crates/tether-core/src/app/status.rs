//! Status - エンドポイントごとのカウンタ
//!
//! handler 失敗による drop もここで数えるので、黙って消えるリクエストはありません。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of an endpoint's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCounts {
    /// Requests admitted to dispatch.
    pub handled: u64,
    pub responded: u64,
    pub error_responses: u64,
    /// Requests abandoned after a handler failure.
    pub dropped: u64,
    pub send_failures: u64,
    /// Handler results thrown away because `send_response` answered the id first.
    pub discarded: u64,
    /// Deliveries refused before dispatch (not serving, duplicate id).
    pub rejected: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EndpointStats {
    handled: AtomicU64,
    responded: AtomicU64,
    error_responses: AtomicU64,
    dropped: AtomicU64,
    send_failures: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
}

impl EndpointStats {
    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_responded(&self) {
        self.responded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error_response(&self) {
        self.error_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EndpointCounts {
        EndpointCounts {
            handled: self.handled.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_records() {
        let stats = EndpointStats::default();
        stats.record_handled();
        stats.record_handled();
        stats.record_responded();
        stats.record_dropped();
        stats.record_discarded();

        let counts = stats.snapshot();
        assert_eq!(counts.handled, 2);
        assert_eq!(counts.responded, 1);
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.discarded, 1);
        assert_eq!(counts.error_responses, 0);
    }

    #[test]
    fn counts_serialize_as_flat_object() {
        let v = serde_json::to_value(EndpointCounts::default()).unwrap();
        assert_eq!(v["handled"], 0);
        assert_eq!(v["rejected"], 0);
    }
}
