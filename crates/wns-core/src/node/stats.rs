//! Dispatch outcome counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// What happened to a single inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// Tagged for another address; never decrypted
    NotForUs,
    UnsupportedVersion,
    /// Tag matched but decryption failed
    DecryptFailed,
    MalformedRequest,
    /// No handler for the service (a 404 may have been sent)
    UnknownService,
    /// Handler returned an error (a 500 may have been sent)
    HandlerFailed,
    /// Handler response published to the requester
    Replied,
    PublishFailed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::NotForUs => "not_for_us",
            DispatchOutcome::UnsupportedVersion => "unsupported_version",
            DispatchOutcome::DecryptFailed => "decrypt_failed",
            DispatchOutcome::MalformedRequest => "malformed_request",
            DispatchOutcome::UnknownService => "unknown_service",
            DispatchOutcome::HandlerFailed => "handler_failed",
            DispatchOutcome::Replied => "replied",
            DispatchOutcome::PublishFailed => "publish_failed",
        }
    }
}

impl std::fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of dispatch counters, one per outcome class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub not_for_us: u64,
    pub unsupported_version: u64,
    pub decrypt_failed: u64,
    pub malformed_request: u64,
    pub unknown_service: u64,
    pub handler_failed: u64,
    pub replied: u64,
    pub publish_failed: u64,
}

impl DispatchStats {
    /// Envelopes accounted for
    pub fn total(&self) -> u64 {
        self.not_for_us
            + self.unsupported_version
            + self.decrypt_failed
            + self.malformed_request
            + self.unknown_service
            + self.handler_failed
            + self.replied
            + self.publish_failed
    }

    /// Requests that reached service lookup
    pub fn requests(&self) -> u64 {
        self.unknown_service + self.handler_failed + self.replied + self.publish_failed
    }
}

/// Live counters shared between the consumer and pooled workers.
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    counts: [AtomicU64; 8],
}

impl DispatchCounters {
    fn slot(outcome: DispatchOutcome) -> usize {
        match outcome {
            DispatchOutcome::NotForUs => 0,
            DispatchOutcome::UnsupportedVersion => 1,
            DispatchOutcome::DecryptFailed => 2,
            DispatchOutcome::MalformedRequest => 3,
            DispatchOutcome::UnknownService => 4,
            DispatchOutcome::HandlerFailed => 5,
            DispatchOutcome::Replied => 6,
            DispatchOutcome::PublishFailed => 7,
        }
    }

    pub(crate) fn record(&self, outcome: DispatchOutcome) {
        self.counts[Self::slot(outcome)].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        let get = |outcome| self.counts[Self::slot(outcome)].load(Ordering::Relaxed);
        DispatchStats {
            not_for_us: get(DispatchOutcome::NotForUs),
            unsupported_version: get(DispatchOutcome::UnsupportedVersion),
            decrypt_failed: get(DispatchOutcome::DecryptFailed),
            malformed_request: get(DispatchOutcome::MalformedRequest),
            unknown_service: get(DispatchOutcome::UnknownService),
            handler_failed: get(DispatchOutcome::HandlerFailed),
            replied: get(DispatchOutcome::Replied),
            publish_failed: get(DispatchOutcome::PublishFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = DispatchCounters::default();
        counters.record(DispatchOutcome::NotForUs);
        counters.record(DispatchOutcome::NotForUs);
        counters.record(DispatchOutcome::Replied);
        counters.record(DispatchOutcome::UnknownService);

        let stats = counters.snapshot();
        assert_eq!(stats.not_for_us, 2);
        assert_eq!(stats.replied, 1);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.requests(), 2);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(DispatchOutcome::PublishFailed.to_string(), "publish_failed");
    }
}
