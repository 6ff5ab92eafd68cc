//! Node and requester configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WnsError, WnsResult};
use crate::identity::DEFAULT_SEGMENT_LEN;

/// Default relay cluster
pub const DEFAULT_CLUSTER_ID: u16 = 16;
/// Default relay shard
pub const DEFAULT_SHARD: u16 = 64;

/// Bound on how long the transport may take to accept a publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);
/// The readiness gate passes once strictly more peers than this are connected
pub const DEFAULT_MIN_PEERS: usize = 2;
/// Total wall-clock budget for the readiness gate
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a requester waits for a response
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(30);
/// Capacity of the requester's pending-request table
pub const DEFAULT_MAX_PENDING: usize = 1024;
/// Upper bound for every configured timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Name of the shared broadcast channel for a cluster/shard pair.
///
/// Uses the relay naming of existing WNS deployments so configs carry over;
/// the name is only hashed into a gossip topic id.
pub fn relay_topic(cluster_id: u16, shard: u16) -> String {
    format!("/waku/2/rs/{}/{}", cluster_id, shard)
}

/// Durations as (fractional) seconds in config files
mod duration_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}

/// Settings shared by service nodes and requesters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Shared broadcast channel all participants subscribe to
    pub pubsub_topic: String,
    /// Hex characters of the public key kept in the address tag
    pub address_segment_len: usize,
    #[serde(with = "duration_secs")]
    pub publish_timeout: Duration,
    pub min_peers: usize,
    #[serde(with = "duration_secs")]
    pub readiness_timeout: Duration,
    /// 1 = fully sequential dispatch; more = bounded worker pool
    pub workers: usize,
    /// Send explicit error responses instead of silently dropping
    pub reply_on_error: bool,
    #[serde(with = "duration_secs")]
    pub request_ttl: Duration,
    pub max_pending: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            pubsub_topic: relay_topic(DEFAULT_CLUSTER_ID, DEFAULT_SHARD),
            address_segment_len: DEFAULT_SEGMENT_LEN,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            min_peers: DEFAULT_MIN_PEERS,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            workers: 1,
            reply_on_error: false,
            request_ttl: DEFAULT_REQUEST_TTL,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl NodeConfig {
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.pubsub_topic = topic.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_reply_on_error(mut self, enabled: bool) -> Self {
        self.reply_on_error = enabled;
        self
    }

    pub fn with_min_peers(mut self, min_peers: usize) -> Self {
        self.min_peers = min_peers;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }

    /// Reject values the protocol cannot run with.
    pub fn validate(&self) -> WnsResult<()> {
        if self.pubsub_topic.is_empty() {
            return Err(WnsError::InvalidConfig("pubsub_topic is empty".to_string()));
        }
        if self.address_segment_len == 0 {
            return Err(WnsError::InvalidConfig(
                "address_segment_len must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(WnsError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.max_pending == 0 {
            return Err(WnsError::InvalidConfig(
                "max_pending must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("publish_timeout", self.publish_timeout),
            ("readiness_timeout", self.readiness_timeout),
            ("request_ttl", self.request_ttl),
        ] {
            if value.is_zero() {
                return Err(WnsError::InvalidConfig(format!("{} must be non-zero", name)));
            }
            if value > MAX_TIMEOUT {
                return Err(WnsError::InvalidConfig(format!(
                    "{} must not exceed {}s",
                    name,
                    MAX_TIMEOUT.as_secs()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pubsub_topic, "/waku/2/rs/16/64");
        assert_eq!(config.address_segment_len, 16);
        assert_eq!(config.publish_timeout, Duration::from_secs(30));
        assert_eq!(config.workers, 1);
        assert!(!config.reply_on_error);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = NodeConfig::default();
        config.address_segment_len = 0;
        assert!(matches!(config.validate(), Err(WnsError::InvalidConfig(_))));

        let config = NodeConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(WnsError::InvalidConfig(_))));

        let config = NodeConfig::default().with_publish_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(WnsError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_timeouts() {
        let huge = Duration::from_secs(u64::MAX);
        for config in [
            NodeConfig::default().with_readiness_timeout(huge),
            NodeConfig::default().with_request_ttl(huge),
            NodeConfig::default().with_publish_timeout(MAX_TIMEOUT + Duration::from_secs(1)),
        ] {
            assert!(matches!(config.validate(), Err(WnsError::InvalidConfig(_))));
        }
        NodeConfig::default()
            .with_request_ttl(MAX_TIMEOUT)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_durations_are_plain_seconds_in_json() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"request_ttl": 5, "publish_timeout": 0.25}"#).unwrap();
        assert_eq!(config.request_ttl, Duration::from_secs(5));
        assert_eq!(config.publish_timeout, Duration::from_millis(250));

        let json = serde_json::to_value(NodeConfig::default()).unwrap();
        assert_eq!(json["readiness_timeout"], 30);

        assert!(serde_json::from_str::<NodeConfig>(r#"{"request_ttl": -1}"#).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NodeConfig = serde_json::from_str(r#"{"workers":4}"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.min_peers, DEFAULT_MIN_PEERS);
    }
}
