//! Sealing and publishing outbound envelopes

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::config::NodeConfig;
use crate::crypto::EnvelopeCodec;
use crate::error::{WnsError, WnsResult};
use crate::identity::{decode_public_key, PublicKey};
use crate::protocol::{Envelope, Response};
use crate::transport::Transport;

/// Seals payloads for a recipient and broadcasts them on the shared topic.
///
/// Every publish is bounded by `publish_timeout`; there is no retry.
#[derive(Clone)]
pub struct EnvelopePublisher {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn EnvelopeCodec>,
    topic: String,
    segment_len: usize,
    timeout: Duration,
}

impl EnvelopePublisher {
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn EnvelopeCodec>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            transport,
            codec,
            topic: config.pubsub_topic.clone(),
            segment_len: config.address_segment_len,
            timeout: config.publish_timeout,
        }
    }

    /// Send `response` to the holder of `reply_public_key_hex`.
    pub async fn publish(&self, response: &Response, reply_public_key_hex: &str) -> WnsResult<()> {
        let recipient = decode_public_key(reply_public_key_hex)?;
        let plaintext = response.encode()?;
        debug!(
            request_id = %response.request_id,
            status = %response.status_code,
            "Publishing response"
        );
        self.send_sealed(&plaintext, &recipient).await
    }

    /// Seal `plaintext` for `recipient`, tag it and broadcast it.
    pub async fn send_sealed(&self, plaintext: &[u8], recipient: &PublicKey) -> WnsResult<()> {
        let envelope = Envelope::seal(self.codec.as_ref(), plaintext, recipient, self.segment_len)?;
        let frame = Bytes::from(envelope.to_bytes()?);

        match tokio::time::timeout(self.timeout, self.transport.publish(&self.topic, frame)).await {
            Ok(Ok(())) => {
                debug!(address = %envelope.address, topic = %self.topic, "Envelope published");
                Ok(())
            }
            Ok(Err(e)) => Err(WnsError::Publish(e.to_string())),
            Err(_) => Err(WnsError::PublishTimeout(self.timeout)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl std::fmt::Debug for EnvelopePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopePublisher")
            .field("topic", &self.topic)
            .field("segment_len", &self.segment_len)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SealedBoxCodec;
    use crate::identity::{derive_address, Identity};
    use crate::transport::{MemoryNetwork, MemoryTransport};

    /// Transport whose publish never completes
    struct StuckTransport;

    #[async_trait::async_trait]
    impl Transport for StuckTransport {
        async fn start(&self) -> WnsResult<()> {
            Ok(())
        }
        async fn stop(&self) {}
        fn connected_peer_count(&self) -> usize {
            0
        }
        async fn publish(&self, _topic: &str, _payload: Bytes) -> WnsResult<()> {
            std::future::pending().await
        }
        fn take_inbound(&self) -> Option<tokio::sync::mpsc::Receiver<Envelope>> {
            None
        }
    }

    async fn pair(config: &NodeConfig) -> (EnvelopePublisher, Arc<MemoryTransport>, MemoryTransport) {
        let network = MemoryNetwork::new();
        let sender = Arc::new(network.transport(&config.pubsub_topic));
        let receiver = network.transport(&config.pubsub_topic);
        sender.start().await.unwrap();
        receiver.start().await.unwrap();
        let publisher = EnvelopePublisher::new(sender.clone(), Arc::new(SealedBoxCodec::new()), config);
        (publisher, sender, receiver)
    }

    #[tokio::test]
    async fn test_publish_reaches_reply_address() {
        let config = NodeConfig::default();
        let (publisher, sender, receiver) = pair(&config).await;
        let mut inbound = receiver.take_inbound().unwrap();
        let requester = Identity::generate().unwrap();

        let response = Response::ok("1234", "0xabc");
        publisher
            .publish(&response, &requester.public_key_hex())
            .await
            .unwrap();

        let envelope = inbound.recv().await.unwrap();
        assert!(envelope.is_tagged_for(&derive_address(requester.public_key())));
        let plaintext = envelope.open(&SealedBoxCodec::new(), &requester).unwrap();
        assert_eq!(Response::decode(&plaintext).unwrap(), response);
        assert_eq!(sender.published_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_key_publishes_nothing() {
        let config = NodeConfig::default();
        let (publisher, sender, _receiver) = pair(&config).await;

        let err = publisher
            .publish(&Response::ok("1", "x"), "not-hex")
            .await
            .unwrap_err();
        assert!(matches!(err, WnsError::MalformedKey(_)));
        assert_eq!(sender.published_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_publish_error() {
        let config = NodeConfig::default();
        let (publisher, sender, _receiver) = pair(&config).await;
        sender.set_fail_publishes(true);
        let requester = Identity::generate().unwrap();

        let err = publisher
            .publish(&Response::ok("1", "x"), &requester.public_key_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, WnsError::Publish(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_publish_times_out() {
        let config = NodeConfig::default();
        let publisher =
            EnvelopePublisher::new(Arc::new(StuckTransport), Arc::new(SealedBoxCodec::new()), &config);
        let requester = Identity::generate().unwrap();

        let err = publisher
            .publish(&Response::ok("1", "x"), &requester.public_key_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, WnsError::PublishTimeout(d) if d == Duration::from_secs(30)));
    }
}
