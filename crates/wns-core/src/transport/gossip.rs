//! Broadcast transport over iroh-gossip
//!
//! One iroh endpoint, one gossip topic. The topic id is derived from the
//! configured pub/sub topic name, so every node configured with the same name
//! lands in the same swarm.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use iroh::discovery::static_provider::StaticProvider;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, EndpointId, SecretKey};
use iroh_gossip::api::{GossipReceiver, GossipSender};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use iroh_gossip::proto::TopicId;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{forward_frame, InboundSlot, Transport};
use crate::error::{WnsError, WnsResult};
use crate::protocol::Envelope;

/// Gossip's default is 4KB; sealed envelopes with large outputs exceed that
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const TOPIC_DOMAIN: &[u8] = b"wns-pubsub-topic-v1:";

/// Gossip topic id for a pub/sub topic name
pub fn pubsub_topic_id(topic: &str) -> TopicId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(TOPIC_DOMAIN);
    hasher.update(topic.as_bytes());
    TopicId::from_bytes(*hasher.finalize().as_bytes())
}

/// Parse a hex endpoint id as printed by `endpoint_id()`
pub fn parse_endpoint_id(s: &str) -> WnsResult<EndpointId> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| WnsError::MalformedKey(format!("Invalid endpoint id hex: {}", e)))?;
    let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        WnsError::MalformedKey(format!("Endpoint id must be 32 bytes (got {})", bytes.len()))
    })?;
    EndpointId::from_bytes(&array)
        .map_err(|e| WnsError::MalformedKey(format!("Invalid endpoint id: {}", e)))
}

struct ActiveTopic {
    sender: GossipSender,
    pump: JoinHandle<()>,
}

/// [`Transport`] backed by an iroh endpoint and a single gossip topic.
pub struct GossipTransport {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    /// Out-of-band peer addresses
    static_provider: StaticProvider,
    topic: String,
    topic_id: TopicId,
    bootstrap: Vec<EndpointId>,
    active: Mutex<Option<ActiveTopic>>,
    neighbors: Arc<RwLock<HashSet<EndpointId>>>,
    inbound: InboundSlot,
}

impl GossipTransport {
    /// Bind an endpoint with a fresh key.
    pub async fn bind(topic: impl Into<String>, bootstrap: Vec<EndpointId>) -> WnsResult<Self> {
        Self::with_secret_key(SecretKey::generate(&mut rand::rng()), topic, bootstrap).await
    }

    /// Bind an endpoint with a specific key, for a stable endpoint id across restarts.
    pub async fn with_secret_key(
        secret_key: SecretKey,
        topic: impl Into<String>,
        bootstrap: Vec<EndpointId>,
    ) -> WnsResult<Self> {
        let topic = topic.into();
        let static_provider = StaticProvider::new();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![GOSSIP_ALPN.to_vec()])
            .discovery(static_provider.clone())
            .bind()
            .await
            .map_err(|e| WnsError::Transport(format!("Failed to bind endpoint: {}", e)))?;
        info!(endpoint_id = %endpoint.id(), "Endpoint bound");

        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());
        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        let topic_id = pubsub_topic_id(&topic);
        debug!(%topic, ?topic_id, "Gossip transport ready");

        Ok(Self {
            endpoint,
            gossip,
            router,
            static_provider,
            topic,
            topic_id,
            bootstrap,
            active: Mutex::new(None),
            neighbors: Arc::new(RwLock::new(HashSet::new())),
            inbound: InboundSlot::new(),
        })
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn endpoint_addr(&self) -> EndpointAddr {
        self.endpoint.addr()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    /// Make a peer's address known without relying on DNS discovery.
    pub fn add_peer_addr(&self, endpoint_addr: EndpointAddr) {
        info!(
            peer = %endpoint_addr.id,
            addrs = endpoint_addr.addrs.len(),
            "Adding peer address to static discovery"
        );
        self.static_provider.add_endpoint_info(endpoint_addr);
    }
}

#[async_trait::async_trait]
impl Transport for GossipTransport {
    async fn start(&self) -> WnsResult<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Ok(());
        }
        let tx = self
            .inbound
            .sender()
            .ok_or_else(|| WnsError::Transport("transport was stopped".to_string()))?;

        info!(
            topic = %self.topic,
            peer_count = self.bootstrap.len(),
            "Subscribing to pubsub topic"
        );
        let subscription = self
            .gossip
            .subscribe(self.topic_id, self.bootstrap.clone())
            .await
            .map_err(|e| WnsError::Transport(format!("Failed to subscribe: {}", e)))?;
        let (sender, receiver) = subscription.split();

        let pump = tokio::spawn(pump_events(
            receiver,
            self.topic_id,
            self.neighbors.clone(),
            tx,
        ));
        *active = Some(ActiveTopic { sender, pump });
        Ok(())
    }

    async fn stop(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.pump.abort();
        }
        self.inbound.close();
        self.neighbors.write().clear();

        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }
        self.endpoint.close().await;
        info!("Gossip transport stopped");
    }

    fn connected_peer_count(&self) -> usize {
        self.neighbors.read().len()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> WnsResult<()> {
        if topic != self.topic {
            return Err(WnsError::Transport(format!("not subscribed to topic {}", topic)));
        }
        let mut active = self.active.lock().await;
        let active = active
            .as_mut()
            .ok_or_else(|| WnsError::Transport("transport not started".to_string()))?;

        debug!(topic = ?self.topic_id, len = payload.len(), "Broadcasting frame");
        active
            .sender
            .broadcast(payload)
            .await
            .map_err(|e| WnsError::Transport(format!("Failed to broadcast: {}", e)))
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inbound.take()
    }
}

async fn pump_events(
    mut receiver: GossipReceiver,
    topic_id: TopicId,
    neighbors: Arc<RwLock<HashSet<EndpointId>>>,
    tx: mpsc::Sender<Envelope>,
) {
    use iroh_gossip::api::Event;
    use n0_future::StreamExt;

    loop {
        match receiver.try_next().await {
            Ok(Some(Event::Received(msg))) => {
                debug!(topic = ?topic_id, from = ?msg.delivered_from, "Received frame");
                if !forward_frame(&msg.content, &tx).await {
                    debug!(topic = ?topic_id, "Inbound consumer gone");
                    break;
                }
            }
            Ok(Some(Event::NeighborUp(peer))) => {
                info!(topic = ?topic_id, ?peer, "Neighbor joined");
                neighbors.write().insert(peer);
            }
            Ok(Some(Event::NeighborDown(peer))) => {
                info!(topic = ?topic_id, ?peer, "Neighbor left");
                neighbors.write().remove(&peer);
            }
            Ok(Some(Event::Lagged)) => {
                warn!(topic = ?topic_id, "Lagged behind on topic");
            }
            Ok(None) => {
                debug!(topic = ?topic_id, "Topic subscription closed");
                break;
            }
            Err(e) => {
                warn!(topic = ?topic_id, error = ?e, "Error receiving from topic");
                break;
            }
        }
    }
    neighbors.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_id_is_deterministic() {
        assert_eq!(pubsub_topic_id("/waku/2/rs/16/64"), pubsub_topic_id("/waku/2/rs/16/64"));
        assert_ne!(pubsub_topic_id("/waku/2/rs/16/64"), pubsub_topic_id("/waku/2/rs/16/65"));
    }

    #[test]
    fn test_parse_endpoint_id_rejects_garbage() {
        assert!(matches!(parse_endpoint_id("zz"), Err(WnsError::MalformedKey(_))));
        assert!(matches!(parse_endpoint_id("abcd"), Err(WnsError::MalformedKey(_))));
    }

    #[tokio::test]
    async fn test_endpoint_id_roundtrips_through_hex() {
        let secret_key = SecretKey::generate(&mut rand::rng());
        let expected = secret_key.public();

        let transport = GossipTransport::with_secret_key(secret_key, "/wns/test", vec![])
            .await
            .expect("Failed to bind gossip transport");
        assert_eq!(transport.endpoint_id(), expected);

        let parsed = parse_endpoint_id(&hex::encode(expected.as_bytes())).unwrap();
        assert_eq!(parsed, expected);

        transport.stop().await;
    }

    #[tokio::test]
    async fn test_lonely_node_publishes_without_peers() {
        let transport = GossipTransport::bind("/wns/test", vec![])
            .await
            .expect("Failed to bind gossip transport");
        assert!(transport.publish("/wns/test", Bytes::from_static(b"x")).await.is_err());

        transport.start().await.unwrap();
        transport.start().await.unwrap();
        assert_eq!(transport.connected_peer_count(), 0);

        // Broadcasting without peers succeeds, the frame just goes nowhere
        transport
            .publish("/wns/test", Bytes::from_static(b"frame"))
            .await
            .unwrap();

        let mut inbound = transport.take_inbound().unwrap();
        transport.stop().await;
        assert!(inbound.recv().await.is_none());
    }
}
