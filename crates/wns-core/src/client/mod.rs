//! Requester side of the protocol
//!
//! A [`Client`] seals a [`Request`] for a service node, listens on its own
//! address for the [`Response`] and matches it back by `requestId`.

mod pending;

pub use pending::PendingRequests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use ulid::Ulid;

use crate::config::NodeConfig;
use crate::crypto::{EnvelopeCodec, SealedBoxCodec};
use crate::error::{WnsError, WnsResult};
use crate::identity::{decode_public_key, derive_address_with, Address, Identity};
use crate::node::EnvelopePublisher;
use crate::protocol::{Envelope, Request, Response};
use crate::transport::Transport;

/// Issues requests and correlates their responses.
#[derive(Clone)]
pub struct Client {
    identity: Arc<Identity>,
    address: Address,
    codec: Arc<dyn EnvelopeCodec>,
    publisher: EnvelopePublisher,
    pending: Arc<PendingRequests>,
    config: NodeConfig,
}

impl Client {
    /// Client with a fresh ephemeral identity
    pub fn new(transport: Arc<dyn Transport>, config: NodeConfig) -> WnsResult<Self> {
        Self::with_identity(
            Identity::generate()?,
            transport,
            Arc::new(SealedBoxCodec::new()),
            config,
        )
    }

    pub fn with_identity(
        identity: Identity,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn EnvelopeCodec>,
        config: NodeConfig,
    ) -> WnsResult<Self> {
        config.validate()?;
        let address = derive_address_with(identity.public_key(), config.address_segment_len);
        let publisher = EnvelopePublisher::new(transport, codec.clone(), &config);
        Ok(Self {
            identity: Arc::new(identity),
            address,
            codec,
            publisher,
            pending: Arc::new(PendingRequests::new(config.max_pending)),
            config,
        })
    }

    /// Address responses for this client are tagged with
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key_hex(&self) -> String {
        self.identity.public_key_hex()
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Send `service(input)` to the node owning `server_public_key_hex` and
    /// wait up to `request_ttl` for the answer.
    pub async fn request(
        &self,
        server_public_key_hex: &str,
        service: &str,
        input: &str,
    ) -> WnsResult<Response> {
        let server = decode_public_key(server_public_key_hex)?;
        let request_id = Ulid::new().to_string();
        let ttl = self.config.request_ttl;
        let deadline = Instant::now().checked_add(ttl).ok_or_else(|| {
            WnsError::InvalidConfig(format!("request_ttl {:?} is out of range", ttl))
        })?;
        let rx = self.pending.register(&request_id, deadline)?;

        let request = Request::new(&request_id, self.public_key_hex(), service, input);
        debug!(%request_id, %service, "Sending request");

        let sent = match request.encode() {
            Ok(plaintext) => self.publisher.send_sealed(&plaintext, &server).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(ttl, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Swept before the response arrived
            Ok(Err(_)) => Err(WnsError::RequestTimeout(request_id)),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(WnsError::RequestTimeout(request_id))
            }
        }
    }

    /// Consume `inbound` in the background, completing pending requests.
    pub fn spawn_listener(&self, mut inbound: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            info!(address = %client.address, "Response listener started");
            while let Some(envelope) = inbound.recv().await {
                client.accept(&envelope);
            }
            debug!(address = %client.address, "Response listener stopped");
        })
    }

    /// Periodically drop overdue pending entries.
    pub fn spawn_sweeper(&self, interval: Duration) -> WnsResult<JoinHandle<()>> {
        if interval.is_zero() {
            return Err(WnsError::InvalidConfig(
                "sweep interval must be non-zero".to_string(),
            ));
        }
        let pending = self.pending.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                pending.sweep_expired(Instant::now());
            }
        }))
    }

    /// Match one inbound envelope against the pending table.
    fn accept(&self, envelope: &Envelope) -> bool {
        if !envelope.is_tagged_for(&self.address) {
            trace!(address = %envelope.address, "Envelope not for us");
            return false;
        }
        let plaintext = match envelope.open(self.codec.as_ref(), &self.identity) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                debug!(error = %e, "Discarding undecryptable response");
                return false;
            }
        };
        match Response::decode(&plaintext) {
            Ok(response) => self.pending.complete(response),
            Err(e) => {
                debug!(error = %e, "Discarding malformed response");
                false
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryNetwork;

    #[tokio::test(start_paused = true)]
    async fn test_request_without_server_times_out() {
        let network = MemoryNetwork::new();
        let config = NodeConfig::default().with_request_ttl(Duration::from_secs(5));
        let transport = Arc::new(network.transport(&config.pubsub_topic));
        transport.start().await.unwrap();

        let client = Client::new(transport, config).unwrap();
        let server = Identity::generate().unwrap();

        let err = client
            .request(&server.public_key_hex(), "ResolveWallet", "")
            .await
            .unwrap_err();
        assert!(matches!(err, WnsError::RequestTimeout(_)));
        assert!(client.pending().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_server_key_is_rejected() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("/wns/test"));
        let client = Client::new(transport, NodeConfig::default()).unwrap();

        let err = client.request("xyz", "ResolveWallet", "").await.unwrap_err();
        assert!(matches!(err, WnsError::MalformedKey(_)));
        assert!(client.pending().is_empty());
    }

    #[tokio::test]
    async fn test_accept_completes_matching_request() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("/wns/test"));
        let client = Client::new(transport, NodeConfig::default()).unwrap();

        let rx = client
            .pending()
            .register("42", Instant::now() + Duration::from_secs(5))
            .unwrap();
        let plaintext = Response::ok("42", "0x01").encode().unwrap();
        let envelope = Envelope::seal(
            &SealedBoxCodec::new(),
            &plaintext,
            client.identity.public_key(),
            client.config.address_segment_len,
        )
        .unwrap();

        assert!(client.accept(&envelope));
        assert_eq!(rx.await.unwrap().output, "0x01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_overdue_entries() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("/wns/test"));
        let client = Client::new(transport, NodeConfig::default()).unwrap();

        let overdue = client
            .pending()
            .register("overdue", Instant::now() + Duration::from_secs(1))
            .unwrap();
        let _alive = client
            .pending()
            .register("alive", Instant::now() + Duration::from_secs(60))
            .unwrap();

        let sweeper = client.spawn_sweeper(Duration::from_secs(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!client.pending().contains("overdue"));
        assert!(client.pending().contains("alive"));
        // Waiter of a swept entry sees the channel close
        assert!(overdue.await.is_err());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_sweeper_rejects_zero_interval() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("/wns/test"));
        let client = Client::new(transport, NodeConfig::default()).unwrap();

        let err = client.spawn_sweeper(Duration::ZERO).unwrap_err();
        assert!(matches!(err, WnsError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_rejected_up_front() {
        let network = MemoryNetwork::new();
        let transport = Arc::new(network.transport("/wns/test"));
        let config = NodeConfig::default().with_request_ttl(Duration::from_secs(u64::MAX));

        let err = Client::new(transport, config).unwrap_err();
        assert!(matches!(err, WnsError::InvalidConfig(_)));
    }
}
