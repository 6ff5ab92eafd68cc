//! Service node: dispatch loop and response publishing
//!
//! ## Dispatch pipeline
//!
//! ```text
//! inbound Envelope
//!   │
//!   ├─ tag != own address ──────────────▶ NotForUs (no decryption)
//!   ├─ unsupported version ─────────────▶ UnsupportedVersion
//!   ├─ decrypt ── fail ─────────────────▶ DecryptFailed
//!   ├─ JSON Request ── fail ────────────▶ MalformedRequest
//!   ├─ empty service name ──────────────▶ MalformedRequest (400 if reply_on_error)
//!   ├─ registry lookup ── none ─────────▶ UnknownService   (404 if reply_on_error)
//!   ├─ handler ── error ────────────────▶ HandlerFailed    (500 if reply_on_error)
//!   └─ publish to addr(replyPublicKey) ─▶ Replied | PublishFailed
//! ```
//!
//! No per-envelope failure ends the loop. With one worker everything runs in
//! delivery order; with more, decoded requests are sharded by requester so
//! each requester still sees its responses in order.

mod publisher;
mod stats;

pub use publisher::EnvelopePublisher;
pub use stats::{DispatchOutcome, DispatchStats};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::crypto::{EnvelopeCodec, SealedBoxCodec};
use crate::error::{WnsError, WnsResult};
use crate::identity::{derive_address_with, Address, Identity};
use crate::protocol::{
    Envelope, Request, Response, STATUS_BAD_REQUEST, STATUS_HANDLER_ERROR,
    STATUS_UNSUPPORTED_SERVICE,
};
use crate::readiness::ReadinessGate;
use crate::registry::ServiceRegistry;
use crate::transport::Transport;
use stats::DispatchCounters;

/// Requests buffered per pooled worker
const WORKER_QUEUE_CAPACITY: usize = 64;

/// A participant that answers requests for the services in its registry.
///
/// Cloning is cheap; clones share identity, registry, transport and counters.
#[derive(Clone)]
pub struct Node {
    identity: Arc<Identity>,
    address: Address,
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn EnvelopeCodec>,
    publisher: EnvelopePublisher,
    config: NodeConfig,
    counters: Arc<DispatchCounters>,
}

impl Node {
    /// Create a node using the default sealed-box codec.
    pub fn new(
        identity: Identity,
        registry: ServiceRegistry,
        transport: Arc<dyn Transport>,
        config: NodeConfig,
    ) -> WnsResult<Self> {
        Self::with_codec(
            identity,
            registry,
            transport,
            Arc::new(SealedBoxCodec::new()),
            config,
        )
    }

    pub fn with_codec(
        identity: Identity,
        registry: ServiceRegistry,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn EnvelopeCodec>,
        config: NodeConfig,
    ) -> WnsResult<Self> {
        config.validate()?;
        let address = derive_address_with(identity.public_key(), config.address_segment_len);
        let publisher = EnvelopePublisher::new(transport.clone(), codec.clone(), &config);

        info!(
            %address,
            services = ?registry.services(),
            workers = config.workers,
            "Node created"
        );

        Ok(Self {
            identity: Arc::new(identity),
            address,
            registry: Arc::new(registry),
            transport,
            codec,
            publisher,
            config,
            counters: Arc::new(DispatchCounters::default()),
        })
    }

    /// The address requesters tag envelopes with to reach this node
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key_hex(&self) -> String {
        self.identity.public_key_hex()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn publisher(&self) -> &EnvelopePublisher {
        &self.publisher
    }

    /// Live counters across every run of this node and its clones
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Start the transport and pass the readiness gate.
    ///
    /// Returns the inbound stream to hand to [`Node::run`]. A gate failure is
    /// returned as-is and the loop must not be started.
    pub async fn start(&self) -> WnsResult<mpsc::Receiver<Envelope>> {
        self.transport.start().await?;
        ReadinessGate::from_config(&self.config)
            .wait_until_ready(self.transport.as_ref())
            .await?;
        self.transport
            .take_inbound()
            .ok_or_else(|| WnsError::Transport("inbound stream already taken".to_string()))
    }

    /// Start, dispatch until `shutdown` fires, then stop the transport.
    pub async fn serve(&self, shutdown: CancellationToken) -> WnsResult<DispatchStats> {
        let inbound = self.start().await?;
        let stats = self.run(inbound, shutdown).await;
        self.transport.stop().await;
        Ok(stats)
    }

    /// Consume `inbound` until it closes or `shutdown` fires.
    pub async fn run(
        &self,
        inbound: mpsc::Receiver<Envelope>,
        shutdown: CancellationToken,
    ) -> DispatchStats {
        info!(address = %self.address, workers = self.config.workers, "Dispatch loop started");

        if self.config.workers > 1 {
            self.run_pooled(inbound, shutdown).await;
        } else {
            self.run_sequential(inbound, shutdown).await;
        }

        let stats = self.stats();
        info!(
            address = %self.address,
            replied = stats.replied,
            total = stats.total(),
            "Dispatch loop stopped"
        );
        stats
    }

    async fn run_sequential(&self, mut inbound: mpsc::Receiver<Envelope>, shutdown: CancellationToken) {
        while let Some(envelope) = next_envelope(&mut inbound, &shutdown).await {
            let outcome = self.handle_envelope(&envelope).await;
            self.counters.record(outcome);
        }
    }

    async fn run_pooled(&self, mut inbound: mpsc::Receiver<Envelope>, shutdown: CancellationToken) {
        let workers = self.config.workers;
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, mut rx) = mpsc::channel::<Request>(WORKER_QUEUE_CAPACITY);
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(request) = rx.recv().await {
                    let outcome = node.respond(request).await;
                    node.counters.record(outcome);
                }
                debug!(worker, "Worker drained");
            }));
            queues.push(tx);
        }

        while let Some(envelope) = next_envelope(&mut inbound, &shutdown).await {
            match self.prepare(&envelope) {
                Ok(request) => {
                    let worker = worker_for(&request.reply_public_key, workers);
                    if queues[worker].send(request).await.is_err() {
                        warn!(worker, "Worker queue closed, dropping request");
                    }
                }
                Err(outcome) => self.counters.record(outcome),
            }
        }

        drop(queues);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = ?e, "Worker task failed");
            }
        }
    }

    /// Run one envelope through the full pipeline.
    pub async fn handle_envelope(&self, envelope: &Envelope) -> DispatchOutcome {
        match self.prepare(envelope) {
            Ok(request) => self.respond(request).await,
            Err(outcome) => outcome,
        }
    }

    /// Filter, decrypt and decode. Errors carry the terminal outcome.
    fn prepare(&self, envelope: &Envelope) -> Result<Request, DispatchOutcome> {
        if !envelope.is_tagged_for(&self.address) {
            trace!(address = %envelope.address, "Envelope not for us");
            return Err(DispatchOutcome::NotForUs);
        }

        let plaintext = match envelope.open(self.codec.as_ref(), &self.identity) {
            Ok(plaintext) => plaintext,
            Err(WnsError::EnvelopeVersionUnsupported(version)) => {
                warn!(version, "Discarding envelope with unsupported version");
                return Err(DispatchOutcome::UnsupportedVersion);
            }
            Err(e) => {
                debug!(error = %e, "Discarding envelope that failed to decrypt");
                return Err(DispatchOutcome::DecryptFailed);
            }
        };

        Request::decode(&plaintext).map_err(|e| {
            warn!(error = %e, bytes = plaintext.len(), "Discarding malformed request");
            DispatchOutcome::MalformedRequest
        })
    }

    /// Look up, invoke and reply.
    async fn respond(&self, request: Request) -> DispatchOutcome {
        if request.service.is_empty() {
            warn!(request_id = %request.request_id, "Request without service name");
            if self.config.reply_on_error {
                let response = Response::error(
                    &request.request_id,
                    STATUS_BAD_REQUEST,
                    WnsError::MalformedRequest("missing service name".to_string()).to_string(),
                );
                self.reply(&response, &request).await;
            }
            return DispatchOutcome::MalformedRequest;
        }

        let Some(handler) = self.registry.lookup(&request.service) else {
            debug!(
                request_id = %request.request_id,
                service = %request.service,
                "No handler for service"
            );
            if self.config.reply_on_error {
                let response = Response::error(
                    &request.request_id,
                    STATUS_UNSUPPORTED_SERVICE,
                    WnsError::UnknownService(request.service.clone()).to_string(),
                );
                self.reply(&response, &request).await;
            }
            return DispatchOutcome::UnknownService;
        };

        debug!(
            request_id = %request.request_id,
            service = %request.service,
            "Invoking handler"
        );
        match handler.handle(&request) {
            Ok(response) => {
                if self.reply(&response, &request).await {
                    DispatchOutcome::Replied
                } else {
                    DispatchOutcome::PublishFailed
                }
            }
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    service = %request.service,
                    error = %e,
                    "Handler failed"
                );
                if self.config.reply_on_error {
                    let response =
                        Response::error(&request.request_id, STATUS_HANDLER_ERROR, e.to_string());
                    self.reply(&response, &request).await;
                }
                DispatchOutcome::HandlerFailed
            }
        }
    }

    async fn reply(&self, response: &Response, request: &Request) -> bool {
        match self.publisher.publish(response, &request.reply_public_key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    error = %e,
                    "Failed to publish response"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

async fn next_envelope(
    inbound: &mut mpsc::Receiver<Envelope>,
    shutdown: &CancellationToken,
) -> Option<Envelope> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        next = inbound.recv() => next,
    }
}

/// Same requester, same worker
fn worker_for(reply_public_key: &str, workers: usize) -> usize {
    let hash = blake3::hash(reply_public_key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % workers as u64) as usize
}
