//! Broadcast transport boundary
//!
//! The protocol layer treats the network as a shared pub/sub channel: every
//! subscriber receives every published frame, regardless of its address tag.
//!
//! ## Implementations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Transport (trait)                                              │
//! │  ├── GossipTransport  iroh endpoint + iroh-gossip topic         │
//! │  └── MemoryTransport  in-process hub (tests, local meshes)      │
//! │                                                                 │
//! │  inbound: mpsc::Receiver<Envelope>  (taken once, one consumer)  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod gossip;
mod memory;

pub use gossip::{parse_endpoint_id, pubsub_topic_id, GossipTransport};
pub use memory::{MemoryNetwork, MemoryTransport};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::WnsResult;
use crate::protocol::Envelope;

/// Capacity of the inbound envelope queue between transport and consumer
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Contract with the broadcast transport collaborator.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Join the network. Calling it again on a started transport is a no-op.
    async fn start(&self) -> WnsResult<()>;

    /// Leave the network. The inbound stream ends afterwards.
    async fn stop(&self);

    /// Number of peers currently connected on the shared channel
    fn connected_peer_count(&self) -> usize;

    /// Best-effort broadcast of `payload` on `topic`.
    ///
    /// Callers bound this with a deadline; dropping the future cancels it.
    async fn publish(&self, topic: &str, payload: Bytes) -> WnsResult<()>;

    /// Take the inbound envelope stream. Returns `None` once taken.
    fn take_inbound(&self) -> Option<mpsc::Receiver<Envelope>>;
}

/// Single-consumer inbound queue shared by the transport implementations.
///
/// Closing the slot drops the transport's own sender; once the pump task holding
/// the last clone stops, the consumer's `recv` returns `None`.
pub(crate) struct InboundSlot {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
}

impl InboundSlot {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Sender for a pump task, `None` after [`InboundSlot::close`]
    pub(crate) fn sender(&self) -> Option<mpsc::Sender<Envelope>> {
        self.tx.lock().clone()
    }

    pub(crate) fn take(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.rx.lock().take()
    }

    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }
}

/// Decode a raw frame and hand it to the consumer.
///
/// Returns `false` once the consumer is gone.
pub(crate) async fn forward_frame(frame: &[u8], tx: &mpsc::Sender<Envelope>) -> bool {
    match Envelope::from_bytes(frame) {
        Ok(envelope) => {
            debug!(address = %envelope.address, bytes = frame.len(), "Inbound envelope");
            tx.send(envelope).await.is_ok()
        }
        Err(e) => {
            warn!(error = %e, bytes = frame.len(), "Dropping undecodable frame");
            true
        }
    }
}
