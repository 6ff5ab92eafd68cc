//! In-process broadcast network
//!
//! Every started [`MemoryTransport`] on a [`MemoryNetwork`] receives every
//! frame published by the other members on the same topic, mirroring gossip
//! semantics (no echo to the publisher) without touching the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{forward_frame, InboundSlot, Transport};
use crate::error::{WnsError, WnsResult};
use crate::protocol::Envelope;

/// Frames buffered per subscriber before it starts lagging
const NETWORK_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Frame {
    from: u64,
    topic: Arc<str>,
    payload: Bytes,
}

struct NetworkInner {
    tx: broadcast::Sender<Frame>,
    /// Started members and the topic each one joined
    members: Mutex<HashMap<u64, Arc<str>>>,
    next_id: AtomicU64,
}

/// Shared hub that [`MemoryTransport`]s join.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NETWORK_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(NetworkInner {
                tx,
                members: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a transport attached to this network, subscribed to `topic` once started.
    pub fn transport(&self, topic: impl Into<String>) -> MemoryTransport {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        MemoryTransport {
            id,
            topic: Arc::from(topic.into()),
            network: self.clone(),
            inbound: InboundSlot::new(),
            pump: Mutex::new(None),
            published: AtomicUsize::new(0),
            fail_publishes: AtomicBool::new(false),
        }
    }

    /// Number of started members across all topics
    pub fn member_count(&self) -> usize {
        self.inner.members.lock().len()
    }

    fn peers_on(&self, topic: &str, excluding: u64) -> usize {
        self.inner
            .members
            .lock()
            .iter()
            .filter(|(id, t)| **id != excluding && t.as_ref() == topic)
            .count()
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("members", &self.member_count())
            .finish()
    }
}

/// A member of a [`MemoryNetwork`].
pub struct MemoryTransport {
    id: u64,
    topic: Arc<str>,
    network: MemoryNetwork,
    inbound: InboundSlot,
    pump: Mutex<Option<JoinHandle<()>>>,
    published: AtomicUsize,
    fail_publishes: AtomicBool,
}

impl MemoryTransport {
    /// Frames accepted by [`Transport::publish`] so far
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    /// Make every subsequent publish fail, for exercising error paths.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn is_started(&self) -> bool {
        self.pump.lock().is_some()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn start(&self) -> WnsResult<()> {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return Ok(());
        }
        let tx = self
            .inbound
            .sender()
            .ok_or_else(|| WnsError::Transport("transport was stopped".to_string()))?;

        let rx = self.network.inner.tx.subscribe();
        self.network
            .inner
            .members
            .lock()
            .insert(self.id, self.topic.clone());

        *pump = Some(tokio::spawn(pump_frames(self.id, self.topic.clone(), rx, tx)));
        info!(member = self.id, topic = %self.topic, "Memory transport started");
        Ok(())
    }

    async fn stop(&self) {
        let handle = self.pump.lock().take();
        self.network.inner.members.lock().remove(&self.id);
        self.inbound.close();
        if let Some(handle) = handle {
            handle.abort();
            info!(member = self.id, "Memory transport stopped");
        }
    }

    fn connected_peer_count(&self) -> usize {
        if !self.is_started() {
            return 0;
        }
        self.network.peers_on(&self.topic, self.id)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> WnsResult<()> {
        if !self.is_started() {
            return Err(WnsError::Transport("transport not started".to_string()));
        }
        if topic != self.topic.as_ref() {
            return Err(WnsError::Transport(format!("not subscribed to topic {}", topic)));
        }
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(WnsError::Transport("publish rejected".to_string()));
        }

        debug!(member = self.id, %topic, len = payload.len(), "Broadcasting frame");
        // No receivers is not an error for a broadcast medium
        let _ = self.network.inner.tx.send(Frame {
            from: self.id,
            topic: self.topic.clone(),
            payload,
        });
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<Envelope>> {
        self.inbound.take()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.inner.members.lock().remove(&self.id);
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

async fn pump_frames(
    id: u64,
    topic: Arc<str>,
    mut rx: broadcast::Receiver<Frame>,
    tx: mpsc::Sender<Envelope>,
) {
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if frame.from == id || frame.topic != topic {
                    continue;
                }
                if !forward_frame(&frame.payload, &tx).await {
                    debug!(member = id, "Inbound consumer gone");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(member = id, skipped, "Lagged behind on memory network");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
