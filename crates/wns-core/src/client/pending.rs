//! Requester-side correlation table
//!
//! The only place a `requestId` is remembered. Entries carry a deadline and
//! are removed on completion, on timeout, or by a periodic sweep.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{WnsError, WnsResult};
use crate::protocol::Response;

struct PendingEntry {
    deadline: Instant,
    tx: oneshot::Sender<Response>,
}

/// Bounded map of outstanding requests keyed by `requestId`.
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingEntry>>,
    capacity: usize,
}

impl PendingRequests {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Track `request_id` until `deadline`.
    ///
    /// When the table is full, overdue entries are evicted first; if it is
    /// still full the registration is refused.
    pub fn register(
        &self,
        request_id: impl Into<String>,
        deadline: Instant,
    ) -> WnsResult<oneshot::Receiver<Response>> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            let now = Instant::now();
            entries.retain(|_, entry| entry.deadline > now);
            if entries.len() >= self.capacity {
                return Err(WnsError::TooManyPendingRequests(self.capacity));
            }
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(request_id.into(), PendingEntry { deadline, tx });
        Ok(rx)
    }

    /// Hand `response` to whoever waits for its `requestId`.
    ///
    /// Returns `false` for unknown or overdue ids, and when the waiter is gone.
    pub fn complete(&self, response: Response) -> bool {
        let Some(entry) = self.entries.lock().remove(&response.request_id) else {
            debug!(request_id = %response.request_id, "Response for unknown request");
            return false;
        };
        if entry.deadline <= Instant::now() {
            debug!(request_id = %response.request_id, "Response arrived after deadline");
            return false;
        }
        entry.tx.send(response).is_ok()
    }

    pub fn remove(&self, request_id: &str) -> bool {
        self.entries.lock().remove(request_id).is_some()
    }

    /// Drop every entry whose deadline is at or before `now`.
    ///
    /// Waiters of swept entries observe a closed channel.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.deadline > now);
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, remaining = entries.len(), "Swept expired requests");
        }
        swept
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
