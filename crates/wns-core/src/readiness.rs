//! Startup readiness gate
//!
//! A freshly started node waits until it sees enough peers on the broadcast
//! channel before it begins answering. Polling follows an exponential backoff
//! with jitter and gives up after a fixed wall-clock budget.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::{WnsError, WnsResult};
use crate::transport::Transport;

pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Exponential backoff with jitter.
///
/// Each delay is drawn uniformly from
/// `[interval * (1 - randomization), interval * (1 + randomization)]`, after
/// which the interval grows by `multiplier`, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub randomization_factor: f64,
    current: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_INITIAL_INTERVAL,
            DEFAULT_MULTIPLIER,
            DEFAULT_MAX_INTERVAL,
            DEFAULT_RANDOMIZATION_FACTOR,
        )
    }
}

impl ExponentialBackoff {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        randomization_factor: f64,
    ) -> Self {
        Self {
            initial_interval,
            multiplier: multiplier.max(1.0),
            max_interval,
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
            current: initial_interval,
        }
    }

    /// Un-jittered interval the next delay is drawn around
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    /// Draw the next delay and grow the interval.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.as_secs_f64();
        let delta = base * self.randomization_factor;
        let delay = if delta > 0.0 {
            rand::rng().random_range((base - delta)..=(base + delta))
        } else {
            base
        };

        let grown = Duration::from_secs_f64(base * self.multiplier);
        self.current = grown.min(self.max_interval);

        Duration::from_secs_f64(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.initial_interval;
    }
}

/// Waits for the transport to report enough connected peers.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    /// Passes once strictly more peers than this are connected
    min_peers: usize,
    max_elapsed: Duration,
    backoff: ExponentialBackoff,
}

impl ReadinessGate {
    pub fn new(min_peers: usize, max_elapsed: Duration) -> Self {
        Self {
            min_peers,
            max_elapsed,
            backoff: ExponentialBackoff::default(),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.min_peers, config.readiness_timeout)
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Poll `transport` until it reports more than `min_peers` connections.
    ///
    /// Sleeps are clipped to the deadline, so a failing gate returns after
    /// `max_elapsed` rather than after the next full backoff interval.
    pub async fn wait_until_ready(&self, transport: &dyn Transport) -> WnsResult<()> {
        let started = Instant::now();
        // Unrepresentable deadline: wait without one
        let deadline = started.checked_add(self.max_elapsed);
        let mut backoff = self.backoff.clone();
        backoff.reset();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let peers = transport.connected_peer_count();
            if peers > self.min_peers {
                info!(
                    peers,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Readiness gate passed"
                );
                return Ok(());
            }

            let now = Instant::now();
            let mut delay = backoff.next_delay();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(WnsError::ReadinessTimeout {
                        peers,
                        elapsed: now - started,
                    });
                }
                delay = delay.min(deadline - now);
            }

            debug!(
                peers,
                required = self.min_peers + 1,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Not enough peers yet, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
