//! WNS Core Library
//!
//! Name/service resolution over an encrypted, topic-tagged broadcast network.
//!
//! ## Overview
//!
//! Every participant subscribes to one shared pub/sub topic and sees every
//! message on it. Requests and responses are sealed for a single recipient and
//! carry a plaintext address tag derived from that recipient's public key, so
//! nodes skip everything not meant for them without trying to decrypt it.
//!
//! - **Service nodes** register named handlers and answer requests addressed
//!   to them ([`Node`]).
//! - **Requesters** seal a request for a node's public key, include their own
//!   key for the reply and correlate the answer by `requestId` ([`Client`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use wns_core::{default_registry, GossipTransport, Identity, Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::default();
//!     let transport = Arc::new(GossipTransport::bind(&config.pubsub_topic, vec![]).await?);
//!     let node = Node::new(Identity::generate()?, default_registry(), transport, config)?;
//!
//!     println!("Serving at {}", node.address());
//!     let stats = node.serve(CancellationToken::new()).await?;
//!     println!("Replied to {} requests", stats.replied);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod node;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod services;
pub mod transport;

// Re-exports
pub use client::{Client, PendingRequests};
pub use config::NodeConfig;
pub use crypto::{EnvelopeCodec, SealedBoxCodec};
pub use error::{WnsError, WnsResult};
pub use identity::{
    decode_public_key, derive_address, derive_address_with, encode_public_key, Address, Identity,
    PublicKey,
};
pub use node::{DispatchOutcome, DispatchStats, EnvelopePublisher, Node};
pub use protocol::{Envelope, Request, Response, ENVELOPE_VERSION};
pub use readiness::{ExponentialBackoff, ReadinessGate};
pub use registry::{ServiceHandler, ServiceRegistry};
pub use services::{default_registry, ResolveWallet, RESOLVE_WALLET};
pub use transport::{GossipTransport, MemoryNetwork, MemoryTransport, Transport};
