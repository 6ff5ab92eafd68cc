//! Address-tagged encrypted envelopes
//!
//! The `Envelope` is the unit exchanged over the broadcast channel. Every
//! subscriber sees every envelope; the plaintext `address` tag lets nodes skip
//! the ones that are not for them without attempting decryption.
//!
//! ## Wire Format
//!
//! Postcard encoding of:
//!
//! ```text
//! +----------+-----------------+-------------------+-------------+
//! | version  | address (str)   | payload (bytes)   | timestamp   |
//! | (1 byte) | "/wns/1/../proto"| sealed box        | (unix nanos)|
//! +----------+-----------------+-------------------+-------------+
//! ```
//!
//! The tag is not authenticated. Only a successful decryption proves that an
//! envelope was meant for the receiver.

use serde::{Deserialize, Serialize};

use crate::crypto::EnvelopeCodec;
use crate::error::{WnsError, WnsResult};
use crate::identity::{derive_address_with, Address, Identity, PublicKey};

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Format version for forward compatibility
    pub version: u8,
    /// Plaintext routing tag, derived from the recipient's public key
    pub address: Address,
    /// Opaque encrypted payload
    pub payload: Vec<u8>,
    /// Creation time in Unix nanoseconds
    pub timestamp: i64,
}

impl Envelope {
    /// Wrap an already-encrypted payload, stamped with the current time.
    pub fn new(address: Address, payload: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            address,
            payload,
            timestamp: now_nanos(),
        }
    }

    /// Encrypt `plaintext` for `recipient` and tag it with the recipient's address.
    pub fn seal(
        codec: &dyn EnvelopeCodec,
        plaintext: &[u8],
        recipient: &PublicKey,
        segment_len: usize,
    ) -> WnsResult<Self> {
        let payload = codec.encrypt(plaintext, recipient)?;
        Ok(Self::new(derive_address_with(recipient, segment_len), payload))
    }

    /// Decrypt the payload with `identity`.
    ///
    /// Does not look at the address tag; callers filter before opening.
    pub fn open(&self, codec: &dyn EnvelopeCodec, identity: &Identity) -> WnsResult<Vec<u8>> {
        if self.version != ENVELOPE_VERSION {
            return Err(WnsError::EnvelopeVersionUnsupported(self.version));
        }
        codec.decrypt(&self.payload, identity)
    }

    /// Whether this envelope is tagged for `address`
    pub fn is_tagged_for(&self, address: &Address) -> bool {
        &self.address == address
    }

    /// Encode the envelope to bytes for transmission.
    pub fn to_bytes(&self) -> WnsResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| WnsError::Serialization(format!("Failed to encode envelope: {}", e)))
    }

    /// Decode an envelope from bytes.
    pub fn from_bytes(bytes: &[u8]) -> WnsResult<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| WnsError::Serialization(format!("Failed to decode envelope: {}", e)))
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
