//! Routing addresses derived from public keys
//!
//! ```text
//! address = "/wns/1/" + hex(public_key)[..segment_len] + "/proto"
//! ```
//!
//! The truncated segment keeps tags short at the cost of collisions. A tag
//! match only means "worth trying to decrypt"; decryption is the real check.

use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey;

use super::keypair::encode_public_key;

/// Default number of hex characters kept from the public key
pub const DEFAULT_SEGMENT_LEN: usize = 16;

const ADDRESS_PREFIX: &str = "/wns/1/";
const ADDRESS_SUFFIX: &str = "/proto";

/// Plaintext routing tag carried on every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Apply the truncation rule to an already hex-encoded public key.
    pub fn from_key_hex(key_hex: &str, segment_len: usize) -> Self {
        let segment: String = key_hex.chars().take(segment_len).collect();
        Address(format!("{}{}{}", ADDRESS_PREFIX, segment, ADDRESS_SUFFIX))
    }

    /// Wrap a tag read off the wire
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Address(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key-derived middle part of the address, if it has the expected shape
    pub fn segment(&self) -> Option<&str> {
        self.0
            .strip_prefix(ADDRESS_PREFIX)
            .and_then(|rest| rest.strip_suffix(ADDRESS_SUFFIX))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the address of a public key using the default segment length.
pub fn derive_address(public: &PublicKey) -> Address {
    derive_address_with(public, DEFAULT_SEGMENT_LEN)
}

/// Derive the address of a public key with a custom segment length.
pub fn derive_address_with(public: &PublicKey, segment_len: usize) -> Address {
    Address::from_key_hex(&encode_public_key(public), segment_len)
}
