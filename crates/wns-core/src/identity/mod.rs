//! Identity and address subsystem
//!
//! Every participant holds an X25519 [`Identity`]. Its public key does double
//! duty: requesters encrypt to it, and its hex encoding is truncated into the
//! plaintext [`Address`] tag that lets nodes skip envelopes meant for others.
//!
//! ## Example
//!
//! ```rust
//! use wns_core::identity::{derive_address, decode_public_key, Identity};
//!
//! let identity = Identity::generate().unwrap();
//! let address = derive_address(identity.public_key());
//! assert!(address.as_str().starts_with("/wns/1/"));
//!
//! // What a requester would send as its reply key
//! let reply_key = identity.public_key_hex();
//! let decoded = decode_public_key(&reply_key).unwrap();
//! assert_eq!(derive_address(&decoded), address);
//! ```

mod address;
mod keypair;

pub use address::{derive_address, derive_address_with, Address, DEFAULT_SEGMENT_LEN};
pub use keypair::{decode_public_key, encode_public_key, Identity, KEY_LEN};
pub use x25519_dalek::PublicKey;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_identity_keeps_address() {
        let original = Identity::generate().unwrap();
        let restored = Identity::load(&original.secret_hex()).unwrap();

        assert_eq!(
            derive_address(original.public_key()),
            derive_address(restored.public_key())
        );
    }
}
