//! X25519 keypair used both for addressing and for sealed-box encryption

use std::fmt;

use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{WnsError, WnsResult};

/// Length of an X25519 key in bytes
pub const KEY_LEN: usize = 32;

/// A node's (or requester's) asymmetric keypair.
///
/// Immutable once created. The secret is zeroized on drop by `x25519-dalek`
/// and never appears in `Debug` output.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh keypair from the OS random source.
    ///
    /// Uses getrandom directly to avoid rand_core version conflicts with
    /// x25519-dalek.
    pub fn generate() -> WnsResult<Self> {
        let mut seed = [0u8; KEY_LEN];
        getrandom::getrandom(&mut seed)
            .map_err(|e| WnsError::KeyGeneration(format!("OS randomness unavailable: {}", e)))?;
        Ok(Self::from_secret_bytes(seed))
    }

    /// Reconstruct a keypair from a hex-encoded private key.
    ///
    /// Surrounding whitespace and a leading `0x` are tolerated.
    pub fn load(secret: &str) -> WnsResult<Self> {
        let trimmed = secret.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Err(WnsError::InvalidSecret("secret is empty".to_string()));
        }

        let bytes = hex::decode(trimmed)
            .map_err(|e| WnsError::InvalidSecret(format!("not valid hex: {}", e)))?;

        let seed: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            WnsError::InvalidSecret(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;

        if seed.iter().all(|b| *b == 0) {
            return Err(WnsError::InvalidSecret(
                "all-zero scalar is not a private key".to_string(),
            ));
        }

        Ok(Self::from_secret_bytes(seed))
    }

    fn from_secret_bytes(seed: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public half of this identity
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Hex encoding of the public key (what requesters put in `replyPublicKey`)
    pub fn public_key_hex(&self) -> String {
        encode_public_key(&self.public)
    }

    /// Hex encoding of the private key, for out-of-band storage by the operator.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

const LOW_ORDER_CHECK_SCALAR: [u8; KEY_LEN] = [0x2a; KEY_LEN];

/// Encode a public key as lowercase hex.
pub fn encode_public_key(public: &PublicKey) -> String {
    hex::encode(public.as_bytes())
}

/// Decode a hex public key.
///
/// # Errors
///
/// `WnsError::MalformedKey` on invalid hex, a length other than 32 bytes, or
/// a low-order point (no key agreement with it can be contributory).
pub fn decode_public_key(encoded: &str) -> WnsResult<PublicKey> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| WnsError::MalformedKey(format!("not valid hex: {}", e)))?;

    let array: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        WnsError::MalformedKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
    })?;

    let public = PublicKey::from(array);
    // Clamped scalars clear the cofactor, so only low-order points yield zero
    if !StaticSecret::from(LOW_ORDER_CHECK_SCALAR)
        .diffie_hellman(&public)
        .was_contributory()
    {
        return Err(WnsError::MalformedKey("low-order point".to_string()));
    }

    Ok(public)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_load_roundtrips_secret() {
        let original = Identity::generate().unwrap();
        let loaded = Identity::load(&original.secret_hex()).unwrap();
        assert_eq!(original.public_key(), loaded.public_key());
    }

    #[test]
    fn test_load_accepts_prefix_and_whitespace() {
        let original = Identity::generate().unwrap();
        let padded = format!("  0x{}\n", original.secret_hex());
        let loaded = Identity::load(&padded).unwrap();
        assert_eq!(original.public_key(), loaded.public_key());
    }

    #[test]
    fn test_load_rejects_bad_secrets() {
        let zero = "00".repeat(32);
        let too_long = "11".repeat(33);
        for secret in ["", "   ", "0x", "not-hex", "abcd", zero.as_str(), too_long.as_str()] {
            let result = Identity::load(secret);
            assert!(
                matches!(result, Err(WnsError::InvalidSecret(_))),
                "secret {:?} should be rejected",
                secret
            );
        }
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let identity = Identity::generate().unwrap();
        let encoded = identity.public_key_hex();
        assert_eq!(encoded.len(), 64);
        let decoded = decode_public_key(&encoded).unwrap();
        assert_eq!(&decoded, identity.public_key());
    }

    #[test]
    fn test_decode_public_key_rejects_malformed() {
        assert!(matches!(decode_public_key("zz"), Err(WnsError::MalformedKey(_))));
        assert!(matches!(decode_public_key("abcd"), Err(WnsError::MalformedKey(_))));
    }

    #[test]
    fn test_decode_public_key_rejects_low_order_points() {
        let low_order = [
            "00".repeat(32),
            format!("01{}", "00".repeat(31)),
            "e0eb7a7c3b41b8ae1656e3faf19fc46ada098deb9c32b1fd866205165f49b800".to_string(),
            format!("ec{}7f", "ff".repeat(30)),
        ];
        for encoded in &low_order {
            assert!(
                matches!(decode_public_key(encoded), Err(WnsError::MalformedKey(_))),
                "point {} should be rejected",
                encoded
            );
        }
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = Identity::generate().unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(&identity.public_key_hex()));
        assert!(!debug.contains(&identity.secret_hex()));
    }
}
