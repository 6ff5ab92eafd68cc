//! Envelope codec: asymmetric encryption of opaque payloads
//!
//! The protocol only needs `decrypt(encrypt(m, pub), priv) == m` when `priv`
//! matches `pub`, and failure otherwise. [`EnvelopeCodec`] captures that
//! contract; [`SealedBoxCodec`] implements it with an ephemeral X25519 key
//! exchange feeding a ChaCha20-Poly1305 AEAD.
//!
//! ## Wire Format
//!
//! ```text
//! +------------------+-----------+--------------------------+
//! | ephemeral pk (32)| nonce (12)| ciphertext + tag (16)    |
//! +------------------+-----------+--------------------------+
//! ```
//!
//! ## Key Derivation
//!
//! ```text
//! shared = x25519(ephemeral_sk, recipient_pk)
//! key    = HKDF-SHA256(ikm = shared, salt = ephemeral_pk || recipient_pk,
//!                      info = "wns-sealed-box-v1")
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{WnsError, WnsResult};
use crate::identity::{Identity, KEY_LEN};

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size
pub const TAG_SIZE: usize = 16;

/// Fixed overhead added by [`SealedBoxCodec`] to every payload
pub const SEALED_OVERHEAD: usize = KEY_LEN + NONCE_SIZE + TAG_SIZE;

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"wns-sealed-box-v1";

/// Contract around the external encryption primitive.
pub trait EnvelopeCodec: Send + Sync {
    /// Encrypt `plaintext` so that only the holder of `recipient`'s private key can read it.
    fn encrypt(&self, plaintext: &[u8], recipient: &PublicKey) -> WnsResult<Vec<u8>>;

    /// Decrypt a payload produced by [`EnvelopeCodec::encrypt`] for `identity`.
    fn decrypt(&self, ciphertext: &[u8], identity: &Identity) -> WnsResult<Vec<u8>>;
}

/// Anonymous sealed box: X25519 ECDH + HKDF-SHA256 + ChaCha20-Poly1305.
///
/// A fresh ephemeral keypair and a random nonce are drawn for each message,
/// so sealing the same plaintext twice yields different ciphertexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedBoxCodec;

impl SealedBoxCodec {
    pub fn new() -> Self {
        Self
    }
}

impl EnvelopeCodec for SealedBoxCodec {
    fn encrypt(&self, plaintext: &[u8], recipient: &PublicKey) -> WnsResult<Vec<u8>> {
        let mut ephemeral_seed = [0u8; KEY_LEN];
        getrandom::getrandom(&mut ephemeral_seed)
            .map_err(|e| WnsError::Encrypt(format!("Failed to generate ephemeral key: {}", e)))?;
        let ephemeral_secret = StaticSecret::from(ephemeral_seed);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);

        let shared = ephemeral_secret.diffie_hellman(recipient);
        if !shared.was_contributory() {
            return Err(WnsError::Encrypt(
                "Recipient key produced a non-contributory shared secret".to_string(),
            ));
        }
        let key = derive_key(shared.as_bytes(), &ephemeral_public, recipient)
            .map_err(WnsError::Encrypt)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = ChaCha20Poly1305::new((&key).into())
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| WnsError::Encrypt(format!("AEAD encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(SEALED_OVERHEAD + plaintext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, ciphertext: &[u8], identity: &Identity) -> WnsResult<Vec<u8>> {
        if ciphertext.len() < SEALED_OVERHEAD {
            return Err(WnsError::Decrypt(format!(
                "Sealed payload too short ({} bytes)",
                ciphertext.len()
            )));
        }

        let (ephemeral_bytes, rest) = ciphertext.split_at(KEY_LEN);
        let (nonce_bytes, encrypted) = rest.split_at(NONCE_SIZE);

        let mut ephemeral = [0u8; KEY_LEN];
        ephemeral.copy_from_slice(ephemeral_bytes);
        let ephemeral_public = PublicKey::from(ephemeral);

        let shared = identity.secret().diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(WnsError::Decrypt(
                "Ephemeral key produced a non-contributory shared secret".to_string(),
            ));
        }
        let key = derive_key(shared.as_bytes(), &ephemeral_public, identity.public_key())
            .map_err(WnsError::Decrypt)?;

        ChaCha20Poly1305::new((&key).into())
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|e| WnsError::Decrypt(format!("AEAD decryption failed: {}", e)))
    }
}

/// Derive the 32-byte AEAD key from an X25519 shared secret.
fn derive_key(
    shared_secret: &[u8],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<[u8; 32], String> {
    let mut salt = [0u8; KEY_LEN * 2];
    salt[..KEY_LEN].copy_from_slice(ephemeral.as_bytes());
    salt[KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut output = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut output)
        .map_err(|e| format!("HKDF expand failed: {}", e))?;
    Ok(output)
}
