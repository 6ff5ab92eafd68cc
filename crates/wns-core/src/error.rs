//! Error types for the WNS protocol layer

use std::time::Duration;

use thiserror::Error;

/// Main error type for WNS operations
#[derive(Error, Debug)]
pub enum WnsError {
    /// The OS random source could not produce key material
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Supplied private key secret is empty, malformed or not a valid key
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// Public key is not valid hex or not a valid key encoding
    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    /// Encryption for a recipient failed
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Decryption failed (addressed elsewhere despite tag match, or corrupt)
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Decrypted payload is not a well-formed request
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Decrypted payload is not a well-formed response
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No handler registered for the requested service
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// A service handler could not produce a response
    #[error("Handler error: {0}")]
    Handler(String),

    /// Transport refused the publish
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Transport did not accept the publish within the time budget
    #[error("Publish timed out after {0:?}")]
    PublishTimeout(Duration),

    /// Not enough peers connected before the readiness deadline
    #[error("Readiness timeout: {peers} peer(s) connected after {elapsed:?}")]
    ReadinessTimeout { peers: usize, elapsed: Duration },

    /// Envelope protocol version not supported
    #[error("Envelope version {0} is not supported")]
    EnvelopeVersionUnsupported(u8),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport lifecycle or network error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No response arrived for a request before its deadline
    #[error("Request {0} timed out")]
    RequestTimeout(String),

    /// The requester's pending-request table is full
    #[error("Too many pending requests (limit {0})")]
    TooManyPendingRequests(usize),
}

/// Result type alias using WnsError
pub type WnsResult<T> = Result<T, WnsError>;

impl From<postcard::Error> for WnsError {
    fn from(e: postcard::Error) -> Self {
        WnsError::Serialization(e.to_string())
    }
}
