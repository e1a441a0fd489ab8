use thiserror::Error;

/// Errors that can occur while handling key material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A byte slice did not have the expected length for this key type.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// The bytes did not decode to a valid ed25519 key.
    #[error("malformed ed25519 key material")]
    MalformedKey,

    /// Base58 decoding failed.
    #[error("invalid base58 string: {0}")]
    InvalidBase58(String),
}
