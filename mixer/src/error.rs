use mixer_common::crypto::PublicKey;
use thiserror::Error;

/// Errors raised while encrypting/decrypting a `StoredWallet`'s secret key.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("ciphertext is shorter than the mandatory 16-byte IV")]
    Truncated,
    #[error("malformed hex in encrypted private key wire format")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("scrypt key derivation failed: {0}")]
    Kdf(String),
    #[error("AES-256-CBC operation failed (bad padding or corrupted ciphertext)")]
    Aes,
    #[error("decrypted plaintext is not valid base58")]
    InvalidBase58,
    #[error(transparent)]
    Crypto(#[from] mixer_common::CryptoError),
}

/// Errors from the Wallet Pool Manager.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool could not provide {requested} validated wallets (found {found})")]
    Insufficient { requested: usize, found: usize },
    #[error("wallet {0} failed decryption validation")]
    DecryptFail(PublicKey),
    #[error("persistence backend error: {0}")]
    Store(#[source] anyhow::Error),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Errors from route planning.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("need at least one destination")]
    NoDestinations,
    #[error("intermediate_wallet_count must be at least 1")]
    ZeroHops,
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors from the connection/transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("blockhash expired after {retries} retries")]
    BlockhashExpired { retries: u32 },
    #[error("transaction submission exhausted retries: {0}")]
    SendExhausted(String),
    #[error("confirmation timed out after {retries} attempts")]
    ConfirmTimeout { retries: u32 },
}

/// Errors from the mixer orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("source balance insufficient: need at least {need}, have {have}")]
    SourceInsufficient { need: u64, have: u64 },
    #[error("fee-funding wallet balance insufficient: need at least {need}, have {have}")]
    FeeWalletInsufficient { need: u64, have: u64 },
    #[error("per-destination amount computed to zero or less")]
    ZeroPerDestination,
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Errors from the recovery subsystem. Recovery itself is
/// best-effort and never propagates these upward — they are recorded into
/// `lost_funds` instead — but the type documents what can go wrong.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("sweep transfer from {0} failed: {1}")]
    SweepFailed(PublicKey, String),
}

/// Top-level error surfaced at the `run_mixer` operation boundary. Only
/// pre-execution validation failures raise here; per-route failures are
/// captured in that route's `MixingResult` instead.
#[derive(Error, Debug)]
pub enum MixerError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("configuration error: {0}")]
    Config(String),
}
