use std::env;

use clap::Args;
use serde::{Deserialize, Serialize};

use mixer_common::crypto::Keypair;

/// Size of the IV prefixed to every encrypted private key.
pub const IV_SIZE: usize = 16;
/// Size of the AES-256 key derived from the master secret via scrypt.
pub const KEY_SIZE: usize = 32;
/// Fixed scrypt salt, preserved for wire-format compatibility with
/// already-persisted records.
pub const KDF_SALT: &str = "salt";

/// Below this available-wallet count, `fix-wallet-pool` regenerates the
/// pool.
pub const MIN_POOL_COUNT: usize = 1_000;

pub const DEFAULT_COLLECTION_NAME: &str = "mixer_wallets";
pub const DEFAULT_DATABASE_NAME: &str = "mixer";

/// Flat base fee in base units, added to `priority_fee` by
/// `estimate_transaction_fee`.
pub const BASE_FEE: u64 = 5_000;
/// Default priority fee in base units.
pub const DEFAULT_PRIORITY_FEE: u64 = 1_000;
/// Rent-exemption minimum, a per-chain constant.
pub const RENT_EXEMPTION_MINIMUM: u64 = 890_880;
/// Conservative cushion subtracted in `max_transferable` on top of fee and
/// rent exemption, to avoid leaving unspendable dust.
pub const SAFETY_BUFFER: u64 = 5_000;

/// Base units per whole coin, used only to express the 0.01-coin dust
/// threshold below.
pub const LAMPORTS_PER_UNIT: u64 = 1_000_000_000;
/// "0.01 SOL's worth" — the parallel sub-executor's threshold for deciding a
/// sender has effectively drained.
pub const DUST_THRESHOLD: u64 = LAMPORTS_PER_UNIT / 100;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_READ_RATE_LIMIT_PER_SEC: u32 = 180;
pub const DEFAULT_SUBMIT_RATE_LIMIT_PER_SEC: u32 = 45;
pub const BALANCE_CACHE_TTL_MS: u64 = 5_000;
pub const BLOCKHASH_CACHE_TTL_MS: u64 = 10_000;

fn default_intermediate_wallet_count() -> usize {
    8
}

fn default_min_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_max_concurrent_tx() -> usize {
    3
}

fn default_balance_check_timeout_ms() -> u64 {
    5_000
}

fn default_priority_fee() -> u64 {
    DEFAULT_PRIORITY_FEE
}

/// Recognized mixer options and their effects.
///
/// Doubles as a `clap::Args` CLI fragment and a `serde`-deserializable
/// settings struct, so the same type works from flags or from a config file.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Hops per destination (K >= 1).
    #[clap(long, env = "intermediate_wallet_count", default_value_t = default_intermediate_wallet_count())]
    #[serde(default = "default_intermediate_wallet_count")]
    pub intermediate_wallet_count: usize,

    /// Minimum bound (ms) on the total sequential-mode operation time.
    #[clap(long, env = "min_delay_ms", default_value_t = default_min_delay_ms())]
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Maximum bound (ms) on the total sequential-mode operation time.
    #[clap(long, env = "max_delay_ms", default_value_t = default_max_delay_ms())]
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Prefer freshly-generated intermediates over pool reuse.
    #[clap(long, env = "use_fresh_wallets")]
    #[serde(default)]
    pub use_fresh_wallets: bool,

    /// Per-transaction compute priority tip, in base units.
    #[clap(long, env = "priority_fee", default_value_t = default_priority_fee())]
    #[serde(default = "default_priority_fee")]
    pub priority_fee: u64,

    /// Select the parallel sub-executor instead of sequential.
    #[clap(long, env = "parallel_mode")]
    #[serde(default)]
    pub parallel_mode: bool,

    /// In-flight transaction window for the parallel sub-executor.
    #[clap(long, env = "max_concurrent_tx", default_value_t = default_max_concurrent_tx())]
    #[serde(default = "default_max_concurrent_tx")]
    pub max_concurrent_tx: usize,

    /// Deadline (ms) for inter-hop balance polling in parallel mode.
    #[clap(long, env = "balance_check_timeout_ms", default_value_t = default_balance_check_timeout_ms())]
    #[serde(default = "default_balance_check_timeout_ms")]
    pub balance_check_timeout_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            intermediate_wallet_count: default_intermediate_wallet_count(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            use_fresh_wallets: false,
            priority_fee: default_priority_fee(),
            parallel_mode: false,
            max_concurrent_tx: default_max_concurrent_tx(),
            balance_check_timeout_ms: default_balance_check_timeout_ms(),
        }
    }
}

impl MixerConfig {
    /// The doubled timeout applied to a route's final hop.
    pub fn final_hop_balance_check_timeout_ms(&self) -> u64 {
        self.balance_check_timeout_ms * 2
    }
}

/// Environment-sourced settings outside of `MixerConfig` proper. Loaded once
/// at startup; nothing here changes over the lifetime of a `run_mixer` call.
#[derive(Clone)]
pub struct EnvSettings {
    pub mongodb_uri: String,
    pub database_name: String,
    pub encryption_secret: String,
    pub rpc_endpoint: String,
    pub fee_funding_wallet: Option<Keypair>,
}

impl EnvSettings {
    /// Load from the process environment. Returns a descriptive error
    /// (surfaced as [`crate::error::MixerError::Config`]) when a required
    /// variable is absent.
    pub fn from_env() -> Result<Self, String> {
        let mongodb_uri =
            env::var("mongodb_uri").map_err(|_| "mongodb_uri is not set".to_string())?;
        let database_name =
            env::var("database_name").unwrap_or_else(|_| DEFAULT_DATABASE_NAME.to_string());
        let encryption_secret = env::var("encryption_secret")
            .map_err(|_| "encryption_secret is not set".to_string())?;
        let rpc_endpoint =
            env::var("rpc_endpoint").map_err(|_| "rpc_endpoint is not set".to_string())?;

        let fee_funding_wallet = match env::var("mixer_fee_funding_wallet_private_key") {
            Ok(encoded) if !encoded.is_empty() => {
                let bytes = bs58::decode(&encoded)
                    .into_vec()
                    .map_err(|e| format!("invalid fee funding wallet base58: {e}"))?;
                let keypair = Keypair::from_slice(&bytes)
                    .map_err(|e| format!("invalid fee funding wallet key bytes: {e}"))?;
                Some(keypair)
            }
            _ => None,
        };

        Ok(Self {
            mongodb_uri,
            database_name,
            encryption_secret,
            rpc_endpoint,
            fee_funding_wallet,
        })
    }
}
