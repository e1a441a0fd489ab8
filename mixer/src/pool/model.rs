use chrono::{DateTime, Utc};
use mixer_common::crypto::PublicKey;
use serde::{Deserialize, Serialize};

/// A pool wallet's lifecycle state.
///
/// Modeled as a closed enum rather than a string tag: an unrecognized value
/// read from storage is a hard error, not a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Available,
    InUse,
    Depleted,
    Error,
}

/// The kind of a `transaction_history` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Receive,
    Send,
    FeeFunding,
}

/// One append-only entry in a `StoredWallet`'s history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionHistoryEntry {
    pub signature: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
}

/// A persisted pool wallet record. `private_key_cipher` holds the
/// `"<hex iv>:<hex ciphertext>"` wire format produced by
/// [`crate::cipher::Cipher::to_wire_format`]; callers decrypt through
/// [`crate::cipher::Cipher`] — this type never exposes a decrypted keypair
/// itself. The orchestrator borrows keypairs for the duration of a route and
/// never persists them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWallet {
    pub public_key: PublicKey,
    #[serde(rename = "private_key")]
    pub private_key_cipher: String,
    pub status: WalletStatus,
    pub is_active: bool,
    pub balance: u64,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub transaction_history: Vec<TransactionHistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_timestamp: Option<DateTime<Utc>>,
}

impl StoredWallet {
    pub fn new(public_key: PublicKey, private_key_cipher: String) -> Self {
        Self {
            public_key,
            private_key_cipher,
            status: WalletStatus::Available,
            is_active: true,
            balance: 0,
            created_at: Utc::now(),
            last_used: None,
            usage_count: 0,
            transaction_history: Vec::new(),
            error_message: None,
            error_timestamp: None,
        }
    }
}

/// Aggregate counts returned by `get_wallet_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub available: u64,
    pub in_use: u64,
    pub depleted: u64,
    pub error: u64,
    pub total_balance: u64,
}

/// Filters accepted by `cleanup_wallets`. All provided filters
/// combine with AND; an absent field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct CleanupFilter {
    pub older_than_days: Option<u32>,
    pub max_usage: Option<u64>,
    pub zero_balance: Option<bool>,
}
