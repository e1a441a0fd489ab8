use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mixer_common::crypto::PublicKey;

use super::model::{CleanupFilter, PoolStats, StoredWallet, TransactionHistoryEntry};

/// The abstract persistence contract a wallet pool backend must satisfy:
///
/// - a uniqueness constraint on `public_key`
/// - an atomic find-and-update-many scoped to a multi-document transaction
///   (see [`WalletStore::reserve`])
/// - filter + sort + limit reads
///
/// Any document store meeting this contract may back the pool. This repo
/// ships one production adapter, [`super::mongo::MongoWalletStore`]; tests
/// use [`super::memory::InMemoryWalletStore`] instead of a live database.
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create the indexes this store relies on: unique on `public_key`,
    /// non-unique on `status`, `is_active`, `balance`, `usage_count`,
    /// `created_at`.
    async fn ensure_indexes(&self) -> anyhow::Result<()>;

    /// Bulk-insert freshly generated wallets, returning them as stored.
    async fn insert_many(&self, wallets: Vec<StoredWallet>) -> anyhow::Result<Vec<StoredWallet>>;

    /// Read up to `limit` wallets with `status = available, is_active =
    /// true`, excluding `exclude`, ordered by `(usage_count asc, last_used
    /// asc)` to spread wear.
    async fn find_available(
        &self,
        limit: usize,
        exclude: &[PublicKey],
    ) -> anyhow::Result<Vec<StoredWallet>>;

    /// Atomically transition exactly the wallets in `candidates` that are
    /// still `available` to `in_use`, bumping `usage_count` and `last_used`,
    /// within a single multi-document transaction. Returns the public keys
    /// that were actually transitioned — callers must treat a short result
    /// as a partial reservation and release it.
    async fn reserve(
        &self,
        candidates: &[PublicKey],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PublicKey>>;

    /// Transition wallets to `error` with an attached message and timestamp,
    /// as part of the self-heal path.
    async fn mark_error(
        &self,
        public_keys: &[PublicKey],
        message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Flip `status` back to `available` for the given wallets. Does not
    /// touch `usage_count` or `is_active`.
    async fn release(&self, public_keys: &[PublicKey]) -> anyhow::Result<()>;

    /// Set `balance`; `status` becomes `depleted` when `balance == 0`,
    /// `available` otherwise.
    async fn update_balance(&self, public_key: &PublicKey, balance: u64) -> anyhow::Result<()>;

    /// Append one entry to `transaction_history`.
    async fn record_transaction(
        &self,
        public_key: &PublicKey,
        entry: TransactionHistoryEntry,
    ) -> anyhow::Result<()>;

    /// Fetch full records for a set of public keys, in any order.
    async fn get_by_public_keys(&self, public_keys: &[PublicKey]) -> anyhow::Result<Vec<StoredWallet>>;

    /// Aggregate counts per status plus total balance.
    async fn stats(&self) -> anyhow::Result<PoolStats>;

    /// Bulk-delete records matching all provided filters. Returns the number
    /// of deleted records.
    async fn cleanup(&self, filter: &CleanupFilter) -> anyhow::Result<u64>;

    /// Delete every record in the collection.
    async fn delete_all(&self) -> anyhow::Result<u64>;

    /// Fetch every record regardless of status, for operator tooling.
    async fn list_all(&self) -> anyhow::Result<Vec<StoredWallet>>;

    /// Release any connection resources held by the store. Default no-op;
    /// overridden by stores with an explicit teardown step.
    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
