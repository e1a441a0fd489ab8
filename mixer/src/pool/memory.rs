use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use mixer_common::crypto::PublicKey;

use super::model::{CleanupFilter, PoolStats, StoredWallet, TransactionHistoryEntry, WalletStatus};
use super::store::WalletStore;

/// In-memory `WalletStore` used by orchestrator/pool tests in place of a
/// live MongoDB. Reservation is serialized through a single mutex, which is
/// sufficient to exercise the "no overlapping wallet sets" guarantee without
/// a real transaction.
#[derive(Default)]
pub struct InMemoryWalletStore {
    wallets: Mutex<HashMap<PublicKey, StoredWallet>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn insert_many(&self, wallets: Vec<StoredWallet>) -> anyhow::Result<Vec<StoredWallet>> {
        let mut store = self.wallets.lock().await;
        for wallet in &wallets {
            store.insert(wallet.public_key, wallet.clone());
        }
        Ok(wallets)
    }

    async fn find_available(
        &self,
        limit: usize,
        exclude: &[PublicKey],
    ) -> anyhow::Result<Vec<StoredWallet>> {
        let store = self.wallets.lock().await;
        let mut candidates: Vec<StoredWallet> = store
            .values()
            .filter(|w| {
                w.status == WalletStatus::Available
                    && w.is_active
                    && !exclude.contains(&w.public_key)
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.usage_count
                .cmp(&b.usage_count)
                .then(a.last_used.cmp(&b.last_used))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn reserve(
        &self,
        candidates: &[PublicKey],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PublicKey>> {
        let mut store = self.wallets.lock().await;
        let mut reserved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(wallet) = store.get_mut(candidate) {
                if wallet.status == WalletStatus::Available && wallet.is_active {
                    wallet.status = WalletStatus::InUse;
                    wallet.last_used = Some(now);
                    wallet.usage_count += 1;
                    reserved.push(*candidate);
                }
            }
        }
        Ok(reserved)
    }

    async fn mark_error(
        &self,
        public_keys: &[PublicKey],
        message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut store = self.wallets.lock().await;
        for pk in public_keys {
            if let Some(wallet) = store.get_mut(pk) {
                wallet.status = WalletStatus::Error;
                wallet.error_message = Some(message.to_string());
                wallet.error_timestamp = Some(now);
            }
        }
        Ok(())
    }

    async fn release(&self, public_keys: &[PublicKey]) -> anyhow::Result<()> {
        let mut store = self.wallets.lock().await;
        for pk in public_keys {
            if let Some(wallet) = store.get_mut(pk) {
                wallet.status = WalletStatus::Available;
            }
        }
        Ok(())
    }

    async fn update_balance(&self, public_key: &PublicKey, balance: u64) -> anyhow::Result<()> {
        let mut store = self.wallets.lock().await;
        if let Some(wallet) = store.get_mut(public_key) {
            wallet.balance = balance;
            wallet.status = if balance == 0 {
                WalletStatus::Depleted
            } else {
                WalletStatus::Available
            };
        }
        Ok(())
    }

    async fn record_transaction(
        &self,
        public_key: &PublicKey,
        entry: TransactionHistoryEntry,
    ) -> anyhow::Result<()> {
        let mut store = self.wallets.lock().await;
        if let Some(wallet) = store.get_mut(public_key) {
            wallet.transaction_history.push(entry);
        }
        Ok(())
    }

    async fn get_by_public_keys(
        &self,
        public_keys: &[PublicKey],
    ) -> anyhow::Result<Vec<StoredWallet>> {
        let store = self.wallets.lock().await;
        Ok(public_keys
            .iter()
            .filter_map(|pk| store.get(pk).cloned())
            .collect())
    }

    async fn stats(&self) -> anyhow::Result<PoolStats> {
        let store = self.wallets.lock().await;
        let mut stats = PoolStats::default();
        for wallet in store.values() {
            stats.total_balance += wallet.balance;
            match wallet.status {
                WalletStatus::Available => stats.available += 1,
                WalletStatus::InUse => stats.in_use += 1,
                WalletStatus::Depleted => stats.depleted += 1,
                WalletStatus::Error => stats.error += 1,
            }
        }
        Ok(stats)
    }

    async fn cleanup(&self, filter: &CleanupFilter) -> anyhow::Result<u64> {
        let mut store = self.wallets.lock().await;
        let cutoff = filter
            .older_than_days
            .map(|days| Utc::now() - chrono::Duration::days(days as i64));

        let to_remove: Vec<PublicKey> = store
            .values()
            .filter(|w| {
                cutoff.map(|c| w.created_at < c).unwrap_or(true)
                    && filter
                        .max_usage
                        .map(|max| w.usage_count <= max)
                        .unwrap_or(true)
                    && filter
                        .zero_balance
                        .map(|zero| !zero || w.balance == 0)
                        .unwrap_or(true)
            })
            .map(|w| w.public_key)
            .collect();

        for pk in &to_remove {
            store.remove(pk);
        }
        Ok(to_remove.len() as u64)
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let mut store = self.wallets.lock().await;
        let count = store.len() as u64;
        store.clear();
        Ok(count)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<StoredWallet>> {
        let store = self.wallets.lock().await;
        Ok(store.values().cloned().collect())
    }
}
