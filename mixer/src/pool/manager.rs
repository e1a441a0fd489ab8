use std::sync::Arc;

use chrono::Utc;

use mixer_common::crypto::{Keypair, PublicKey};

use crate::cipher::Cipher;
use crate::error::PoolError;

use super::model::{CleanupFilter, PoolStats, StoredWallet, TransactionHistoryEntry};
use super::store::WalletStore;

/// Oversampling factor applied before trial-decryption validation, so a
/// handful of corrupt records don't turn into a false `INSUFFICIENT_POOL`.
const READ_OVERSAMPLE_NUM: usize = 3;
const READ_OVERSAMPLE_DEN: usize = 2;
const RESERVE_OVERSAMPLE: usize = 2;

/// Public API over a pluggable [`WalletStore`] backend. Every public key
/// handed back to a caller has already round-tripped through
/// [`Cipher::decrypt`] — callers never see a wallet whose ciphertext is
/// corrupt.
pub struct WalletPoolManager {
    store: Arc<dyn WalletStore>,
    cipher: Cipher,
}

impl WalletPoolManager {
    pub fn new(store: Arc<dyn WalletStore>, cipher: Cipher) -> Self {
        Self { store, cipher }
    }

    pub async fn connect(&self) -> anyhow::Result<()> {
        self.store.ensure_indexes().await
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        self.store.disconnect().await
    }

    /// Generate `count` fresh wallets, encrypt their secret keys, and persist
    /// them. Returns the decrypted keypairs so the caller can use them
    /// immediately without a round-trip read.
    pub async fn generate_wallets(&self, count: usize) -> Result<Vec<Keypair>, PoolError> {
        let mut keypairs = Vec::with_capacity(count);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let keypair = Keypair::generate();
            let cipher_bytes = self.cipher.encrypt(&keypair)?;
            let wire = Cipher::to_wire_format(&cipher_bytes);
            records.push(StoredWallet::new(keypair.public_key(), wire));
            keypairs.push(keypair);
        }
        self.store
            .insert_many(records)
            .await
            .map_err(PoolError::Store)?;
        Ok(keypairs)
    }

    /// Trial-decrypt a stored record; `None` means the ciphertext failed to
    /// decrypt under the current master secret — a candidate for the
    /// self-heal `mark_error` path.
    pub fn validate_wallet_decryption(&self, record: &StoredWallet) -> Option<Keypair> {
        let bytes = Cipher::from_wire_format(&record.private_key_cipher).ok()?;
        self.cipher.decrypt(&bytes).ok()
    }

    /// Read up to `n` validated available wallets, oversampling by 1.5x to
    /// absorb decrypt failures.
    pub async fn get_available_wallets(
        &self,
        n: usize,
        exclude: &[PublicKey],
    ) -> Result<Vec<(StoredWallet, Keypair)>, PoolError> {
        let oversample = (n * READ_OVERSAMPLE_NUM).div_ceil(READ_OVERSAMPLE_DEN).max(n);
        let candidates = self
            .store
            .find_available(oversample, exclude)
            .await
            .map_err(PoolError::Store)?;

        let mut validated = Vec::with_capacity(n);
        let mut corrupt = Vec::new();
        for record in candidates {
            match self.validate_wallet_decryption(&record) {
                Some(keypair) => validated.push((record, keypair)),
                None => corrupt.push(record.public_key),
            }
            if validated.len() == n {
                break;
            }
        }
        if !corrupt.is_empty() {
            let _ = self
                .store
                .mark_error(&corrupt, "decrypt validation failed", Utc::now())
                .await;
        }

        if validated.len() < n {
            return Err(PoolError::Insufficient {
                requested: n,
                found: validated.len(),
            });
        }
        Ok(validated)
    }

    /// Atomically reserve `n` validated wallets for a mixing operation.
    /// Oversamples by 2x; any wallets reserved beyond what's needed, or that
    /// fail decryption after reservation, are released before returning.
    pub async fn reserve_wallets_for_mixing(
        &self,
        n: usize,
        exclude: &[PublicKey],
    ) -> Result<Vec<(StoredWallet, Keypair)>, PoolError> {
        let oversample = (n * RESERVE_OVERSAMPLE).max(n);
        let candidates = self
            .store
            .find_available(oversample, exclude)
            .await
            .map_err(PoolError::Store)?;
        let candidate_keys: Vec<PublicKey> = candidates.iter().map(|c| c.public_key).collect();

        let reserved_keys = self
            .store
            .reserve(&candidate_keys, Utc::now())
            .await
            .map_err(PoolError::Store)?;

        let reserved_records = self
            .store
            .get_by_public_keys(&reserved_keys)
            .await
            .map_err(PoolError::Store)?;

        let mut validated = Vec::with_capacity(n);
        let mut to_release = Vec::new();
        let mut corrupt = Vec::new();
        for record in reserved_records {
            if validated.len() >= n {
                to_release.push(record.public_key);
                continue;
            }
            match self.validate_wallet_decryption(&record) {
                Some(keypair) => validated.push((record, keypair)),
                None => corrupt.push(record.public_key),
            }
        }

        if !to_release.is_empty() {
            let _ = self.store.release(&to_release).await;
        }
        if !corrupt.is_empty() {
            let _ = self
                .store
                .mark_error(&corrupt, "decrypt validation failed", Utc::now())
                .await;
        }

        if validated.len() < n {
            let used: Vec<PublicKey> = validated.iter().map(|(r, _)| r.public_key).collect();
            let _ = self.store.release(&used).await;
            return Err(PoolError::Insufficient {
                requested: n,
                found: validated.len(),
            });
        }

        Ok(validated)
    }

    pub async fn release_wallets(&self, public_keys: &[PublicKey]) -> Result<(), PoolError> {
        self.store
            .release(public_keys)
            .await
            .map_err(PoolError::Store)
    }

    pub async fn update_wallet_balance(
        &self,
        public_key: &PublicKey,
        balance: u64,
    ) -> Result<(), PoolError> {
        self.store
            .update_balance(public_key, balance)
            .await
            .map_err(PoolError::Store)
    }

    pub async fn record_transaction(
        &self,
        public_key: &PublicKey,
        entry: TransactionHistoryEntry,
    ) -> Result<(), PoolError> {
        self.store
            .record_transaction(public_key, entry)
            .await
            .map_err(PoolError::Store)
    }

    pub async fn get_wallet_stats(&self) -> Result<PoolStats, PoolError> {
        self.store.stats().await.map_err(PoolError::Store)
    }

    pub async fn cleanup_wallets(&self, filter: CleanupFilter) -> Result<u64, PoolError> {
        self.store.cleanup(&filter).await.map_err(PoolError::Store)
    }

    /// Delete every wallet record and generate a fresh pool of `count`
    /// wallets. Not atomic across the delete/insert boundary — a crash
    /// mid-call can leave the pool empty.
    pub async fn regenerate_wallet_pool(&self, count: usize) -> Result<Vec<Keypair>, PoolError> {
        self.store.delete_all().await.map_err(PoolError::Store)?;
        self.generate_wallets(count).await
    }

    /// Every wallet record regardless of status, decrypted where possible.
    pub async fn all_wallets(&self) -> Result<Vec<(StoredWallet, Option<Keypair>)>, PoolError> {
        let records = self.store.list_all().await.map_err(PoolError::Store)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let keypair = self.validate_wallet_decryption(&record);
                (record, keypair)
            })
            .collect())
    }

    /// Trial-decrypt every wallet, mark undecryptables as `error`, and
    /// regenerate the pool if the available count falls below `min_count`.
    /// Returns `(checked, marked_error, regenerated)`.
    pub async fn fix_wallet_pool(&self, min_count: usize) -> Result<(usize, usize, bool), PoolError> {
        let records = self.store.list_all().await.map_err(PoolError::Store)?;
        let checked = records.len();

        let corrupt: Vec<PublicKey> = records
            .iter()
            .filter(|record| self.validate_wallet_decryption(record).is_none())
            .map(|record| record.public_key)
            .collect();
        if !corrupt.is_empty() {
            self.store
                .mark_error(&corrupt, "decrypt validation failed", Utc::now())
                .await
                .map_err(PoolError::Store)?;
        }

        let stats = self.get_wallet_stats().await?;
        let regenerated = (stats.available as usize) < min_count;
        if regenerated {
            self.regenerate_wallet_pool(min_count).await?;
        }

        Ok((checked, corrupt.len(), regenerated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::memory::InMemoryWalletStore;

    fn manager() -> WalletPoolManager {
        let store: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        WalletPoolManager::new(store, cipher)
    }

    #[tokio::test]
    async fn generate_then_reserve_round_trips() {
        let mgr = manager();
        let generated = mgr.generate_wallets(4).await.unwrap();
        assert_eq!(generated.len(), 4);

        let reserved = mgr.reserve_wallets_for_mixing(2, &[]).await.unwrap();
        assert_eq!(reserved.len(), 2);

        let stats = mgr.get_wallet_stats().await.unwrap();
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.available, 2);
    }

    #[tokio::test]
    async fn reserving_more_than_available_fails_without_partial_commit() {
        let mgr = manager();
        mgr.generate_wallets(2).await.unwrap();

        let result = mgr.reserve_wallets_for_mixing(5, &[]).await;
        assert!(matches!(result, Err(PoolError::Insufficient { .. })));

        let stats = mgr.get_wallet_stats().await.unwrap();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn release_returns_wallets_to_available() {
        let mgr = manager();
        mgr.generate_wallets(3).await.unwrap();
        let reserved = mgr.reserve_wallets_for_mixing(3, &[]).await.unwrap();
        let keys: Vec<PublicKey> = reserved.iter().map(|(r, _)| r.public_key).collect();

        mgr.release_wallets(&keys).await.unwrap();
        let stats = mgr.get_wallet_stats().await.unwrap();
        assert_eq!(stats.available, 3);
    }

    #[tokio::test]
    async fn regenerate_replaces_the_whole_pool() {
        let mgr = manager();
        mgr.generate_wallets(5).await.unwrap();
        let fresh = mgr.regenerate_wallet_pool(2).await.unwrap();
        assert_eq!(fresh.len(), 2);

        let stats = mgr.get_wallet_stats().await.unwrap();
        assert_eq!(stats.available, 2);
    }
}
