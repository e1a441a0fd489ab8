use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use mixer_common::crypto::PublicKey;

use super::model::{CleanupFilter, PoolStats, StoredWallet, TransactionHistoryEntry, WalletStatus};
use super::store::WalletStore;

/// MongoDB-backed implementation of the wallet pool's persistence contract.
/// Collection name is fixed to `mixer_wallets`.
pub struct MongoWalletStore {
    client: Client,
    collection: Collection<StoredWallet>,
}

impl MongoWalletStore {
    pub async fn connect(uri: &str, database_name: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let collection = client
            .database(database_name)
            .collection::<StoredWallet>(crate::config::DEFAULT_COLLECTION_NAME);
        Ok(Self { client, collection })
    }
}

#[async_trait]
impl WalletStore for MongoWalletStore {
    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique_public_key = IndexModel::builder()
            .keys(doc! { "public_key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let secondary = ["status", "is_active", "balance", "usage_count", "created_at"]
            .into_iter()
            .map(|field| IndexModel::builder().keys(doc! { field: 1 }).build());

        self.collection.create_index(unique_public_key).await?;
        for index in secondary {
            self.collection.create_index(index).await?;
        }
        Ok(())
    }

    async fn insert_many(&self, wallets: Vec<StoredWallet>) -> anyhow::Result<Vec<StoredWallet>> {
        if wallets.is_empty() {
            return Ok(wallets);
        }
        self.collection.insert_many(&wallets).await?;
        Ok(wallets)
    }

    async fn find_available(
        &self,
        limit: usize,
        exclude: &[PublicKey],
    ) -> anyhow::Result<Vec<StoredWallet>> {
        let excluded_bson = to_bson(&exclude.iter().map(|pk| pk.to_base58()).collect::<Vec<_>>())?;
        let filter = doc! {
            "status": "available",
            "is_active": true,
            "public_key": { "$nin": excluded_bson },
        };
        let options = FindOptions::builder()
            .sort(doc! { "usage_count": 1, "last_used": 1 })
            .limit(limit as i64)
            .build();

        let mut cursor = self.collection.find(filter).with_options(options).await?;
        let mut wallets = Vec::with_capacity(limit);
        while cursor.advance().await? {
            wallets.push(cursor.deserialize_current()?);
        }
        Ok(wallets)
    }

    async fn reserve(
        &self,
        candidates: &[PublicKey],
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PublicKey>> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let mut reserved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let filter = doc! {
                "public_key": candidate.to_base58(),
                "status": "available",
                "is_active": true,
            };
            let update = doc! {
                "$set": { "status": "in_use", "last_used": now },
                "$inc": { "usage_count": 1i64 },
            };
            let result = self
                .collection
                .update_one(filter, update)
                .session(&mut session)
                .await?;
            if result.modified_count == 1 {
                reserved.push(*candidate);
            }
        }

        session.commit_transaction().await?;
        Ok(reserved)
    }

    async fn mark_error(
        &self,
        public_keys: &[PublicKey],
        message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if public_keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = public_keys.iter().map(|pk| pk.to_base58()).collect();
        let filter = doc! { "public_key": { "$in": keys } };
        let update = doc! {
            "$set": {
                "status": "error",
                "error_message": message,
                "error_timestamp": now,
            }
        };
        self.collection.update_many(filter, update).await?;
        Ok(())
    }

    async fn release(&self, public_keys: &[PublicKey]) -> anyhow::Result<()> {
        if public_keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = public_keys.iter().map(|pk| pk.to_base58()).collect();
        let filter = doc! { "public_key": { "$in": keys } };
        let update = doc! { "$set": { "status": "available" } };
        self.collection.update_many(filter, update).await?;
        Ok(())
    }

    async fn update_balance(&self, public_key: &PublicKey, balance: u64) -> anyhow::Result<()> {
        let status = if balance == 0 {
            WalletStatus::Depleted
        } else {
            WalletStatus::Available
        };
        let status_str = to_bson(&status)?;
        let filter = doc! { "public_key": public_key.to_base58() };
        let update = doc! {
            "$set": { "balance": balance as i64, "status": status_str }
        };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    async fn record_transaction(
        &self,
        public_key: &PublicKey,
        entry: TransactionHistoryEntry,
    ) -> anyhow::Result<()> {
        let entry_bson = to_bson(&entry)?;
        let filter = doc! { "public_key": public_key.to_base58() };
        let update = doc! { "$push": { "transaction_history": entry_bson } };
        self.collection.update_one(filter, update).await?;
        Ok(())
    }

    async fn get_by_public_keys(
        &self,
        public_keys: &[PublicKey],
    ) -> anyhow::Result<Vec<StoredWallet>> {
        if public_keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = public_keys.iter().map(|pk| pk.to_base58()).collect();
        let filter = doc! { "public_key": { "$in": keys } };
        let mut cursor = self.collection.find(filter).await?;
        let mut wallets = Vec::with_capacity(public_keys.len());
        while cursor.advance().await? {
            wallets.push(cursor.deserialize_current()?);
        }
        Ok(wallets)
    }

    async fn stats(&self) -> anyhow::Result<PoolStats> {
        let pipeline = vec![doc! {
            "$group": {
                "_id": "$status",
                "count": { "$sum": 1 },
                "balance": { "$sum": "$balance" },
            }
        }];
        let mut cursor = self.collection.clone_with_type::<mongodb::bson::Document>().aggregate(pipeline).await?;
        let mut stats = PoolStats::default();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            let status = doc.get_str("_id").unwrap_or("");
            let count = doc.get_i32("count").unwrap_or(0) as u64;
            let balance = doc.get_i64("balance").unwrap_or(0) as u64;
            stats.total_balance += balance;
            match status {
                "available" => stats.available = count,
                "in_use" => stats.in_use = count,
                "depleted" => stats.depleted = count,
                "error" => stats.error = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn cleanup(&self, filter: &CleanupFilter) -> anyhow::Result<u64> {
        let mut query = doc! {};
        if let Some(days) = filter.older_than_days {
            let cutoff = Utc::now() - chrono::Duration::days(days as i64);
            query.insert("created_at", doc! { "$lt": cutoff });
        }
        if let Some(max_usage) = filter.max_usage {
            query.insert("usage_count", doc! { "$lte": max_usage as i64 });
        }
        if let Some(true) = filter.zero_balance {
            query.insert("balance", 0i64);
        }
        let result = self.collection.delete_many(query).await?;
        Ok(result.deleted_count)
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let result = self.collection.delete_many(doc! {}).await?;
        Ok(result.deleted_count)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<StoredWallet>> {
        let mut cursor = self.collection.find(doc! {}).await?;
        let mut wallets = Vec::new();
        while cursor.advance().await? {
            wallets.push(cursor.deserialize_current()?);
        }
        Ok(wallets)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        // The driver's connection pool is torn down when the last clone of
        // `self.client` is dropped; nothing else to flush.
        Ok(())
    }
}
