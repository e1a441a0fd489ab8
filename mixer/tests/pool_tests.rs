use std::sync::Arc;

use tos_mixer::cipher::Cipher;
use tos_mixer::pool::{CleanupFilter, InMemoryWalletStore, WalletPoolManager, WalletStore};

fn manager() -> WalletPoolManager {
    let store: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
    let cipher = Cipher::new("pool-integration-secret").unwrap();
    WalletPoolManager::new(store, cipher)
}

#[tokio::test]
async fn generated_wallets_are_immediately_reservable() {
    let mgr = manager();
    let generated = mgr.generate_wallets(10).await.unwrap();
    assert_eq!(generated.len(), 10);

    let reserved = mgr.reserve_wallets_for_mixing(6, &[]).await.unwrap();
    assert_eq!(reserved.len(), 6);

    let stats = mgr.get_wallet_stats().await.unwrap();
    assert_eq!(stats.in_use, 6);
    assert_eq!(stats.available, 4);
}

#[tokio::test]
async fn fix_wallet_pool_regenerates_below_threshold() {
    let mgr = manager();
    mgr.generate_wallets(3).await.unwrap();

    let (checked, marked_error, regenerated) = mgr.fix_wallet_pool(5).await.unwrap();
    assert_eq!(checked, 3);
    assert_eq!(marked_error, 0);
    assert!(regenerated);

    let stats = mgr.get_wallet_stats().await.unwrap();
    assert_eq!(stats.available, 5);
}

#[tokio::test]
async fn fix_wallet_pool_leaves_a_healthy_pool_untouched() {
    let mgr = manager();
    mgr.generate_wallets(10).await.unwrap();

    let (_, _, regenerated) = mgr.fix_wallet_pool(5).await.unwrap();
    assert!(!regenerated);

    let stats = mgr.get_wallet_stats().await.unwrap();
    assert_eq!(stats.available, 10);
}

#[tokio::test]
async fn cleanup_wallets_combines_filters_with_and() {
    let mgr = manager();
    mgr.generate_wallets(5).await.unwrap();

    // None of the fresh wallets have nonzero usage, so a max_usage-only
    // filter matches everything; combined with zero_balance it still does,
    // since freshly generated wallets start at balance 0.
    let deleted = mgr
        .cleanup_wallets(CleanupFilter {
            older_than_days: None,
            max_usage: Some(0),
            zero_balance: Some(true),
        })
        .await
        .unwrap();
    assert_eq!(deleted, 5);

    let stats = mgr.get_wallet_stats().await.unwrap();
    assert_eq!(stats.available, 0);
}

#[tokio::test]
async fn all_wallets_survive_round_trip_decryption() {
    let mgr = manager();
    let generated = mgr.generate_wallets(4).await.unwrap();
    let all = mgr.all_wallets().await.unwrap();

    assert_eq!(all.len(), 4);
    let decrypted_keys: std::collections::HashSet<_> =
        all.into_iter().filter_map(|(_, kp)| kp.map(|k| k.public_key())).collect();
    let generated_keys: std::collections::HashSet<_> =
        generated.into_iter().map(|kp| kp.public_key()).collect();
    assert_eq!(decrypted_keys, generated_keys);
}

#[tokio::test]
async fn reserving_excluded_wallets_skips_them() {
    let mgr = manager();
    let generated = mgr.generate_wallets(3).await.unwrap();
    let excluded = generated[0].public_key();

    let reserved = mgr.reserve_wallets_for_mixing(2, &[excluded]).await.unwrap();
    assert!(reserved.iter().all(|(record, _)| record.public_key != excluded));
}

#[tokio::test]
async fn wrong_master_secret_cannot_validate_existing_wallets() {
    let store: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
    let writer = WalletPoolManager::new(store.clone(), Cipher::new("secret-one").unwrap());
    writer.generate_wallets(2).await.unwrap();

    let reader = WalletPoolManager::new(store, Cipher::new("secret-two").unwrap());
    let result = reader.get_available_wallets(2, &[]).await;
    assert!(result.is_err());
}

