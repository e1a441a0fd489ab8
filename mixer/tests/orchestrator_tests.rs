use std::sync::Arc;

use mixer_common::crypto::Keypair;
use tos_mixer::cipher::Cipher;
use tos_mixer::config::MixerConfig;
use tos_mixer::orchestrator::MixerOrchestrator;
use tos_mixer::pool::{InMemoryWalletStore, WalletPoolManager, WalletStore};
use tos_mixer::transport::{Connection, SimulatedConnection};

fn empty_pool() -> WalletPoolManager {
    let store: Arc<dyn WalletStore> = Arc::new(InMemoryWalletStore::new());
    let cipher = Cipher::new("integration-test-secret").unwrap();
    WalletPoolManager::new(store, cipher)
}

#[tokio::test]
async fn single_destination_single_hop_mix_succeeds() {
    let pool = empty_pool();
    pool.generate_wallets(1).await.unwrap();

    let source = Keypair::generate();
    let destination = Keypair::generate().public_key();
    let conn = SimulatedConnection::new();
    conn.set_balance(&source.public_key(), 10_000_000);

    let config = MixerConfig {
        intermediate_wallet_count: 1,
        ..Default::default()
    };
    let orchestrator = MixerOrchestrator::new(pool, Box::new(conn), config);

    let results = orchestrator
        .mix_funds(&source, &[destination], None, u64::MAX)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "mix should succeed: {:?}", result.error);
    assert_eq!(result.destination, destination);
    assert_eq!(result.transaction_signatures.len(), 2);
}

#[tokio::test]
async fn insufficient_source_balance_is_rejected_at_validation() {
    let pool = empty_pool();
    pool.generate_wallets(2).await.unwrap();

    let source = Keypair::generate();
    let destination = Keypair::generate().public_key();
    let conn = SimulatedConnection::new();
    conn.set_balance(&source.public_key(), 10);

    let config = MixerConfig {
        intermediate_wallet_count: 2,
        ..Default::default()
    };
    let orchestrator = MixerOrchestrator::new(pool, Box::new(conn), config);

    let result = orchestrator.mix_funds(&source, &[destination], None, u64::MAX).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn empty_pool_fails_with_insufficient_pool_before_touching_chain() {
    let pool = empty_pool();
    let source = Keypair::generate();
    let destination = Keypair::generate().public_key();
    let conn = SimulatedConnection::new();
    conn.set_balance(&source.public_key(), 10_000_000);

    let config = MixerConfig {
        intermediate_wallet_count: 4,
        ..Default::default()
    };
    let orchestrator = MixerOrchestrator::new(pool, Box::new(conn), config);

    let result = orchestrator.mix_funds(&source, &[destination], None, u64::MAX).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn parallel_mode_single_destination_mix_succeeds() {
    let pool = empty_pool();
    pool.generate_wallets(1).await.unwrap();

    let source = Keypair::generate();
    let destination = Keypair::generate().public_key();
    let conn = SimulatedConnection::new();
    conn.set_balance(&source.public_key(), 10_000_000);

    let config = MixerConfig {
        intermediate_wallet_count: 1,
        parallel_mode: true,
        balance_check_timeout_ms: 1_000,
        ..Default::default()
    };
    let orchestrator = MixerOrchestrator::new(pool, Box::new(conn), config);

    let results = orchestrator
        .mix_funds(&source, &[destination], None, u64::MAX)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "parallel mix should succeed: {:?}", result.error);
    assert_eq!(result.destination, destination);
    assert_eq!(result.transaction_signatures.len(), 2);
}

#[tokio::test]
async fn two_destinations_reserve_disjoint_intermediate_sets() {
    let pool = empty_pool();
    pool.generate_wallets(4).await.unwrap();

    let source = Keypair::generate();
    let destinations = vec![Keypair::generate().public_key(), Keypair::generate().public_key()];
    let conn = SimulatedConnection::new();
    conn.set_balance(&source.public_key(), 20_000_000);

    let config = MixerConfig {
        intermediate_wallet_count: 2,
        ..Default::default()
    };
    let orchestrator = MixerOrchestrator::new(pool, Box::new(conn), config);

    let results = orchestrator
        .mix_funds(&source, &destinations, None, u64::MAX)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let all_wallet_ids: Vec<_> = results.iter().flat_map(|r| r.used_wallet_ids.clone()).collect();
    let unique: std::collections::HashSet<_> = all_wallet_ids.iter().collect();
    assert_eq!(unique.len(), all_wallet_ids.len(), "no wallet reused across routes");
}
