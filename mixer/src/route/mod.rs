use mixer_common::crypto::random::{amount_jitter, crypto_shuffle};
use mixer_common::crypto::{Keypair, PublicKey};

use crate::error::RouteError;
use crate::pool::WalletPoolManager;

/// One planned path from the funding wallet to a destination, with `K`
/// reserved intermediates.
pub struct MixingRoute {
    pub source: Keypair,
    pub intermediates: Vec<Keypair>,
    pub destination: PublicKey,
    pub amount: u64,
}

/// Plans `destinations.len()` routes, reserving `destinations.len() *
/// intermediate_wallet_count` intermediates from the pool in one atomic
/// call. A reservation failure leaves no wallets committed — the pool
/// manager's own atomicity guarantees this.
pub async fn plan_routes(
    pool: &WalletPoolManager,
    source: &Keypair,
    destinations: &[PublicKey],
    base_amount: u64,
    intermediate_wallet_count: usize,
) -> Result<Vec<MixingRoute>, RouteError> {
    if destinations.is_empty() {
        return Err(RouteError::NoDestinations);
    }
    if intermediate_wallet_count == 0 {
        return Err(RouteError::ZeroHops);
    }

    let total_intermediates = destinations.len() * intermediate_wallet_count;
    let reserved = pool
        .reserve_wallets_for_mixing(total_intermediates, &[])
        .await?;

    let mut intermediates: Vec<Keypair> = reserved.into_iter().map(|(_, kp)| kp).collect();

    let mut routes: Vec<MixingRoute> = destinations
        .iter()
        .map(|destination| {
            let hop = intermediates.split_off(intermediates.len() - intermediate_wallet_count);
            MixingRoute {
                source: source.clone(),
                intermediates: hop,
                destination: *destination,
                amount: jittered_amount(base_amount),
            }
        })
        .collect();

    crypto_shuffle(&mut routes);
    Ok(routes)
}

/// `amount + jitter(amount)`, floored at 1 so a route is never planned with
/// a zero or negative amount.
fn jittered_amount(base_amount: u64) -> u64 {
    let jitter = amount_jitter(base_amount);
    (base_amount as i64 + jitter).max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Cipher;
    use crate::pool::InMemoryWalletStore;
    use std::sync::Arc;

    async fn seeded_pool(wallet_count: usize) -> WalletPoolManager {
        let store = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        let manager = WalletPoolManager::new(store, cipher);
        manager.generate_wallets(wallet_count).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn plans_one_route_per_destination_with_k_intermediates() {
        let pool = seeded_pool(8).await;
        let source = Keypair::generate();
        let destinations = vec![Keypair::generate().public_key(), Keypair::generate().public_key()];

        let routes = plan_routes(&pool, &source, &destinations, 1_000_000, 4)
            .await
            .unwrap();

        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert_eq!(route.intermediates.len(), 4);
        }
    }

    #[tokio::test]
    async fn insufficient_pool_commits_nothing() {
        let pool = seeded_pool(4).await;
        let source = Keypair::generate();
        let destinations = vec![Keypair::generate().public_key(), Keypair::generate().public_key()];

        let result = plan_routes(&pool, &source, &destinations, 1_000_000, 4).await;
        assert!(result.is_err());

        let stats = pool.get_wallet_stats().await.unwrap();
        assert_eq!(stats.available, 4);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn rejects_zero_hops_and_empty_destinations() {
        let pool = seeded_pool(4).await;
        let source = Keypair::generate();
        let destination = Keypair::generate().public_key();

        assert!(matches!(
            plan_routes(&pool, &source, &[], 1_000, 2).await,
            Err(RouteError::NoDestinations)
        ));
        assert!(matches!(
            plan_routes(&pool, &source, &[destination], 1_000, 0).await,
            Err(RouteError::ZeroHops)
        ));
    }
}
