pub mod cipher;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod recovery;
pub mod route;
pub mod transport;

use std::sync::Arc;

use mixer_common::crypto::{Keypair, PublicKey};

use config::{EnvSettings, MixerConfig, LAMPORTS_PER_UNIT};
use error::MixerError;
use orchestrator::{MixerOrchestrator, MixingResult};
use pool::{MongoWalletStore, WalletPoolManager};
use transport::RpcConnection;

/// Summary returned by [`run_mixer`].
pub struct MixerRunSummary {
    pub success_count: usize,
    pub total_routes: usize,
    pub results: Vec<MixingResult>,
}

/// The bot-facing entry point: connect to the configured pool and chain,
/// then mix up to `total_amount_sol` (whole coins, converted to base units
/// here) of `funding_keypair`'s spendable balance across `destinations`.
/// The actual amount moved is `min(total_amount_sol, max_transferable)`.
pub async fn run_mixer(
    env: &EnvSettings,
    config: MixerConfig,
    funding_keypair: &Keypair,
    fee_funding_keypair: Option<&Keypair>,
    total_amount_sol: f64,
    destinations: &[PublicKey],
) -> Result<MixerRunSummary, MixerError> {
    let cipher = cipher::Cipher::new(&env.encryption_secret)
        .map_err(error::PoolError::Cipher)
        .map_err(MixerError::Pool)?;
    let store = Arc::new(
        MongoWalletStore::connect(&env.mongodb_uri, &env.database_name)
            .await
            .map_err(error::PoolError::Store)
            .map_err(MixerError::Pool)?,
    );
    let pool = WalletPoolManager::new(store, cipher);
    pool.connect().await.map_err(error::PoolError::Store).map_err(MixerError::Pool)?;

    let connection = RpcConnection::new(&env.rpc_endpoint)
        .map_err(error::OrchestratorError::Transport)
        .map_err(MixerError::Orchestrator)?;

    let requested_total = (total_amount_sol * LAMPORTS_PER_UNIT as f64).round() as u64;

    let orchestrator = MixerOrchestrator::new(pool, Box::new(connection), config);
    let outcome = orchestrator
        .mix_funds(funding_keypair, destinations, fee_funding_keypair, requested_total)
        .await;

    let _ = orchestrator.pool().disconnect().await;
    let results = outcome?;

    let success_count = results.iter().filter(|r| r.success).count();
    Ok(MixerRunSummary {
        success_count,
        total_routes: results.len(),
        results,
    })
}
