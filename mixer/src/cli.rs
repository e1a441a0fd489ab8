//! Operator tooling, separate from the bot-facing
//! [`crate::run_mixer`] entry point.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use mixer_common::crypto::PublicKey;

use crate::cipher::Cipher;
use crate::config::{EnvSettings, MIN_POOL_COUNT};
use crate::pool::{MongoWalletStore, WalletPoolManager};
use crate::transport::{Connection, RpcConnection, TransferInstruction};

#[derive(Parser)]
#[command(name = "tos-mixer")]
#[command(about = "Privacy-preserving fund-routing engine for TOS Network")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep every pool wallet to `destination`, for decommissioning.
    DrainWallets { destination: String },
    /// Validate all wallets, mark undecryptables as `error`, regenerate the
    /// pool if the available count falls below 1000.
    FixWalletPool,
}

/// Dispatches a CLI subcommand; returns the process exit code (0 success,
/// 1 generic failure).
pub async fn run(cli: Cli) -> i32 {
    let env = match EnvSettings::from_env() {
        Ok(env) => env,
        Err(e) => {
            error!("configuration error: {e}");
            return 1;
        }
    };

    let result = match cli.command {
        Commands::DrainWallets { destination } => drain_wallets(&env, &destination).await,
        Commands::FixWalletPool => fix_wallet_pool(&env).await,
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

async fn build_pool(env: &EnvSettings) -> anyhow::Result<WalletPoolManager> {
    let cipher = Cipher::new(&env.encryption_secret)?;
    let store = Arc::new(MongoWalletStore::connect(&env.mongodb_uri, &env.database_name).await?);
    let pool = WalletPoolManager::new(store, cipher);
    pool.connect().await?;
    Ok(pool)
}

async fn drain_wallets(env: &EnvSettings, destination: &str) -> anyhow::Result<()> {
    let destination: PublicKey = destination.parse()?;
    let pool = build_pool(env).await?;
    let connection = RpcConnection::new(&env.rpc_endpoint)?;

    let wallets = pool.all_wallets().await?;
    let mut drained = 0usize;
    for (record, keypair) in wallets {
        let Some(keypair) = keypair else {
            continue;
        };
        let transferable = connection.max_transferable(&record.public_key, 0).await?;
        if transferable == 0 {
            continue;
        }
        let instruction = TransferInstruction {
            from: &keypair,
            to: &destination,
            amount: transferable,
            priority_fee: 0,
            fee_payer: None,
        };
        connection.send_transaction(&instruction).await?;
        drained += 1;
    }

    info!("drained {drained} wallets to {destination}");
    pool.disconnect().await?;
    Ok(())
}

async fn fix_wallet_pool(env: &EnvSettings) -> anyhow::Result<()> {
    let pool = build_pool(env).await?;
    let (checked, marked_error, regenerated) = pool.fix_wallet_pool(MIN_POOL_COUNT).await?;
    info!(
        "checked {checked} wallets, marked {marked_error} as error, regenerated pool: {regenerated}"
    );
    pool.disconnect().await?;
    Ok(())
}
