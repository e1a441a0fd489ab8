mod parallel;
mod sequential;

use log::{info, warn};

use mixer_common::crypto::random::random_delay_ms;
use mixer_common::crypto::{Keypair, PublicKey, Signature};

use crate::config::MixerConfig;
use crate::error::{OrchestratorError, PoolError};
use crate::pool::WalletPoolManager;
use crate::recovery::{sweep_to_source, RecoveryOutcome};
use crate::route::{plan_routes, MixingRoute};
use crate::transport::Connection;

const MAX_HOP_DELAY_MS: u64 = 200;

/// Outcome of mixing funds to one destination.
#[derive(Debug)]
pub struct MixingResult {
    pub success: bool,
    pub destination: PublicKey,
    pub amount: u64,
    pub transaction_signatures: Vec<Signature>,
    pub fee_funding_signatures: Vec<Signature>,
    pub error: Option<String>,
    pub used_wallet_ids: Vec<PublicKey>,
    pub recovery: Option<RecoveryOutcome>,
}

/// Executes a set of mixing routes end to end. Holds no
/// mutable state of its own; all mutation goes through `pool` and `connection`.
pub struct MixerOrchestrator {
    pool: WalletPoolManager,
    connection: Box<dyn Connection>,
    config: MixerConfig,
}

impl MixerOrchestrator {
    pub fn new(pool: WalletPoolManager, connection: Box<dyn Connection>, config: MixerConfig) -> Self {
        Self {
            pool,
            connection,
            config,
        }
    }

    pub fn pool(&self) -> &WalletPoolManager {
        &self.pool
    }

    /// Route funds from `source` to each of `destinations`, in equal shares
    /// of `min(requested_total, source's spendable balance)`, via
    /// `config.intermediate_wallet_count` hops each. `requested_total` is the
    /// caller-specified spend cap in base units; pass `u64::MAX` to spend
    /// everything `source` can transfer.
    pub async fn mix_funds(
        &self,
        source: &Keypair,
        destinations: &[PublicKey],
        fee_funding_wallet: Option<&Keypair>,
        requested_total: u64,
    ) -> Result<Vec<MixingResult>, OrchestratorError> {
        self.validate_preconditions(source, destinations, fee_funding_wallet)
            .await?;

        let available = self
            .connection
            .max_transferable(&source.public_key(), self.config.priority_fee)
            .await?;
        let total = requested_total.min(available);
        let per_destination = total / destinations.len() as u64;
        if per_destination == 0 {
            return Err(OrchestratorError::ZeroPerDestination);
        }

        let routes = plan_routes(
            &self.pool,
            source,
            destinations,
            per_destination,
            self.config.intermediate_wallet_count,
        )
        .await?;

        let fee_funding_signatures = self.pre_fund_intermediates(&routes, fee_funding_wallet).await;

        let total_hops = self.config.intermediate_wallet_count + 1;
        let hop_delay_ms = if self.config.parallel_mode {
            0
        } else {
            let budget = random_delay_ms(self.config.min_delay_ms, self.config.max_delay_ms);
            (budget / (total_hops as u64 - 1).max(1)).min(MAX_HOP_DELAY_MS)
        };

        let mut results = Vec::with_capacity(routes.len());
        let mut all_used_wallet_ids = Vec::new();
        for route in routes {
            all_used_wallet_ids.extend(route.intermediates.iter().map(|kp| kp.public_key()));

            let result = self
                .execute_one_route(&route, hop_delay_ms, fee_funding_wallet, fee_funding_signatures.clone())
                .await;
            results.push(result);
        }

        // Released together once every route has run, win or lose, rather
        // than as each route finishes.
        self.pool
            .release_wallets(&all_used_wallet_ids)
            .await
            .map_err(OrchestratorError::Pool)?;

        Ok(results)
    }

    async fn validate_preconditions(
        &self,
        source: &Keypair,
        destinations: &[PublicKey],
        fee_funding_wallet: Option<&Keypair>,
    ) -> Result<(), OrchestratorError> {
        if destinations.is_empty() {
            return Err(crate::error::RouteError::NoDestinations.into());
        }
        if self.config.intermediate_wallet_count == 0 {
            return Err(crate::error::RouteError::ZeroHops.into());
        }

        let fee = self.connection.estimate_transaction_fee(self.config.priority_fee);
        let source_balance = self.connection.get_balance(&source.public_key()).await?;
        let rent_exemption = self.connection.get_minimum_balance_for_rent_exemption().await?;
        let need = rent_exemption + fee * destinations.len() as u64;
        if source_balance < need {
            return Err(OrchestratorError::SourceInsufficient {
                need,
                have: source_balance,
            });
        }

        let required_wallets = destinations.len() * self.config.intermediate_wallet_count;
        let stats = self.pool.get_wallet_stats().await.map_err(OrchestratorError::Pool)?;
        if (stats.available as usize) < required_wallets {
            return Err(OrchestratorError::Pool(PoolError::Insufficient {
                requested: required_wallets,
                found: stats.available as usize,
            }));
        }

        if let Some(fee_wallet) = fee_funding_wallet {
            let fee_wallet_balance = self.connection.get_balance(&fee_wallet.public_key()).await?;
            let need = fee * destinations.len() as u64 * (self.config.intermediate_wallet_count as u64 + 1);
            warn!("fee wallet requirement {need} is a lower bound; pre-funding only skips hops already holding a fee's worth, so actual spend may exceed it");
            if fee_wallet_balance < need {
                return Err(OrchestratorError::FeeWalletInsufficient {
                    need,
                    have: fee_wallet_balance,
                });
            }
        }

        Ok(())
    }

    /// Pre-fund each unique intermediate across all routes with exactly one
    /// transaction fee, skipping any that already hold enough.
    async fn pre_fund_intermediates(
        &self,
        routes: &[MixingRoute],
        fee_funding_wallet: Option<&Keypair>,
    ) -> Vec<Signature> {
        let Some(fee_wallet) = fee_funding_wallet else {
            return Vec::new();
        };
        let fee = self.connection.estimate_transaction_fee(self.config.priority_fee);

        let mut signatures = Vec::new();
        for route in routes {
            for intermediate in &route.intermediates {
                let intermediate_pk = intermediate.public_key();
                let balance = self.connection.get_balance(&intermediate_pk).await.unwrap_or(0);
                if balance >= fee {
                    continue;
                }
                let instruction = crate::transport::TransferInstruction {
                    from: fee_wallet,
                    to: &intermediate_pk,
                    amount: fee,
                    priority_fee: self.config.priority_fee,
                    fee_payer: None,
                };
                match self.connection.send_transaction(&instruction).await {
                    Ok(sig) => signatures.push(sig),
                    Err(e) => warn!("fee pre-funding for {intermediate_pk} failed: {e}"),
                }
            }
        }
        signatures
    }

    async fn execute_one_route(
        &self,
        route: &MixingRoute,
        hop_delay_ms: u64,
        fee_funding_wallet: Option<&Keypair>,
        fee_funding_signatures: Vec<Signature>,
    ) -> MixingResult {
        let used_wallet_ids: Vec<PublicKey> =
            route.intermediates.iter().map(|kp| kp.public_key()).collect();

        let (mut success, mut signatures, mut error) = if self.config.parallel_mode {
            parallel::execute_route(
                &self.pool,
                self.connection.as_ref(),
                &route.source,
                &route.intermediates,
                route.destination,
                route.amount,
                self.config.priority_fee,
                fee_funding_wallet,
                self.config.balance_check_timeout_ms,
            )
            .await
        } else {
            sequential::execute_route(
                &self.pool,
                self.connection.as_ref(),
                &route.source,
                &route.intermediates,
                route.destination,
                route.amount,
                self.config.priority_fee,
                fee_funding_wallet,
                hop_delay_ms,
            )
            .await
        };

        if !success && self.config.parallel_mode {
            info!(
                "parallel route to {} failed ({error:?}); falling back to sequential",
                route.destination
            );
            let fallback = sequential::execute_route(
                &self.pool,
                self.connection.as_ref(),
                &route.source,
                &route.intermediates,
                route.destination,
                route.amount,
                self.config.priority_fee,
                fee_funding_wallet,
                hop_delay_ms,
            )
            .await;
            success = fallback.0;
            signatures = fallback.1;
            error = fallback.2;
        }

        let recovery = if success {
            None
        } else {
            Some(
                sweep_to_source(
                    &self.pool,
                    self.connection.as_ref(),
                    &route.source.public_key(),
                    &route.intermediates,
                    self.config.priority_fee,
                )
                .await,
            )
        };

        MixingResult {
            success,
            destination: route.destination,
            amount: route.amount,
            transaction_signatures: signatures,
            fee_funding_signatures,
            error,
            used_wallet_ids,
            recovery,
        }
    }
}
