mod rate_limit;
mod rpc;
mod simulated;

pub use rate_limit::RateLimiter;
pub use rpc::RpcConnection;
pub use simulated::SimulatedConnection;

use async_trait::async_trait;

use mixer_common::crypto::{Keypair, PublicKey, Signature};

use crate::config::{BASE_FEE, RENT_EXEMPTION_MINIMUM, SAFETY_BUFFER};
use crate::error::TransportError;

/// Confirmation status returned by [`Connection::wait_for_confirmation`].
/// `Expired`/`NetworkError` drive distinct adaptive backoff classes; `Other`
/// falls back to default exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Expired,
    NetworkError,
    Other,
}

/// A single transfer instruction: `amount` base units from `from` to `to`,
/// optionally fee-paid by a distinct `fee_payer`.
pub struct TransferInstruction<'a> {
    pub from: &'a Keypair,
    pub to: &'a PublicKey,
    pub amount: u64,
    pub priority_fee: u64,
    pub fee_payer: Option<&'a Keypair>,
}

/// The abstract connection/transport contract. One production
/// implementation, [`RpcConnection`], talks JSON-RPC over HTTP; tests use
/// [`SimulatedConnection`] to avoid a live chain dependency.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn get_balance(&self, pk: &PublicKey) -> Result<u64, TransportError>;

    async fn batch_get_balances(&self, pks: &[PublicKey]) -> Result<Vec<u64>, TransportError> {
        let mut balances = Vec::with_capacity(pks.len());
        for pk in pks {
            balances.push(self.get_balance(pk).await?);
        }
        Ok(balances)
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32], TransportError>;

    async fn get_minimum_balance_for_rent_exemption(&self) -> Result<u64, TransportError> {
        Ok(RENT_EXEMPTION_MINIMUM)
    }

    /// `base_fee (5000) + priority_fee`.
    fn estimate_transaction_fee(&self, priority_fee: u64) -> u64 {
        BASE_FEE + priority_fee
    }

    /// `balance - estimated_fee - rent_exemption - safety_buffer`, floored at
    /// 0. The only supported way to size an outgoing transfer when the
    /// sender pays its own fees.
    async fn max_transferable(&self, pk: &PublicKey, priority_fee: u64) -> Result<u64, TransportError> {
        let balance = self.get_balance(pk).await?;
        let fee = self.estimate_transaction_fee(priority_fee);
        let reserved = fee + RENT_EXEMPTION_MINIMUM + SAFETY_BUFFER;
        Ok(balance.saturating_sub(reserved))
    }

    async fn send_transaction(
        &self,
        instruction: &TransferInstruction<'_>,
    ) -> Result<Signature, TransportError>;

    async fn wait_for_confirmation(&self, signature: &Signature) -> ConfirmationOutcome;
}
