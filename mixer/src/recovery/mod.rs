use chrono::Utc;
use log::warn;

use mixer_common::crypto::{Keypair, PublicKey, Signature};

use crate::pool::{TransactionHistoryEntry, TransactionKind, WalletPoolManager};
use crate::transport::{Connection, TransferInstruction};

/// Outcome of sweeping a failed route's intermediates back to its source.
#[derive(Debug, Default, Clone)]
pub struct RecoveryOutcome {
    pub recovered_wallets: Vec<PublicKey>,
    pub lost_funds: u64,
    pub recovery_transactions: Vec<Signature>,
}

/// Best-effort sweep of a failed route's intermediates back to `source`.
/// Never raises: any per-wallet failure is folded into `lost_funds` and the
/// sweep continues with the next intermediate. Release back to `available`
/// is the caller's job, at the operation boundary.
pub async fn sweep_to_source(
    pool: &WalletPoolManager,
    connection: &dyn Connection,
    source: &PublicKey,
    intermediates: &[Keypair],
    priority_fee: u64,
) -> RecoveryOutcome {
    let mut outcome = RecoveryOutcome::default();

    for intermediate in intermediates {
        let public_key = intermediate.public_key();
        let balance = match connection.get_balance(&public_key).await {
            Ok(b) => b,
            Err(e) => {
                warn!("recovery: could not read balance for {public_key}: {e}");
                continue;
            }
        };
        if balance == 0 {
            continue;
        }

        let transferable = match connection.max_transferable(&public_key, priority_fee).await {
            Ok(amount) => amount,
            Err(e) => {
                warn!("recovery: could not size sweep for {public_key}: {e}");
                outcome.lost_funds += balance;
                continue;
            }
        };
        if transferable == 0 {
            outcome.lost_funds += balance;
            continue;
        }

        let instruction = TransferInstruction {
            from: intermediate,
            to: source,
            amount: transferable,
            priority_fee,
            fee_payer: None,
        };

        match connection.send_transaction(&instruction).await {
            Ok(signature) => {
                outcome.recovery_transactions.push(signature);
                outcome.recovered_wallets.push(public_key);

                let entry = TransactionHistoryEntry {
                    signature: signature.to_base58(),
                    kind: TransactionKind::Send,
                    amount: transferable,
                    timestamp: Utc::now(),
                    from_address: Some(public_key.to_base58()),
                    to_address: Some(source.to_base58()),
                };
                let _ = pool.record_transaction(&public_key, entry).await;
                let _ = pool.update_wallet_balance(&public_key, 0).await;
            }
            Err(e) => {
                warn!("recovery: sweep transfer from {public_key} failed: {e}");
                outcome.lost_funds += balance;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Cipher;
    use crate::pool::InMemoryWalletStore;
    use crate::transport::SimulatedConnection;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweeps_funded_intermediates_back_to_source() {
        let store = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        let pool = WalletPoolManager::new(store, cipher);
        let intermediates = pool.generate_wallets(2).await.unwrap();

        let conn = SimulatedConnection::new();
        for kp in &intermediates {
            conn.set_balance(&kp.public_key(), 1_000_000);
        }
        let source = Keypair::generate().public_key();

        let outcome = sweep_to_source(&pool, &conn, &source, &intermediates, 1_000).await;
        assert_eq!(outcome.recovered_wallets.len(), 2);
        assert_eq!(outcome.lost_funds, 0);
    }

    #[tokio::test]
    async fn failed_sweep_accumulates_lost_funds_without_raising() {
        let store = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        let pool = WalletPoolManager::new(store, cipher);
        let intermediates = pool.generate_wallets(1).await.unwrap();

        let conn = SimulatedConnection::new();
        conn.set_balance(&intermediates[0].public_key(), 1_000_000);
        conn.fail_transfers_from(&intermediates[0].public_key());
        let source = Keypair::generate().public_key();

        let outcome = sweep_to_source(&pool, &conn, &source, &intermediates, 1_000).await;
        assert!(outcome.recovered_wallets.is_empty());
        assert_eq!(outcome.lost_funds, 1_000_000);
    }
}
