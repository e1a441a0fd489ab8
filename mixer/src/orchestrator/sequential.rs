use chrono::Utc;

use mixer_common::crypto::{Keypair, PublicKey, Signature};

use crate::pool::{TransactionHistoryEntry, TransactionKind, WalletPoolManager};
use crate::transport::{ConfirmationOutcome, Connection, TransferInstruction};

/// One hop of a route: transfer from `sender` to `receiver`. `receiver_is_intermediate`
/// controls whether the pool's history/balance bookkeeping applies.
struct Hop<'a> {
    sender: &'a Keypair,
    receiver: PublicKey,
    receiver_is_intermediate: bool,
}

fn hops<'a>(route_source: &'a Keypair, intermediates: &'a [Keypair], destination: PublicKey) -> Vec<Hop<'a>> {
    let senders: Vec<&Keypair> = std::iter::once(route_source).chain(intermediates.iter()).collect();
    let receivers: Vec<PublicKey> = intermediates
        .iter()
        .map(|kp| kp.public_key())
        .chain(std::iter::once(destination))
        .collect();
    receivers
        .into_iter()
        .enumerate()
        .map(|(i, receiver)| Hop {
            sender: senders[i],
            receiver,
            receiver_is_intermediate: i < intermediates.len(),
        })
        .collect()
}

/// Determine the amount to send for hop `i`.
async fn hop_amount(
    connection: &dyn Connection,
    sender: &PublicKey,
    is_first_hop: bool,
    target_amount: u64,
    remaining: u64,
    fee_payer_present: bool,
    priority_fee: u64,
) -> Result<u64, String> {
    if is_first_hop {
        let cap = connection
            .max_transferable(sender, priority_fee)
            .await
            .map_err(|e| e.to_string())?;
        return Ok(target_amount.min(cap));
    }
    if fee_payer_present {
        return Ok((remaining as f64 * 0.998).floor() as u64);
    }
    connection
        .max_transferable(sender, priority_fee)
        .await
        .map_err(|e| e.to_string())
}

/// Walks `source -> I1 -> .. -> IK -> destination`, confirming each hop
/// either by status or by observing the receiver's balance directly.
/// Returns `(success, signatures, error)`.
pub async fn execute_route(
    pool: &WalletPoolManager,
    connection: &dyn Connection,
    source: &Keypair,
    intermediates: &[Keypair],
    destination: PublicKey,
    amount: u64,
    priority_fee: u64,
    fee_payer: Option<&Keypair>,
    hop_delay_ms: u64,
) -> (bool, Vec<Signature>, Option<String>) {
    let route_hops = hops(source, intermediates, destination);
    let total_hops = route_hops.len();
    let mut signatures = Vec::with_capacity(total_hops);
    let mut remaining = amount;

    for (i, hop) in route_hops.iter().enumerate() {
        let send_amount = match hop_amount(
            connection,
            &hop.sender.public_key(),
            i == 0,
            amount,
            remaining,
            fee_payer.is_some(),
            priority_fee,
        )
        .await
        {
            Ok(0) => {
                return (
                    false,
                    signatures,
                    Some(if i == 0 {
                        "INSUFFICIENT_SOURCE".to_string()
                    } else {
                        format!("hop {i} has nothing transferable")
                    }),
                )
            }
            Ok(amount) => amount,
            Err(e) => return (false, signatures, Some(e)),
        };

        let instruction = TransferInstruction {
            from: hop.sender,
            to: &hop.receiver,
            amount: send_amount,
            priority_fee,
            fee_payer,
        };

        let signature = match connection.send_transaction(&instruction).await {
            Ok(sig) => sig,
            Err(e) => return (false, signatures, Some(e.to_string())),
        };
        signatures.push(signature);

        let confirmed = connection.wait_for_confirmation(&signature).await == ConfirmationOutcome::Confirmed;
        let receiver_balance = connection.get_balance(&hop.receiver).await.unwrap_or(0);
        let accepted = confirmed || receiver_balance >= send_amount;
        if !accepted {
            return (
                false,
                signatures,
                Some(format!("hop {i} neither confirmed nor observed on receiver balance")),
            );
        }

        if hop.receiver_is_intermediate {
            let entry = TransactionHistoryEntry {
                signature: signature.to_base58(),
                kind: TransactionKind::Receive,
                amount: send_amount,
                timestamp: Utc::now(),
                from_address: Some(hop.sender.public_key().to_base58()),
                to_address: Some(hop.receiver.to_base58()),
            };
            let _ = pool.record_transaction(&hop.receiver, entry).await;
            let _ = pool.update_wallet_balance(&hop.receiver, receiver_balance).await;
        }

        remaining = send_amount;
        if i + 1 < total_hops {
            tokio::time::sleep(tokio::time::Duration::from_millis(hop_delay_ms)).await;
        }
    }

    (true, signatures, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Cipher;
    use crate::pool::InMemoryWalletStore;
    use crate::transport::SimulatedConnection;
    use std::sync::Arc;

    #[tokio::test]
    async fn single_hop_route_completes() {
        let store = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        let pool = WalletPoolManager::new(store, cipher);
        let intermediates = pool.generate_wallets(1).await.unwrap();

        let source = Keypair::generate();
        let destination = Keypair::generate().public_key();
        let conn = SimulatedConnection::new();
        conn.set_balance(&source.public_key(), 10_000_000);

        let (success, signatures, error) = execute_route(
            &pool,
            &conn,
            &source,
            &intermediates,
            destination,
            1_000_000,
            1_000,
            None,
            0,
        )
        .await;

        assert!(success, "route should succeed, got error {error:?}");
        assert_eq!(signatures.len(), 2);
        assert!(conn.get_balance(&destination).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn insufficient_source_balance_fails_first_hop() {
        let store = Arc::new(InMemoryWalletStore::new());
        let cipher = Cipher::new("test-master-secret").unwrap();
        let pool = WalletPoolManager::new(store, cipher);
        let intermediates = pool.generate_wallets(1).await.unwrap();

        let source = Keypair::generate();
        let destination = Keypair::generate().public_key();
        let conn = SimulatedConnection::new();

        let (success, signatures, error) = execute_route(
            &pool,
            &conn,
            &source,
            &intermediates,
            destination,
            1_000_000,
            1_000,
            None,
            0,
        )
        .await;

        assert!(!success);
        assert!(signatures.is_empty());
        assert_eq!(error.as_deref(), Some("INSUFFICIENT_SOURCE"));
    }
}
