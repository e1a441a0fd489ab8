use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use mixer_common::crypto::random::secure_random_bytes;
use mixer_common::crypto::{PublicKey, Signature};

use crate::error::TransportError;

use super::{ConfirmationOutcome, Connection, TransferInstruction};

/// In-memory chain double used by pool/route/orchestrator tests in place of
/// a live RPC endpoint. Transfers settle synchronously and confirmations
/// always succeed unless a public key has been poisoned via
/// [`SimulatedConnection::fail_transfers_from`].
pub struct SimulatedConnection {
    balances: Mutex<HashMap<PublicKey, u64>>,
    poisoned: Mutex<Vec<PublicKey>>,
}

impl SimulatedConnection {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            poisoned: Mutex::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, pk: &PublicKey, balance: u64) {
        self.balances.lock().unwrap().insert(*pk, balance);
    }

    pub fn fail_transfers_from(&self, pk: &PublicKey) {
        self.poisoned.lock().unwrap().push(*pk);
    }
}

impl Default for SimulatedConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for SimulatedConnection {
    async fn get_balance(&self, pk: &PublicKey) -> Result<u64, TransportError> {
        Ok(*self.balances.lock().unwrap().get(pk).unwrap_or(&0))
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32], TransportError> {
        Ok(secure_random_bytes::<32>())
    }

    async fn send_transaction(
        &self,
        instruction: &TransferInstruction<'_>,
    ) -> Result<Signature, TransportError> {
        let from_pk = instruction.from.public_key();
        if self.poisoned.lock().unwrap().contains(&from_pk) {
            return Err(TransportError::Rpc("simulated transfer failure".into()));
        }

        let mut balances = self.balances.lock().unwrap();
        let from_balance = balances.entry(from_pk).or_insert(0);
        if *from_balance < instruction.amount {
            return Err(TransportError::Rpc("insufficient simulated balance".into()));
        }
        *from_balance -= instruction.amount;

        let amount = instruction.amount;
        let to = *instruction.to;
        drop(balances);
        *self.balances.lock().unwrap().entry(to).or_insert(0) += amount;

        Ok(instruction.from.sign(&secure_random_bytes::<32>()))
    }

    async fn wait_for_confirmation(&self, _signature: &Signature) -> ConfirmationOutcome {
        ConfirmationOutcome::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer_common::crypto::Keypair;

    #[tokio::test]
    async fn transfer_moves_balance_between_accounts() {
        let conn = SimulatedConnection::new();
        let from = Keypair::generate();
        let to = Keypair::generate().public_key();
        conn.set_balance(&from.public_key(), 1_000);

        let instruction = TransferInstruction {
            from: &from,
            to: &to,
            amount: 400,
            priority_fee: 0,
            fee_payer: None,
        };
        conn.send_transaction(&instruction).await.unwrap();

        assert_eq!(conn.get_balance(&from.public_key()).await.unwrap(), 600);
        assert_eq!(conn.get_balance(&to).await.unwrap(), 400);
    }

    #[tokio::test]
    async fn poisoned_sender_fails_transfers() {
        let conn = SimulatedConnection::new();
        let from = Keypair::generate();
        let to = Keypair::generate().public_key();
        conn.set_balance(&from.public_key(), 1_000);
        conn.fail_transfers_from(&from.public_key());

        let instruction = TransferInstruction {
            from: &from,
            to: &to,
            amount: 100,
            priority_fee: 0,
            fee_payer: None,
        };
        assert!(conn.send_transaction(&instruction).await.is_err());
    }
}
