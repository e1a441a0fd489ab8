use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use mixer_common::crypto::{PublicKey, Signature};

use crate::config::{
    BALANCE_CACHE_TTL_MS, BLOCKHASH_CACHE_TTL_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_READ_RATE_LIMIT_PER_SEC, DEFAULT_SUBMIT_RATE_LIMIT_PER_SEC,
};
use crate::error::TransportError;

use super::rate_limit::RateLimiter;
use super::{ConfirmationOutcome, Connection, TransferInstruction};

struct CachedBalance {
    value: u64,
    fetched_at: Instant,
}

/// JSON-RPC transport over the chain's HTTP endpoint, modeled
/// on a conventional JSON-RPC 2.0 envelope. Caches balances (~5s) and the
/// latest blockhash (~10s) to keep the orchestrator's per-hop polling off
/// the hot path, and honors the read/submit rate limits cooperatively.
pub struct RpcConnection {
    client: Client,
    endpoint: String,
    read_limiter: RateLimiter,
    submit_limiter: RateLimiter,
    balance_cache: Mutex<HashMap<PublicKey, CachedBalance>>,
    blockhash_cache: Mutex<Option<([u8; 32], Instant)>>,
}

impl RpcConnection {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            read_limiter: RateLimiter::new(DEFAULT_READ_RATE_LIMIT_PER_SEC),
            submit_limiter: RateLimiter::new(DEFAULT_SUBMIT_RATE_LIMIT_PER_SEC),
            balance_cache: Mutex::new(HashMap::new()),
            blockhash_cache: Mutex::new(None),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("rpc call {method} -> {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Rpc(e.to_string()))?;

        if let Some(error) = body.get("error") {
            return Err(TransportError::Rpc(error.to_string()));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

}

#[async_trait]
impl Connection for RpcConnection {
    async fn get_balance(&self, pk: &PublicKey) -> Result<u64, TransportError> {
        if let Some(cached) = self.balance_cache.lock().unwrap().get(pk) {
            if cached.fetched_at.elapsed() < Duration::from_millis(BALANCE_CACHE_TTL_MS) {
                return Ok(cached.value);
            }
        }

        self.read_limiter.acquire().await;
        let result = self.call("getBalance", json!([pk.to_base58()])).await?;
        let balance = result
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| TransportError::Rpc("malformed getBalance response".into()))?;

        self.balance_cache.lock().unwrap().insert(
            *pk,
            CachedBalance {
                value: balance,
                fetched_at: Instant::now(),
            },
        );
        Ok(balance)
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32], TransportError> {
        if let Some((hash, fetched_at)) = *self.blockhash_cache.lock().unwrap() {
            if fetched_at.elapsed() < Duration::from_millis(BLOCKHASH_CACHE_TTL_MS) {
                return Ok(hash);
            }
        }

        self.read_limiter.acquire().await;
        let result = self.call("getLatestBlockhash", json!([])).await?;
        let encoded = result
            .get("value")
            .and_then(|v| v.get("blockhash"))
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Rpc("malformed getLatestBlockhash response".into()))?;

        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| TransportError::Rpc(e.to_string()))?;
        let mut hash = [0u8; 32];
        if bytes.len() != 32 {
            return Err(TransportError::Rpc("blockhash is not 32 bytes".into()));
        }
        hash.copy_from_slice(&bytes);

        *self.blockhash_cache.lock().unwrap() = Some((hash, Instant::now()));
        Ok(hash)
    }

    async fn send_transaction(
        &self,
        instruction: &TransferInstruction<'_>,
    ) -> Result<Signature, TransportError> {
        let backoff_ms = [1_000u64, 2_000, 5_000];
        let mut last_err = None;

        for attempt in 0..=DEFAULT_MAX_RETRIES {
            let blockhash = self.get_latest_blockhash().await?;
            let payload = json!({
                "from": instruction.from.public_key().to_base58(),
                "to": instruction.to.to_base58(),
                "amount": instruction.amount,
                "priority_fee": instruction.priority_fee,
                "blockhash": hex::encode(blockhash),
                "fee_payer": instruction.fee_payer.map(|kp| kp.public_key().to_base58()),
            });
            let signature = instruction.from.sign(payload.to_string().as_bytes());

            self.submit_limiter.acquire().await;
            let result = self
                .call(
                    "sendTransaction",
                    json!([payload, { "signature": signature.to_base58() }]),
                )
                .await;

            match result {
                Ok(_) => return Ok(signature),
                Err(TransportError::Rpc(message)) if message.contains("blockhash") => {
                    warn!("blockhash expired on attempt {attempt}, refreshing and retrying");
                    *self.blockhash_cache.lock().unwrap() = None;
                    last_err = Some(message);
                    if attempt < DEFAULT_MAX_RETRIES {
                        sleep(Duration::from_millis(backoff_ms[attempt as usize])).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransportError::SendExhausted(
            last_err.unwrap_or_else(|| "blockhash kept expiring".to_string()),
        ))
    }

    async fn wait_for_confirmation(&self, signature: &Signature) -> ConfirmationOutcome {
        for attempt in 0..8u32 {
            self.read_limiter.acquire().await;
            match self
                .call("getSignatureStatuses", json!([[signature.to_base58()]]))
                .await
            {
                Ok(result) => {
                    let confirmed = result
                        .get("value")
                        .and_then(Value::as_array)
                        .and_then(|arr| arr.first())
                        .map(|status| !status.is_null())
                        .unwrap_or(false);
                    if confirmed {
                        return ConfirmationOutcome::Confirmed;
                    }
                    sleep(Duration::from_millis(confirmation_backoff_ms(
                        ConfirmationOutcome::Other,
                        attempt,
                    )))
                    .await;
                }
                Err(TransportError::Rpc(message)) => {
                    let class = classify_rpc_error(&message);
                    sleep(Duration::from_millis(confirmation_backoff_ms(class, attempt))).await;
                    if attempt >= 4 {
                        return class;
                    }
                }
                Err(_) => return ConfirmationOutcome::Other,
            }
        }
        ConfirmationOutcome::Other
    }
}

fn classify_rpc_error(message: &str) -> ConfirmationOutcome {
    let lower = message.to_lowercase();
    if lower.contains("expired") || lower.contains("blockhash") {
        ConfirmationOutcome::Expired
    } else if lower.contains("timeout") || lower.contains("connection") {
        ConfirmationOutcome::NetworkError
    } else {
        ConfirmationOutcome::Other
    }
}

/// Adaptive backoff per confirmation error class: expiration
/// waits longer (2s/4s/8s capped 10s), network errors wait shorter
/// (0.5s/1s/2s capped 3s), everything else uses default exponential.
fn confirmation_backoff_ms(class: ConfirmationOutcome, attempt: u32) -> u64 {
    match class {
        ConfirmationOutcome::Expired => (2_000u64 * 2u64.pow(attempt.min(2))).min(10_000),
        ConfirmationOutcome::NetworkError => (500u64 * 2u64.pow(attempt.min(2))).min(3_000),
        _ => (500u64 * 2u64.pow(attempt.min(5))).min(8_000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_backoff_is_capped_at_10s() {
        assert_eq!(confirmation_backoff_ms(ConfirmationOutcome::Expired, 0), 2_000);
        assert_eq!(confirmation_backoff_ms(ConfirmationOutcome::Expired, 10), 8_000.max(8_000));
        assert!(confirmation_backoff_ms(ConfirmationOutcome::Expired, 10) <= 10_000);
    }

    #[test]
    fn network_backoff_is_capped_at_3s() {
        assert!(confirmation_backoff_ms(ConfirmationOutcome::NetworkError, 10) <= 3_000);
    }

    #[test]
    fn classify_rpc_error_recognizes_expiry_and_network_classes() {
        assert_eq!(classify_rpc_error("blockhash expired"), ConfirmationOutcome::Expired);
        assert_eq!(
            classify_rpc_error("connection timeout"),
            ConfirmationOutcome::NetworkError
        );
        assert_eq!(classify_rpc_error("invalid signature"), ConfirmationOutcome::Other);
    }
}
