//! BAN node collaborator.
//!
//! The node speaks an "action" JSON RPC. Amounts cross this boundary in
//! network raw (29 decimals) and are converted to ledger base units on
//! the way in.

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::amounts::{parse_units, raw_to_units, units_to_raw};
use crate::cache::BoundedTtlCache;
use crate::error::BridgeError;
use crate::types::canonical_native;

/// A deposit observed on the hot wallet.
#[derive(Debug, Clone)]
pub struct DepositEvent {
    pub sender: String,
    /// Ledger base units.
    pub amount: U256,
    pub hash: String,
    pub timestamp_ms: i64,
}

#[async_trait]
pub trait BanNode: Send + Sync {
    /// Confirmed balance of an account, in ledger base units.
    async fn balance(&self, address: &str) -> Result<U256, BridgeError>;

    /// Send from the hot wallet. `id` makes the node-side send idempotent:
    /// re-issuing the same id returns the original block hash instead of
    /// paying twice.
    async fn send(&self, to: &str, amount: U256, id: &str) -> Result<String, BridgeError>;
}

#[derive(Serialize)]
struct BalanceRequest<'a> {
    action: &'static str,
    account: &'a str,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    action: &'static str,
    wallet: &'a str,
    source: &'a str,
    destination: &'a str,
    amount: String,
    id: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    block: String,
}

#[derive(Serialize)]
struct HistoryRequest<'a> {
    action: &'static str,
    account: &'a str,
    count: u32,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryItem>,
}

#[derive(Deserialize)]
struct HistoryItem {
    #[serde(rename = "type")]
    kind: String,
    account: String,
    amount: String,
    hash: String,
    local_timestamp: String,
}

/// Errors come back as `{"error": "..."}` with HTTP 200.
#[derive(Deserialize)]
struct RpcError {
    error: Option<String>,
}

pub struct BanRpcClient {
    http: reqwest::Client,
    rpc_url: String,
    wallet_id: String,
    hot_wallet: String,
}

impl BanRpcClient {
    pub fn new(rpc_url: &str, wallet_id: &str, hot_wallet: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.to_string(),
            wallet_id: wallet_id.to_string(),
            hot_wallet: canonical_native(hot_wallet),
        }
    }

    async fn call<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        request: &Req,
    ) -> Result<Resp, BridgeError> {
        let body = self
            .http
            .post(&self.rpc_url)
            .json(request)
            .send()
            .await
            .map_err(|e| BridgeError::UpstreamChain(format!("BAN node request: {e}")))?
            .text()
            .await
            .map_err(|e| BridgeError::UpstreamChain(format!("BAN node response: {e}")))?;

        if let Ok(RpcError { error: Some(error) }) = serde_json::from_str::<RpcError>(&body) {
            return Err(BridgeError::UpstreamChain(format!("BAN node error: {error}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| BridgeError::UpstreamChain(format!("BAN node decode: {e}")))
    }

    async fn history(&self, count: u32) -> Result<Vec<HistoryItem>, BridgeError> {
        let response: HistoryResponse = self
            .call(&HistoryRequest {
                action: "account_history",
                account: &self.hot_wallet,
                count,
            })
            .await?;
        Ok(response.history)
    }

    /// Poll the hot wallet history and emit deposits into a channel.
    ///
    /// Duplicate suppression here is only a de-noising cache: the deposit
    /// service re-checks `ContainsDeposit` before crediting, so replays
    /// after a restart are safe.
    pub fn spawn_deposit_poller(
        self: Arc<Self>,
        poll_interval: Duration,
    ) -> mpsc::Receiver<DepositEvent> {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut seen: BoundedTtlCache<String, ()> =
                BoundedTtlCache::new(10_000, Duration::from_secs(86_400));
            loop {
                match self.history(100).await {
                    Ok(items) => {
                        for item in items {
                            if item.kind != "receive" {
                                continue;
                            }
                            if seen.contains_key(&item.hash) {
                                continue;
                            }
                            let Ok(raw) = parse_units(&item.amount) else {
                                error!(hash = %item.hash, amount = %item.amount, "Unparseable deposit amount");
                                continue;
                            };
                            let timestamp_ms = item
                                .local_timestamp
                                .parse::<i64>()
                                .unwrap_or(0)
                                .saturating_mul(1000);
                            let event = DepositEvent {
                                sender: canonical_native(&item.account),
                                amount: raw_to_units(raw),
                                hash: item.hash.clone(),
                                timestamp_ms,
                            };
                            debug!(hash = %event.hash, sender = %event.sender, "Deposit observed");
                            if tx.send(event).await.is_err() {
                                info!("Deposit channel closed, stopping poller");
                                return;
                            }
                            seen.insert(item.hash, ());
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to poll hot wallet history");
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
        rx
    }
}

#[async_trait]
impl BanNode for BanRpcClient {
    async fn balance(&self, address: &str) -> Result<U256, BridgeError> {
        let account = canonical_native(address);
        let response: BalanceResponse = self
            .call(&BalanceRequest {
                action: "account_balance",
                account: &account,
            })
            .await?;
        let raw = parse_units(&response.balance)
            .map_err(|_| BridgeError::UpstreamChain(format!("bad balance: {}", response.balance)))?;
        Ok(raw_to_units(raw))
    }

    async fn send(&self, to: &str, amount: U256, id: &str) -> Result<String, BridgeError> {
        let destination = canonical_native(to);
        let response: SendResponse = self
            .call(&SendRequest {
                action: "send",
                wallet: &self.wallet_id,
                source: &self.hot_wallet,
                destination: &destination,
                amount: units_to_raw(amount).to_string(),
                id,
            })
            .await?;
        Ok(response.block)
    }
}
