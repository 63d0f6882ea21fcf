//! BAN deposit ingestion.
//!
//! Consumes deposit events observed on the hot wallet. The first deposit
//! from a BAN address confirms its pending claim; every deposit from a
//! claimed address credits the ledger. Deposits from unclaimed senders
//! are ignored (no credit without a claim).

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::amounts::format_ban;
use crate::claims::ClaimManager;
use crate::clients::DepositEvent;
use crate::error::BridgeError;
use crate::ledger::LedgerStore;
use crate::metrics;
use crate::types::canonical_native;

pub struct DepositService {
    ledger: Arc<LedgerStore>,
    claims: Arc<ClaimManager>,
}

impl DepositService {
    pub fn new(ledger: Arc<LedgerStore>, claims: Arc<ClaimManager>) -> Self {
        Self { ledger, claims }
    }

    pub async fn run(
        &self,
        mut events: mpsc::Receiver<DepositEvent>,
        mut shutdown: mpsc::Receiver<()>,
    ) -> eyre::Result<()> {
        info!("Deposit service starting");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping deposit service");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Deposit stream closed");
                        return Ok(());
                    };
                    if let Err(e) = self.handle_deposit(&event).await {
                        error!(
                            hash = %event.hash,
                            sender = %event.sender,
                            error = %e,
                            "Failed to process deposit"
                        );
                    }
                }
            }
        }
    }

    pub async fn handle_deposit(&self, event: &DepositEvent) -> Result<(), BridgeError> {
        let native = canonical_native(&event.sender);

        if self.ledger.contains_deposit(&native, &event.hash).await? {
            debug!(hash = %event.hash, "Deposit already credited");
            return Ok(());
        }

        // First deposit binds the claim.
        if self.ledger.has_pending_claim(&native).await? {
            self.claims.confirm(&native).await?;
        }

        if !self.ledger.is_claimed(&native).await? {
            warn!(
                sender = %native,
                hash = %event.hash,
                amount = %format_ban(event.amount),
                "Deposit from unclaimed address, not credited"
            );
            return Ok(());
        }

        self.ledger
            .store_deposit(&native, event.amount, event.timestamp_ms, &event.hash)
            .await?;
        metrics::record_deposit();
        info!(
            sender = %native,
            hash = %event.hash,
            amount = %format_ban(event.amount),
            "Deposit credited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimOutcome;
    use crate::clients::{Blacklist, EvmClient, MintReceipt, SwapToBanEvent};
    use crate::store::{KvStore, MemoryStore};
    use alloy::primitives::U256;
    use async_trait::async_trait;

    const BC_A: &str = "0x00000000000000000000000000000000000000aa";

    struct AcceptAllEvm;

    #[async_trait]
    impl EvmClient for AcceptAllEvm {
        fn verify_signature(
            &self,
            _expected_signer: &str,
            _message: &str,
            _signature: &str,
        ) -> Result<bool, BridgeError> {
            Ok(true)
        }

        async fn create_mint_receipt(
            &self,
            _blockchain_address: &str,
            _amount: U256,
        ) -> Result<MintReceipt, BridgeError> {
            unimplemented!("not used by deposit tests")
        }

        async fn block_number(&self) -> Result<u64, BridgeError> {
            Ok(0)
        }

        async fn swap_to_ban_events(
            &self,
            _from_block: u64,
            _to_block: u64,
        ) -> Result<Vec<SwapToBanEvent>, BridgeError> {
            Ok(Vec::new())
        }
    }

    struct EmptyBlacklist;

    #[async_trait]
    impl Blacklist for EmptyBlacklist {
        async fn lookup(&self, _native_address: &str) -> Result<Option<String>, BridgeError> {
            Ok(None)
        }
    }

    fn service() -> (DepositService, Arc<LedgerStore>, Arc<ClaimManager>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(LedgerStore::new(store, 0, "https://bscscan.com".into()));
        let claims = Arc::new(ClaimManager::new(
            ledger.clone(),
            Arc::new(AcceptAllEvm),
            Arc::new(EmptyBlacklist),
        ));
        (
            DepositService::new(ledger.clone(), claims.clone()),
            ledger,
            claims,
        )
    }

    fn deposit(sender: &str, amount: u64, hash: &str) -> DepositEvent {
        DepositEvent {
            sender: sender.to_string(),
            amount: U256::from(amount),
            hash: hash.to_string(),
            timestamp_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_first_deposit_confirms_claim_and_credits() {
        let (service, ledger, claims) = service();
        assert_eq!(claims.claim("ban_a", BC_A, "sig").await, ClaimOutcome::Ok);

        service.handle_deposit(&deposit("ban_a", 500, "h1")).await.unwrap();

        assert!(ledger.has_claim("ban_a", BC_A).await.unwrap());
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(500));
    }

    #[tokio::test]
    async fn test_duplicate_deposit_not_credited_twice() {
        let (service, ledger, claims) = service();
        claims.claim("ban_a", BC_A, "sig").await;

        let event = deposit("ban_a", 500, "h1");
        service.handle_deposit(&event).await.unwrap();
        service.handle_deposit(&event).await.unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(500));
    }

    #[tokio::test]
    async fn test_unclaimed_deposit_ignored() {
        let (service, ledger, _claims) = service();
        service.handle_deposit(&deposit("ban_x", 500, "h1")).await.unwrap();
        assert_eq!(ledger.balance("ban_x").await.unwrap(), U256::ZERO);
        assert!(!ledger.contains_deposit("ban_x", "h1").await.unwrap());
    }
}
