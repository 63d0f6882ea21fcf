//! Chain scanner for wBAN -> BAN redemptions.
//!
//! Polls the EVM chain in ascending block order, staying a safety depth
//! behind the head, enqueues one swap-to-ban job per redemption event and
//! advances the checkpoint. Crash replay is safe because the credit
//! handler is idempotent.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::clients::EvmClient;
use crate::error::BridgeError;
use crate::ledger::LedgerStore;
use crate::metrics;
use crate::queue::OperationQueue;
use crate::types::{canonical_native, JobKind, SwapToBanJob};

pub struct ChainScanner {
    evm: Arc<dyn EvmClient>,
    ledger: Arc<LedgerStore>,
    queue: Arc<OperationQueue>,
    /// Blocks kept behind the head so shallow reorgs never reach us.
    safety_depth: u64,
    poll_interval: Duration,
}

impl ChainScanner {
    pub fn new(
        evm: Arc<dyn EvmClient>,
        ledger: Arc<LedgerStore>,
        queue: Arc<OperationQueue>,
        safety_depth: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            evm,
            ledger,
            queue,
            safety_depth,
            poll_interval,
        }
    }

    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(
            safety_depth = self.safety_depth,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Chain scanner starting"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping chain scanner");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "Scan cycle failed");
            }
        }
    }

    /// One poll cycle: process `(checkpoint, head - safety_depth]`.
    pub async fn scan_once(&self) -> Result<(), BridgeError> {
        let last_processed = self.ledger.last_processed_block().await?;
        let head = self.evm.block_number().await?;
        let safe_head = head.saturating_sub(self.safety_depth);
        if safe_head <= last_processed {
            return Ok(());
        }

        let from_block = last_processed + 1;
        debug!(from_block, to_block = safe_head, "Scanning blocks");

        let events = self.evm.swap_to_ban_events(from_block, safe_head).await?;
        for event in events {
            if self
                .ledger
                .contains_swap_to_ban(&event.blockchain_address, &event.hash)
                .await?
            {
                debug!(hash = %event.hash, "Redemption already credited, skipping");
                metrics::record_duplicate_event();
                continue;
            }
            let native = canonical_native(&event.native_address);
            // Events with a missing BAN wallet still get a job so the
            // invariant violation surfaces in the dead letter sequence.
            let account = if native.is_empty() {
                event.blockchain_address.clone()
            } else {
                native.clone()
            };
            let payload = SwapToBanJob {
                blockchain_address: event.blockchain_address.clone(),
                native_address: native,
                amount: event.amount.clone(),
                hash: event.hash.clone(),
                event_timestamp_s: event.timestamp_s,
                wban_balance: event.wban_balance.to_string(),
            };
            self.queue
                .enqueue(
                    JobKind::SwapToBan,
                    &account,
                    &serde_json::to_string(&payload)?,
                    Duration::ZERO,
                )
                .await?;
            info!(
                hash = %event.hash,
                blockchain_address = %event.blockchain_address,
                amount = %event.amount,
                "Redemption enqueued"
            );
        }

        self.ledger.set_last_processed_block(safe_head).await?;
        metrics::set_last_processed_block(safe_head);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MintReceipt, SwapToBanEvent};
    use crate::store::{KvStore, MemoryStore};
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BC_A: &str = "0x00000000000000000000000000000000000000aa";

    struct FakeChain {
        head: Mutex<u64>,
        events: Mutex<Vec<(u64, SwapToBanEvent)>>,
        queried_ranges: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl EvmClient for FakeChain {
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
            unimplemented!("not used by scanner tests")
        }

        async fn block_number(&self) -> Result<u64, BridgeError> {
            Ok(*self.head.lock().unwrap())
        }

        async fn swap_to_ban_events(
            &self,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<SwapToBanEvent>, BridgeError> {
            self.queried_ranges.lock().unwrap().push((from_block, to_block));
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|(block, _)| *block >= from_block && *block <= to_block)
                .map(|(_, event)| event.clone())
                .collect())
        }
    }

    fn redemption(hash: &str) -> SwapToBanEvent {
        SwapToBanEvent {
            blockchain_address: BC_A.to_string(),
            native_address: "ban_a".to_string(),
            amount: "1.5".to_string(),
            hash: hash.to_string(),
            timestamp_s: 10,
            wban_balance: U256::ZERO,
        }
    }

    fn scanner(chain: Arc<FakeChain>) -> (ChainScanner, Arc<LedgerStore>, Arc<OperationQueue>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(LedgerStore::new(store.clone(), 100, "https://bscscan.com".into()));
        let queue = Arc::new(OperationQueue::new(store));
        (
            ChainScanner::new(chain, ledger.clone(), queue.clone(), 5, Duration::from_millis(10)),
            ledger,
            queue,
        )
    }

    #[tokio::test]
    async fn test_scans_behind_safety_depth_and_advances_checkpoint() {
        let chain = Arc::new(FakeChain {
            head: Mutex::new(200),
            events: Mutex::new(vec![(150, redemption("h1"))]),
            queried_ranges: Mutex::new(Vec::new()),
        });
        let (scanner, ledger, queue) = scanner(chain.clone());

        scanner.scan_once().await.unwrap();

        assert_eq!(
            chain.queried_ranges.lock().unwrap().as_slice(),
            &[(101, 195)]
        );
        assert_eq!(ledger.last_processed_block().await.unwrap(), 195);
        assert_eq!(queue.depth().await.unwrap(), 1);

        let head = queue.peek("ban_a").await.unwrap().unwrap();
        let job = queue.load(&head.0).await.unwrap().unwrap();
        assert_eq!(job.kind, JobKind::SwapToBan);
        let payload: SwapToBanJob = serde_json::from_str(&job.payload).unwrap();
        assert_eq!(payload.hash, "h1");
        assert_eq!(payload.amount, "1.5");
    }

    #[tokio::test]
    async fn test_no_new_blocks_is_a_noop() {
        let chain = Arc::new(FakeChain {
            head: Mutex::new(104),
            events: Mutex::new(Vec::new()),
            queried_ranges: Mutex::new(Vec::new()),
        });
        let (scanner, ledger, queue) = scanner(chain.clone());

        // head - depth = 99 <= checkpoint 100
        scanner.scan_once().await.unwrap();
        assert!(chain.queried_ranges.lock().unwrap().is_empty());
        assert_eq!(ledger.last_processed_block().await.unwrap(), 100);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_already_credited_event_not_reenqueued() {
        let chain = Arc::new(FakeChain {
            head: Mutex::new(200),
            events: Mutex::new(vec![(150, redemption("h1"))]),
            queried_ranges: Mutex::new(Vec::new()),
        });
        let (scanner, ledger, queue) = scanner(chain.clone());

        let record = crate::types::SwapToBanRecord {
            blockchain_address: BC_A.to_string(),
            native_address: "ban_a".to_string(),
            amount: crate::amounts::parse_ban("1.5").unwrap(),
            hash: "h1".to_string(),
            timestamp_ms: 10_000,
            wban_balance: U256::ZERO,
        };
        ledger.store_swap_to_ban(&record).await.unwrap();

        scanner.scan_once().await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 0);
        assert_eq!(ledger.last_processed_block().await.unwrap(), 195);
    }
}
