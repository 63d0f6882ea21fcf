//! wBAN -> BAN redemption credit, driven by chain events.
//!
//! Duplicate event delivery is the normal case after a scanner restart;
//! the ledger's idempotent credit absorbs it.

use crate::amounts::{parse_ban, parse_units};
use crate::error::BridgeError;
use crate::metrics;
use crate::processors::Processors;
use crate::types::{SwapToBanJob, SwapToBanRecord};

impl Processors {
    pub(crate) async fn process_swap_to_ban(
        &self,
        event: &SwapToBanJob,
    ) -> Result<String, BridgeError> {
        if event.native_address.trim().is_empty() {
            // The contract must carry the BAN wallet in every redemption;
            // an empty one is an invariant violation worth surfacing.
            return Err(BridgeError::InvalidAddress(
                "redemption event carries no BAN wallet".to_string(),
            ));
        }

        let amount = parse_ban(&event.amount)?;
        let record = SwapToBanRecord {
            blockchain_address: event.blockchain_address.clone(),
            native_address: event.native_address.clone(),
            amount,
            hash: event.hash.clone(),
            timestamp_ms: event.event_timestamp_s.saturating_mul(1000),
            wban_balance: parse_units(&event.wban_balance).unwrap_or_default(),
        };

        self.ledger.store_swap_to_ban(&record).await?;
        metrics::record_swap("wban-to-ban");
        Ok(event.hash.clone())
    }
}
