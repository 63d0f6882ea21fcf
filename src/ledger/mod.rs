//! Ledger store.
//!
//! Owns every piece of persisted bridge state: account balances, the
//! append-only deposit/withdrawal/swap sequences, audit entries, claims,
//! the gasless-swap mark and the chain checkpoint. Every mutation of an
//! account is serialized by a distributed lock and committed as one
//! atomic multi-write batch; a failure inside a locked block releases
//! the lock and surfaces the error unchanged.

use alloy::primitives::U256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::amounts::parse_units;
use crate::error::BridgeError;
use crate::lock::LockManager;
use crate::store::{KvStore, WriteOp};
use crate::types::{canonical_blockchain, canonical_native, AuditKind, HistoryEntry, SwapToBanRecord};

pub mod keys;

/// TTL of read-path leases.
const READ_LOCK_TTL: Duration = Duration::from_secs(1);
/// Deposits may wait on slow node callbacks, so their lease is long.
const DEPOSIT_LOCK_TTL: Duration = Duration::from_secs(30);
const WITHDRAWAL_LOCK_TTL: Duration = Duration::from_secs(1);
const SWAP_LOCK_TTL: Duration = Duration::from_secs(1);

/// History responses return at most this many entries.
const HISTORY_LIMIT: usize = 1000;

/// Explorer for native transactions.
const NATIVE_EXPLORER_URL: &str = "https://creeper.banano.cc/explorer/block";

pub struct LedgerStore {
    store: Arc<dyn KvStore>,
    locks: LockManager,
    /// Checkpoint returned before the scanner ever persisted one.
    default_start_block: u64,
    /// Base URL of the EVM explorer, e.g. "https://bscscan.com".
    blockchain_explorer_url: String,
}

impl LedgerStore {
    pub fn new(
        store: Arc<dyn KvStore>,
        default_start_block: u64,
        blockchain_explorer_url: String,
    ) -> Self {
        let locks = LockManager::new(store.clone());
        Self {
            store,
            locks,
            default_start_block,
            blockchain_explorer_url: blockchain_explorer_url
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn read_balance(&self, native_address: &str) -> Result<U256, BridgeError> {
        match self.store.get(&keys::balance(native_address)).await? {
            Some(value) => parse_units(&value),
            None => Ok(U256::ZERO),
        }
    }

    /// Point-in-time consistent balance read (lock-protected).
    pub async fn balance(&self, native_address: &str) -> Result<U256, BridgeError> {
        let native = canonical_native(native_address);
        let resource = keys::balance_lock(&native);
        self.locks
            .with_lock(&[resource.as_str()], READ_LOCK_TTL, || async {
                self.read_balance(&native).await
            })
            .await
    }

    /// Balance read without taking the account lock. Eventually
    /// consistent; for history, metrics and status paths only.
    pub async fn balance_unlocked(&self, native_address: &str) -> Result<U256, BridgeError> {
        self.read_balance(&canonical_native(native_address)).await
    }

    // ---- deposits -------------------------------------------------------

    pub async fn store_deposit(
        &self,
        native_address: &str,
        amount: U256,
        timestamp_ms: i64,
        hash: &str,
    ) -> Result<(), BridgeError> {
        let native = canonical_native(native_address);
        let resource = keys::balance_lock(&native);
        self.locks
            .with_lock(&[resource.as_str()], DEPOSIT_LOCK_TTL, || async {
                let balance = self.read_balance(&native).await?;
                let updated = balance.checked_add(amount).ok_or_else(|| {
                    BridgeError::InvalidAmount(format!("balance overflow crediting {amount}"))
                })?;
                self.store
                    .multi(vec![
                        WriteOp::Set {
                            key: keys::balance(&native),
                            value: updated.to_string(),
                        },
                        WriteOp::ZAdd {
                            key: keys::deposits(&native),
                            member: hash.to_string(),
                            score: timestamp_ms,
                        },
                        WriteOp::HSet {
                            key: keys::audit(hash),
                            fields: vec![
                                ("type".into(), AuditKind::Deposit.as_str().into()),
                                ("native_address".into(), native.clone()),
                                ("amount".into(), amount.to_string()),
                                ("timestamp_ms".into(), timestamp_ms.to_string()),
                                ("hash".into(), hash.to_string()),
                            ],
                        },
                    ])
                    .await
            })
            .await
    }

    pub async fn contains_deposit(
        &self,
        native_address: &str,
        hash: &str,
    ) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        Ok(self
            .store
            .zscore(&keys::deposits(&native), hash)
            .await?
            .is_some())
    }

    // ---- withdrawals ----------------------------------------------------

    pub async fn store_withdrawal(
        &self,
        native_address: &str,
        amount: U256,
        timestamp_ms: i64,
        hash: &str,
    ) -> Result<(), BridgeError> {
        let native = canonical_native(native_address);
        let resource = keys::balance_lock(&native);
        self.locks
            .with_lock(&[resource.as_str()], WITHDRAWAL_LOCK_TTL, || async {
                let balance = self.read_balance(&native).await?;
                let updated = balance.checked_sub(amount).ok_or(
                    BridgeError::InsufficientBalance {
                        available: balance,
                        requested: amount,
                    },
                )?;
                self.store
                    .multi(vec![
                        WriteOp::Set {
                            key: keys::balance(&native),
                            value: updated.to_string(),
                        },
                        WriteOp::ZAdd {
                            key: keys::withdrawals(&native),
                            member: hash.to_string(),
                            score: timestamp_ms,
                        },
                        WriteOp::HSet {
                            key: keys::audit(hash),
                            fields: vec![
                                ("type".into(), AuditKind::Withdrawal.as_str().into()),
                                ("native_address".into(), native.clone()),
                                ("amount".into(), amount.to_string()),
                                ("timestamp_ms".into(), timestamp_ms.to_string()),
                                ("hash".into(), hash.to_string()),
                            ],
                        },
                    ])
                    .await
            })
            .await
    }

    /// Whether a withdrawal request with this exact client timestamp was
    /// already recorded — the withdrawal idempotency key.
    pub async fn contains_withdrawal_request(
        &self,
        native_address: &str,
        timestamp_ms: i64,
    ) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let matches = self
            .store
            .zrange_by_score(&keys::withdrawals(&native), timestamp_ms, timestamp_ms)
            .await?;
        Ok(!matches.is_empty())
    }

    // ---- swaps ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn store_swap_to_wban(
        &self,
        native_address: &str,
        blockchain_address: &str,
        amount: U256,
        timestamp_ms: i64,
        receipt: &str,
        uuid: &str,
    ) -> Result<(), BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;
        let resource = keys::swap_lock(&native);
        self.locks
            .with_lock(&[resource.as_str()], SWAP_LOCK_TTL, || async {
                let balance = self.read_balance(&native).await?;
                let updated = balance.checked_sub(amount).ok_or(
                    BridgeError::InsufficientBalance {
                        available: balance,
                        requested: amount,
                    },
                )?;
                self.store
                    .multi(vec![
                        WriteOp::Set {
                            key: keys::balance(&native),
                            value: updated.to_string(),
                        },
                        WriteOp::ZAdd {
                            key: keys::swaps_ban_to_wban(&native),
                            member: receipt.to_string(),
                            score: timestamp_ms,
                        },
                        WriteOp::HSet {
                            key: keys::audit(receipt),
                            fields: vec![
                                ("type".into(), AuditKind::SwapToWban.as_str().into()),
                                ("native_address".into(), native.clone()),
                                ("blockchain_address".into(), blockchain.clone()),
                                ("amount".into(), amount.to_string()),
                                ("timestamp_ms".into(), timestamp_ms.to_string()),
                                ("receipt".into(), receipt.to_string()),
                                ("uuid".into(), uuid.to_string()),
                            ],
                        },
                    ])
                    .await
            })
            .await
    }

    /// Credit a wBAN -> BAN redemption. Idempotent: the same chain event
    /// delivered again is a no-op with a warning.
    pub async fn store_swap_to_ban(&self, record: &SwapToBanRecord) -> Result<(), BridgeError> {
        let native = canonical_native(&record.native_address);
        let blockchain = canonical_blockchain(&record.blockchain_address)?;
        let resource = keys::balance_lock(&native);
        self.locks
            .with_lock(&[resource.as_str()], SWAP_LOCK_TTL, || async {
                if self.contains_swap_to_ban(&blockchain, &record.hash).await? {
                    warn!(
                        hash = %record.hash,
                        blockchain_address = %blockchain,
                        "Swap event already credited, skipping"
                    );
                    return Ok(());
                }
                let balance = self.read_balance(&native).await?;
                let updated = balance.checked_add(record.amount).ok_or_else(|| {
                    BridgeError::InvalidAmount(format!(
                        "balance overflow crediting {}",
                        record.amount
                    ))
                })?;
                self.store
                    .multi(vec![
                        WriteOp::Set {
                            key: keys::balance(&native),
                            value: updated.to_string(),
                        },
                        WriteOp::ZAdd {
                            key: keys::swaps_wban_to_ban(&blockchain),
                            member: record.hash.clone(),
                            score: record.timestamp_ms,
                        },
                        WriteOp::HSet {
                            key: keys::audit(&record.hash),
                            fields: vec![
                                ("type".into(), AuditKind::SwapToBan.as_str().into()),
                                ("blockchain_address".into(), blockchain.clone()),
                                ("native_address".into(), native.clone()),
                                ("amount".into(), record.amount.to_string()),
                                ("timestamp_ms".into(), record.timestamp_ms.to_string()),
                                ("hash".into(), record.hash.clone()),
                                ("wban_balance".into(), record.wban_balance.to_string()),
                            ],
                        },
                    ])
                    .await
            })
            .await
    }

    pub async fn contains_swap_to_ban(
        &self,
        blockchain_address: &str,
        hash: &str,
    ) -> Result<bool, BridgeError> {
        let blockchain = canonical_blockchain(blockchain_address)?;
        Ok(self
            .store
            .zscore(&keys::swaps_wban_to_ban(&blockchain), hash)
            .await?
            .is_some())
    }

    // ---- claims ---------------------------------------------------------

    pub async fn has_pending_claim(&self, native_address: &str) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let pending = self
            .store
            .scan(&keys::pending_claim_prefix(&native))
            .await?;
        Ok(!pending.is_empty())
    }

    /// Whether this exact (native, blockchain) pair is pending.
    pub async fn has_pending_claim_for(
        &self,
        native_address: &str,
        blockchain_address: &str,
    ) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;
        self.store
            .exists(&keys::pending_claim(&native, &blockchain))
            .await
    }

    /// Conditionally create a pending claim with the 5-minute TTL.
    /// Returns false when another pending claim won the create race.
    pub async fn store_pending_claim(
        &self,
        native_address: &str,
        blockchain_address: &str,
    ) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;
        self.store
            .set_nx_px(
                &keys::pending_claim(&native, &blockchain),
                "1",
                keys::PENDING_CLAIM_TTL_MS,
            )
            .await
    }

    /// Promote the pending claim of `native_address` to a permanent one.
    /// Returns the blockchain address it was bound to, or `None` when no
    /// pending claim exists (it may have expired).
    pub async fn confirm_claim(
        &self,
        native_address: &str,
    ) -> Result<Option<String>, BridgeError> {
        let native = canonical_native(native_address);
        let pending = self
            .store
            .scan(&keys::pending_claim_prefix(&native))
            .await?;
        let Some(pending_key) = pending.first() else {
            return Ok(None);
        };
        let prefix = format!("claims:pending:{native}:");
        let Some(blockchain) = pending_key.strip_prefix(&prefix) else {
            return Err(BridgeError::StoreTransaction(format!(
                "malformed pending claim key {pending_key}"
            )));
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.store
            .multi(vec![
                WriteOp::Set {
                    key: keys::claim(&native, blockchain),
                    value: "1".into(),
                },
                WriteOp::ZAdd {
                    key: keys::claims_by_blockchain(blockchain),
                    member: native.clone(),
                    score: now_ms,
                },
                WriteOp::Delete {
                    key: pending_key.clone(),
                },
            ])
            .await?;
        Ok(Some(blockchain.to_string()))
    }

    /// Whether the native address has any confirmed claim.
    pub async fn is_claimed(&self, native_address: &str) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let claims = self.store.scan(&keys::claim_prefix(&native)).await?;
        Ok(!claims.is_empty())
    }

    /// Whether this exact (native, blockchain) binding is confirmed.
    pub async fn has_claim(
        &self,
        native_address: &str,
        blockchain_address: &str,
    ) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;
        self.store.exists(&keys::claim(&native, &blockchain)).await
    }

    /// Native addresses bound to a blockchain address, oldest first.
    pub async fn native_addresses_for_blockchain_address(
        &self,
        blockchain_address: &str,
    ) -> Result<Vec<String>, BridgeError> {
        let blockchain = canonical_blockchain(blockchain_address)?;
        let members = self
            .store
            .zrange(&keys::claims_by_blockchain(&blockchain), 0, -1)
            .await?;
        Ok(members.into_iter().map(|(member, _)| member).collect())
    }

    // ---- gasless swap mark ---------------------------------------------

    pub async fn has_free_swap(&self, native_address: &str) -> Result<bool, BridgeError> {
        let native = canonical_native(native_address);
        self.store.exists(&keys::gasless_swap(&native)).await
    }

    /// Record consumption of the one-time gasless-swap allowance.
    pub async fn store_free_swap(
        &self,
        native_address: &str,
        txn_id: &str,
    ) -> Result<(), BridgeError> {
        let native = canonical_native(native_address);
        self.store.set(&keys::gasless_swap(&native), txn_id).await
    }

    // ---- chain checkpoint ----------------------------------------------

    pub async fn last_processed_block(&self) -> Result<u64, BridgeError> {
        match self.store.get(keys::LAST_PROCESSED_BLOCK).await? {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                BridgeError::StoreTransaction(format!("corrupt checkpoint value {value}"))
            }),
            None => Ok(self.default_start_block),
        }
    }

    /// Advance the checkpoint. Monotone: writes only when `block` is
    /// greater than the stored value.
    pub async fn set_last_processed_block(&self, block: u64) -> Result<(), BridgeError> {
        let current = self.last_processed_block().await?;
        if block <= current {
            debug!(block, current, "Checkpoint not advanced");
            return Ok(());
        }
        self.store
            .set(keys::LAST_PROCESSED_BLOCK, &block.to_string())
            .await
    }

    // ---- history --------------------------------------------------------

    fn link_for(&self, kind: AuditKind, id: &str) -> Option<String> {
        match kind {
            AuditKind::Deposit | AuditKind::Withdrawal => {
                Some(format!("{NATIVE_EXPLORER_URL}/{id}"))
            }
            AuditKind::SwapToBan => {
                Some(format!("{}/tx/{id}", self.blockchain_explorer_url))
            }
            // Mint receipts are off-chain authorizations; nothing to link.
            AuditKind::SwapToWban => None,
        }
    }

    async fn hydrate(
        &self,
        members: Vec<(String, i64)>,
    ) -> Result<Vec<HistoryEntry>, BridgeError> {
        let mut entries = Vec::with_capacity(members.len());
        for (id, score) in members {
            let fields: HashMap<String, String> =
                self.store.hgetall(&keys::audit(&id)).await?;
            let Some(kind) = fields.get("type").and_then(|t| AuditKind::parse(t)) else {
                warn!(id = %id, "Audit entry missing or untyped, skipping");
                continue;
            };
            entries.push(HistoryEntry {
                kind: kind.as_str().to_string(),
                link: self.link_for(kind, &id),
                amount: fields.get("amount").cloned().unwrap_or_else(|| "0".into()),
                timestamp_ms: score,
                id,
            });
        }
        Ok(entries)
    }

    /// Most recent deposits, newest first, capped at 1000.
    pub async fn deposits(&self, native_address: &str) -> Result<Vec<HistoryEntry>, BridgeError> {
        let native = canonical_native(native_address);
        let members = self
            .store
            .zrevrange(&keys::deposits(&native), 0, HISTORY_LIMIT as isize - 1)
            .await?;
        self.hydrate(members).await
    }

    /// Most recent withdrawals, newest first, capped at 1000.
    pub async fn withdrawals(
        &self,
        native_address: &str,
    ) -> Result<Vec<HistoryEntry>, BridgeError> {
        let native = canonical_native(native_address);
        let members = self
            .store
            .zrevrange(&keys::withdrawals(&native), 0, HISTORY_LIMIT as isize - 1)
            .await?;
        self.hydrate(members).await
    }

    /// Swap history in both directions, newest first, capped at 1000.
    pub async fn swaps(
        &self,
        blockchain_address: &str,
        native_address: &str,
    ) -> Result<Vec<HistoryEntry>, BridgeError> {
        let native = canonical_native(native_address);
        let blockchain = canonical_blockchain(blockchain_address)?;
        let to_wban = self
            .store
            .zrevrange(&keys::swaps_ban_to_wban(&native), 0, HISTORY_LIMIT as isize - 1)
            .await?;
        let to_ban = self
            .store
            .zrevrange(
                &keys::swaps_wban_to_ban(&blockchain),
                0,
                HISTORY_LIMIT as isize - 1,
            )
            .await?;
        let mut entries = self.hydrate(to_wban).await?;
        entries.extend(self.hydrate(to_ban).await?);
        entries.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        entries.truncate(HISTORY_LIMIT);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const BC_A: &str = "0x00000000000000000000000000000000000000aa";
    const BC_B: &str = "0x00000000000000000000000000000000000000bb";

    fn ledger() -> LedgerStore {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        LedgerStore::new(store, 100, "https://bscscan.com".to_string())
    }

    #[tokio::test]
    async fn test_deposit_then_balance() {
        let ledger = ledger();
        ledger
            .store_deposit("ban_a", U256::from(500), 1000, "h1")
            .await
            .unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(500));
        assert!(ledger.contains_deposit("ban_a", "h1").await.unwrap());
        assert!(!ledger.contains_deposit("ban_a", "h2").await.unwrap());
    }

    #[tokio::test]
    async fn test_balance_missing_is_zero() {
        let ledger = ledger();
        assert_eq!(ledger.balance("ban_nobody").await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn test_addresses_normalized_before_keying() {
        let ledger = ledger();
        ledger
            .store_deposit("BAN_A", U256::from(500), 1000, "h1")
            .await
            .unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(500));
        assert_eq!(ledger.balance("Ban_A").await.unwrap(), U256::from(500));
    }

    #[tokio::test]
    async fn test_withdrawal_debits_and_records_request() {
        let ledger = ledger();
        ledger
            .store_deposit("ban_a", U256::from(1000), 1000, "h1")
            .await
            .unwrap();
        ledger
            .store_withdrawal("ban_a", U256::from(300), 2000, "h2")
            .await
            .unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(700));
        assert!(ledger
            .contains_withdrawal_request("ban_a", 2000)
            .await
            .unwrap());
        assert!(!ledger
            .contains_withdrawal_request("ban_a", 2001)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_withdrawal_never_goes_negative() {
        let ledger = ledger();
        ledger
            .store_deposit("ban_a", U256::from(100), 1000, "h1")
            .await
            .unwrap();
        let err = ledger
            .store_withdrawal("ban_a", U256::from(250), 2000, "h2")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientBalance { .. }));
        // Failed transition left no visible state.
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(100));
        assert!(!ledger
            .contains_withdrawal_request("ban_a", 2000)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_swap_to_wban_debits_and_records_receipt() {
        let ledger = ledger();
        ledger
            .store_deposit("ban_a", U256::from(1000), 1000, "h1")
            .await
            .unwrap();
        ledger
            .store_swap_to_wban("ban_a", BC_A, U256::from(400), 2000, "r1", "uuid-1")
            .await
            .unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), U256::from(600));

        let swaps = ledger.swaps(BC_A, "ban_a").await.unwrap();
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].kind, "swap-to-wban");
        assert_eq!(swaps[0].id, "r1");
        assert!(swaps[0].link.is_none());
    }

    #[tokio::test]
    async fn test_swap_to_ban_is_idempotent() {
        let ledger = ledger();
        let amount = crate::amounts::parse_ban("1.5").unwrap();
        let record = SwapToBanRecord {
            blockchain_address: BC_B.to_string(),
            native_address: "ban_a".to_string(),
            amount,
            hash: "h4".to_string(),
            timestamp_ms: 10_000,
            wban_balance: U256::ZERO,
        };
        ledger.store_swap_to_ban(&record).await.unwrap();
        ledger.store_swap_to_ban(&record).await.unwrap();
        assert_eq!(ledger.balance("ban_a").await.unwrap(), amount);
        assert!(ledger.contains_swap_to_ban(BC_B, "h4").await.unwrap());

        let swaps = ledger.swaps(BC_B, "ban_a").await.unwrap();
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].kind, "swap-to-ban");
        assert_eq!(
            swaps[0].link.as_deref(),
            Some("https://bscscan.com/tx/h4")
        );
    }

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let ledger = ledger();
        assert!(!ledger.has_pending_claim("ban_a").await.unwrap());
        assert!(ledger.store_pending_claim("ban_a", BC_A).await.unwrap());
        assert!(ledger.has_pending_claim("ban_a").await.unwrap());
        assert!(ledger.has_pending_claim_for("ban_a", BC_A).await.unwrap());
        assert!(!ledger.is_claimed("ban_a").await.unwrap());

        // conditional create loses once a pending claim exists
        assert!(!ledger.store_pending_claim("ban_a", BC_B).await.unwrap());

        let bound = ledger.confirm_claim("ban_a").await.unwrap();
        assert_eq!(bound.as_deref(), Some(BC_A));
        assert!(ledger.is_claimed("ban_a").await.unwrap());
        assert!(ledger.has_claim("ban_a", BC_A).await.unwrap());
        assert!(!ledger.has_claim("ban_a", BC_B).await.unwrap());
        assert!(!ledger.has_pending_claim("ban_a").await.unwrap());

        // confirm with nothing pending is a no-op
        assert_eq!(ledger.confirm_claim("ban_a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reverse_claim_index() {
        let ledger = ledger();
        ledger.store_pending_claim("ban_a", BC_A).await.unwrap();
        ledger.confirm_claim("ban_a").await.unwrap();
        ledger.store_pending_claim("ban_b", BC_A).await.unwrap();
        ledger.confirm_claim("ban_b").await.unwrap();

        let natives = ledger
            .native_addresses_for_blockchain_address(BC_A)
            .await
            .unwrap();
        assert_eq!(natives.len(), 2);
        assert!(natives.contains(&"ban_a".to_string()));
        assert!(natives.contains(&"ban_b".to_string()));
    }

    #[tokio::test]
    async fn test_checkpoint_monotone() {
        let ledger = ledger();
        // default from config when absent
        assert_eq!(ledger.last_processed_block().await.unwrap(), 100);
        ledger.set_last_processed_block(500).await.unwrap();
        assert_eq!(ledger.last_processed_block().await.unwrap(), 500);
        ledger.set_last_processed_block(400).await.unwrap();
        assert_eq!(ledger.last_processed_block().await.unwrap(), 500);
        ledger.set_last_processed_block(500).await.unwrap();
        assert_eq!(ledger.last_processed_block().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_free_swap_mark() {
        let ledger = ledger();
        assert!(!ledger.has_free_swap("ban_a").await.unwrap());
        ledger.store_free_swap("ban_a", "txn-1").await.unwrap();
        assert!(ledger.has_free_swap("ban_a").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_ordering_and_cap() {
        let ledger = ledger();
        for i in 0..1200u64 {
            ledger
                .store_deposit("ban_a", U256::from(1), 1000 + i as i64, &format!("h{i}"))
                .await
                .unwrap();
        }
        let deposits = ledger.deposits("ban_a").await.unwrap();
        assert_eq!(deposits.len(), 1000);
        // newest first
        assert_eq!(deposits[0].id, "h1199");
        assert_eq!(deposits[0].timestamp_ms, 2199);
        assert!(deposits
            .windows(2)
            .all(|w| w[0].timestamp_ms >= w[1].timestamp_ms));
        assert_eq!(
            deposits[0].link.as_deref(),
            Some("https://creeper.banano.cc/explorer/block/h1199")
        );
    }
}
