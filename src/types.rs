use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Canonical form of a BAN address: trimmed and lowercased.
///
/// Every comparison, hash and key segment uses this form; comparing a raw
/// input against a stored value is a bug.
pub fn canonical_native(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Canonical form of an EVM address: parsed, then lowercase hex with 0x
/// prefix. Used for key segments and comparisons.
pub fn canonical_blockchain(address: &str) -> Result<String, BridgeError> {
    let parsed = Address::from_str(address.trim())
        .map_err(|_| BridgeError::InvalidAddress(address.to_string()))?;
    Ok(format!("{parsed:#x}"))
}

/// EIP-55 checksummed form of an EVM address, for display and responses.
pub fn checksum_blockchain(address: &str) -> Result<String, BridgeError> {
    let parsed = Address::from_str(address.trim())
        .map_err(|_| BridgeError::InvalidAddress(address.to_string()))?;
    Ok(parsed.to_checksum(None))
}

/// Canonical message a user signs to claim a BAN address.
pub fn claim_message(native_address: &str) -> String {
    format!("I hereby claim that the BAN address \"{native_address}\" is mine")
}

/// Canonical message a user signs to withdraw BAN.
pub fn withdrawal_message(amount: &str, native_address: &str) -> String {
    format!("Withdraw {amount} BAN to my wallet \"{native_address}\"")
}

/// Canonical message a user signs to swap deposited BAN for wBAN.
pub fn swap_message(amount: &str, native_address: &str) -> String {
    format!(
        "Swap {amount} BAN for wBAN with BAN I deposited from my wallet \"{native_address}\""
    )
}

/// Discriminator tag of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    Deposit,
    Withdrawal,
    SwapToWban,
    SwapToBan,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Deposit => "deposit",
            AuditKind::Withdrawal => "withdrawal",
            AuditKind::SwapToWban => "swap-to-wban",
            AuditKind::SwapToBan => "swap-to-ban",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(AuditKind::Deposit),
            "withdrawal" => Some(AuditKind::Withdrawal),
            "swap-to-wban" => Some(AuditKind::SwapToWban),
            "swap-to-ban" => Some(AuditKind::SwapToBan),
            _ => None,
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation kinds accepted by the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    NativeWithdrawal,
    SwapToWban,
    SwapToBan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::NativeWithdrawal => "native-withdrawal",
            JobKind::SwapToWban => "swap-to-wban",
            JobKind::SwapToBan => "swap-to-ban",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "native-withdrawal" => Some(JobKind::NativeWithdrawal),
            "swap-to-wban" => Some(JobKind::SwapToWban),
            "swap-to-ban" => Some(JobKind::SwapToBan),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A wBAN -> BAN redemption to be credited on the ledger.
#[derive(Debug, Clone)]
pub struct SwapToBanRecord {
    pub blockchain_address: String,
    pub native_address: String,
    /// Base units.
    pub amount: U256,
    pub hash: String,
    pub timestamp_ms: i64,
    /// wBAN balance of the sender after the burn, as reported on-chain.
    pub wban_balance: U256,
}

/// One entry of a user's deposit/withdrawal/swap history, hydrated from
/// the audit store.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Transaction hash or mint-receipt identifier.
    pub id: String,
    /// Base units, decimal.
    pub amount: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Payload of a `native-withdrawal` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalJob {
    pub native_address: String,
    pub blockchain_address: String,
    /// Base units, decimal.
    pub amount: String,
    /// Client-supplied request timestamp; part of the idempotency key.
    pub timestamp_ms: i64,
    pub signature: Option<String>,
    /// How many times this withdrawal has been re-enqueued while the hot
    /// wallet was underfunded.
    #[serde(default)]
    pub attempt: u32,
}

/// Payload of a `swap-to-wban` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapToWbanJob {
    pub native_address: String,
    pub blockchain_address: String,
    /// Base units, decimal.
    pub amount: String,
    pub timestamp_ms: i64,
    pub signature: String,
}

/// Payload of a `swap-to-ban` job, produced by the chain scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapToBanJob {
    pub blockchain_address: String,
    pub native_address: String,
    /// Human-readable BAN amount as emitted by the contract event.
    pub amount: String,
    pub hash: String,
    pub event_timestamp_s: i64,
    /// wBAN balance of the sender after the burn, decimal base units.
    pub wban_balance: String,
}
