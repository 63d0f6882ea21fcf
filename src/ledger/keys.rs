//! Persisted key layout.
//!
//! The layout is wire-compatible with the deployed bridge: changing any
//! of these formats orphans user balances. Address segments are already
//! canonical (lowercase) when they reach this module.

/// Pending claims expire after five minutes.
pub const PENDING_CLAIM_TTL_MS: u64 = 300_000;

pub fn balance(native_address: &str) -> String {
    format!("ban-balance:{native_address}")
}

pub fn deposits(native_address: &str) -> String {
    format!("deposits:{native_address}")
}

pub fn withdrawals(native_address: &str) -> String {
    format!("withdrawals:{native_address}")
}

pub fn swaps_ban_to_wban(native_address: &str) -> String {
    format!("swaps:ban-to-wban:{native_address}")
}

pub fn swaps_wban_to_ban(blockchain_address: &str) -> String {
    format!("swaps:wban-to-ban:{blockchain_address}")
}

pub fn gasless_swap(native_address: &str) -> String {
    format!("swaps:gasless:{native_address}")
}

pub fn audit(id: &str) -> String {
    format!("audit:{id}")
}

pub fn pending_claim(native_address: &str, blockchain_address: &str) -> String {
    format!("claims:pending:{native_address}:{blockchain_address}")
}

pub fn pending_claim_prefix(native_address: &str) -> String {
    format!("claims:pending:{native_address}:*")
}

pub fn claim(native_address: &str, blockchain_address: &str) -> String {
    format!("claims:{native_address}:{blockchain_address}")
}

pub fn claim_prefix(native_address: &str) -> String {
    format!("claims:{native_address}:*")
}

/// Reverse index: native addresses that claimed a blockchain address.
/// Written atomically with the forward `claims:` key.
pub fn claims_by_blockchain(blockchain_address: &str) -> String {
    format!("claims:by-blockchain:{blockchain_address}")
}

pub const LAST_PROCESSED_BLOCK: &str = "blockchain:blocks:latest";

/// Lock resource protecting balance mutations of one account.
pub fn balance_lock(native_address: &str) -> String {
    format!("balance:{native_address}")
}

/// Lock resource protecting BAN -> wBAN swaps of one account.
pub fn swap_lock(native_address: &str) -> String {
    format!("swaps:ban-to-wban:{native_address}")
}
