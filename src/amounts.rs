//! BAN amount conversions.
//!
//! The ledger stores integer base units with 18 decimals (wBAN precision).
//! The BAN network itself counts in raw with 29 decimals; the node client
//! converts at the boundary.

use alloy::primitives::U256;

use crate::error::BridgeError;

/// Decimals of a ledger base unit.
pub const BAN_DECIMALS: u32 = 18;

/// Decimals of BAN raw on the native network.
pub const BAN_RAW_DECIMALS: u32 = 29;

/// Parse a human-readable decimal BAN amount ("1.5") into base units.
///
/// Rejects empty input, signs, and more fractional digits than the base
/// unit can represent.
pub fn parse_ban(amount: &str) -> Result<U256, BridgeError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(BridgeError::InvalidAmount("empty amount".to_string()));
    }
    if amount.starts_with('-') || amount.starts_with('+') {
        return Err(BridgeError::InvalidAmount(format!(
            "signed amount not allowed: {amount}"
        )));
    }

    let (integer, fraction) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if integer.is_empty() && fraction.is_empty() {
        return Err(BridgeError::InvalidAmount(amount.to_string()));
    }
    if !integer.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(BridgeError::InvalidAmount(amount.to_string()));
    }
    if fraction.len() > BAN_DECIMALS as usize {
        return Err(BridgeError::InvalidAmount(format!(
            "more than {BAN_DECIMALS} fractional digits: {amount}"
        )));
    }

    let scale = U256::from(10u64).pow(U256::from(BAN_DECIMALS));
    let integer_part = if integer.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(integer, 10)
            .map_err(|_| BridgeError::InvalidAmount(amount.to_string()))?
    };
    let fraction_part = if fraction.is_empty() {
        U256::ZERO
    } else {
        let padded = U256::from_str_radix(fraction, 10)
            .map_err(|_| BridgeError::InvalidAmount(amount.to_string()))?;
        padded * U256::from(10u64).pow(U256::from(BAN_DECIMALS - fraction.len() as u32))
    };

    integer_part
        .checked_mul(scale)
        .and_then(|i| i.checked_add(fraction_part))
        .ok_or_else(|| BridgeError::InvalidAmount(format!("amount overflow: {amount}")))
}

/// Format base units back into a human-readable decimal, trimming
/// trailing fractional zeros.
pub fn format_ban(units: U256) -> String {
    let scale = U256::from(10u64).pow(U256::from(BAN_DECIMALS));
    let integer = units / scale;
    let fraction = units % scale;
    if fraction.is_zero() {
        return integer.to_string();
    }
    let frac = format!("{:0>width$}", fraction, width = BAN_DECIMALS as usize);
    format!("{}.{}", integer, frac.trim_end_matches('0'))
}

/// Parse a decimal base-unit string as persisted by the ledger.
pub fn parse_units(value: &str) -> Result<U256, BridgeError> {
    U256::from_str_radix(value.trim(), 10)
        .map_err(|_| BridgeError::InvalidAmount(value.to_string()))
}

/// Ledger base units to BAN network raw (29 decimals).
pub fn units_to_raw(units: U256) -> U256 {
    units * U256::from(10u64).pow(U256::from(BAN_RAW_DECIMALS - BAN_DECIMALS))
}

/// BAN network raw down to ledger base units, flooring sub-unit dust.
pub fn raw_to_units(raw: U256) -> U256 {
    raw / U256::from(10u64).pow(U256::from(BAN_RAW_DECIMALS - BAN_DECIMALS))
}
