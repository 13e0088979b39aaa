//! Amount parsing and display formatting.

use alloy_primitives::{utils, Address, B256, U256};
use chrono::{Local, TimeZone};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("invalid amount {0:?}")]
    Invalid(String),
}

/// Parse a decimal ether amount (`"0.5"`) into wei. Zero is accepted here;
/// callers that need a strictly positive amount check for it.
pub fn parse_ether(amount: &str) -> Result<U256, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }
    if amount.starts_with('-') {
        return Err(AmountError::NotPositive);
    }
    utils::parse_ether(amount).map_err(|_| AmountError::Invalid(amount.to_string()))
}

/// Parse an amount that must be strictly greater than zero.
pub fn parse_positive_ether(amount: &str) -> Result<U256, AmountError> {
    let wei = parse_ether(amount)?;
    if wei.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(wei)
}

/// Render `value / 10^decimals` rounded to `places` fractional digits, with
/// trailing zeros trimmed.
fn format_fixed(value: U256, decimals: u32, places: u32) -> String {
    let places = places.min(decimals);
    let step = U256::from(10u64).pow(U256::from(decimals - places));
    let rounded = if step > U256::from(1u64) {
        (value + step / U256::from(2u64)) / step
    } else {
        value
    };
    let scale = U256::from(10u64).pow(U256::from(places));
    let whole = rounded / scale;
    let frac = rounded % scale;
    if places == 0 || frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = places as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Wei as ether with at most four decimals.
pub fn format_ether(wei: U256) -> String {
    format_fixed(wei, 18, 4)
}

/// Wei as gwei with at most two decimals.
pub fn format_gwei(wei: U256) -> String {
    format_fixed(wei, 9, 2)
}

pub(crate) fn shorten(text: &str, len: usize) -> String {
    if text.len() <= 2 * len + 2 {
        return text.to_string();
    }
    format!("{}...{}", &text[..len + 2], &text[text.len() - len..])
}

/// `0x1234...abcd` with `len` characters kept on each side.
pub fn format_address(address: &Address, len: usize) -> String {
    shorten(&address.to_checksum(None), len)
}

pub fn format_hash(hash: &B256, len: usize) -> String {
    shorten(&hash.to_string(), len)
}

/// Integer with thousands separators.
pub fn format_gas(gas: u64) -> String {
    let digits = gas.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Unix seconds in local time.
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
