//! # Utilities Module
//!
//! This module contains helper functions and utilities used
//! across the backend service.
//!
//! Amounts never pass through floating point: API strings are parsed
//! straight into integer base units and formatted back the same way.

use chrono::{DateTime, TimeZone, Utc};

/// Parse a decimal string into base units with `decimals` places.
///
/// ## Arguments
///
/// * `amount_str` - Amount like `"100.50"` or `"1,250"`
/// * `decimals` - Decimal places of the unit
///
/// ## Examples
///
/// ```rust,ignore
/// assert_eq!(parse_units("100.5", 6)?, 100_500_000);
/// assert_eq!(parse_units("0.000001", 6)?, 1);
/// ```
///
/// ## Errors
///
/// Rejects signs, more fractional digits than `decimals`, and values
/// that do not fit in `u128`.
pub fn parse_units(amount_str: &str, decimals: u8) -> Result<u128, String> {
    let cleaned = amount_str.trim().replace(',', "");
    if cleaned.is_empty() {
        return Err("Amount is empty".to_string());
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(format!("Invalid amount: {}", amount_str));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Invalid amount: {}", amount_str));
    }
    if frac.len() > decimals as usize {
        return Err(format!(
            "Too many decimal places in {} (max {})",
            amount_str, decimals
        ));
    }

    let scale = pow10(decimals)?;
    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| format!("Amount too large: {}", amount_str))?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded
            .parse::<u128>()
            .map_err(|_| format!("Invalid amount: {}", amount_str))?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| format!("Amount too large: {}", amount_str))
}

/// Format base units as a human-readable decimal with thousands
/// separators, rounded half-up to `precision` places.
///
/// ## Examples
///
/// ```rust,ignore
/// assert_eq!(format_units(1_234_567_890, 6, 2), "1,234.57");
/// ```
pub fn format_units(amount: u128, decimals: u8, precision: u8) -> String {
    let (whole, frac) = if precision >= decimals {
        let scale = pow10(decimals).unwrap_or(1);
        let pad = pow10(precision - decimals).unwrap_or(1);
        (amount / scale, (amount % scale) * pad)
    } else {
        let drop = pow10(decimals - precision).unwrap_or(1);
        let rounded = amount.saturating_add(drop / 2) / drop;
        let keep = pow10(precision).unwrap_or(1);
        (rounded / keep, rounded % keep)
    };

    let whole_str = group_thousands(whole);
    if precision == 0 {
        whole_str
    } else {
        format!("{}.{:0width$}", whole_str, frac, width = precision as usize)
    }
}

/// Format an 18-decimal USD value as `$1,234.57`.
pub fn format_usd(usd18: u128) -> String {
    format!("${}", format_units(usd18, 18, 2))
}

/// `part / whole` in basis points, 0 when `whole` is 0.
pub fn ratio_bps(part: u128, whole: u128) -> u32 {
    if whole == 0 {
        return 0;
    }
    let bps = part.saturating_mul(10_000) / whole;
    bps.min(u32::MAX as u128) as u32
}

/// Convert a unix timestamp from the engine into a UTC datetime.
pub fn unix_to_datetime(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn pow10(exp: u8) -> Result<u128, String> {
    10u128
        .checked_pow(exp as u32)
        .ok_or_else(|| format!("Unsupported decimals: {}", exp))
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
