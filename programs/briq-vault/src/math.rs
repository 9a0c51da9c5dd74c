//! Fixed-point helpers.
//!
//! Products of an 18-decimal amount and an 8-decimal price overflow
//! `u128`, so every multiply-then-divide goes through a 256-bit
//! intermediate.

use crate::errors::{Result, VaultError};

// The macro expands to unqualified `Result<_, _>`, so it must not see the
// crate alias.
#[allow(clippy::assign_op_pattern, clippy::ptr_offset_with_cast)]
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer for intermediate products.
        pub struct U256(4);
    }
}

pub use wide::U256;

/// Scale of every USD value and every share amount.
pub const USD_DECIMALS: u8 = 18;

/// Scale of every internal price.
pub const PRICE_DECIMALS: u8 = 8;

/// One share (and one dollar) at 18 decimals.
pub const WAD: u128 = 1_000_000_000_000_000_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rounding {
    Floor,
    Ceiling,
}

/// `10^exp` as u128. Fails past 10^38.
pub fn pow10(exp: u32) -> Result<u128> {
    10u128.checked_pow(exp).ok_or(VaultError::Overflow)
}

/// Safe multiplication then division with configurable rounding.
///
/// Computes: (value × numerator) / denominator
pub fn mul_div(value: u128, numerator: u128, denominator: u128, rounding: Rounding) -> Result<u128> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }

    let product = U256::from(value)
        .checked_mul(U256::from(numerator))
        .ok_or(VaultError::Overflow)?;
    let denom = U256::from(denominator);

    let (quotient, remainder) = product.div_mod(denom);
    let result = match rounding {
        Rounding::Floor => quotient,
        Rounding::Ceiling if remainder.is_zero() => quotient,
        Rounding::Ceiling => quotient
            .checked_add(U256::one())
            .ok_or(VaultError::Overflow)?,
    };

    if result > U256::from(u128::MAX) {
        return Err(VaultError::Overflow);
    }
    Ok(result.as_u128())
}

/// Rescale `value` from `from` decimals to `to` decimals, rounding down
/// when precision is lost.
pub fn rescale(value: u128, from: u8, to: u8) -> Result<u128> {
    if from == to {
        Ok(value)
    } else if from < to {
        value
            .checked_mul(pow10(u32::from(to - from))?)
            .ok_or(VaultError::Overflow)
    } else {
        Ok(value / pow10(u32::from(from - to))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_floor() {
        assert_eq!(mul_div(100, 3, 2, Rounding::Floor).unwrap(), 150);
        assert_eq!(mul_div(100, 1, 3, Rounding::Floor).unwrap(), 33);
    }

    #[test]
    fn test_mul_div_ceiling() {
        assert_eq!(mul_div(100, 3, 2, Rounding::Ceiling).unwrap(), 150);
        assert_eq!(mul_div(100, 1, 3, Rounding::Ceiling).unwrap(), 34);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e12 WETH at $3,000 (8 decimals): 1e30 * 3e11 overflows u128.
        let amount = 1_000_000_000_000u128 * WAD;
        let price = 300_000_000_000u128;
        let usd = mul_div(amount, price, 100_000_000, Rounding::Floor).unwrap();
        assert_eq!(usd, 3_000u128 * amount);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            mul_div(100, 100, 0, Rounding::Floor),
            Err(VaultError::DivisionByZero)
        );
    }

    #[test]
    fn test_result_overflow() {
        assert_eq!(
            mul_div(u128::MAX, 2, 1, Rounding::Floor),
            Err(VaultError::Overflow)
        );
    }

    #[test]
    fn test_u256_holds_wide_products() {
        let product = U256::from(u128::MAX) * U256::from(4u8);
        assert!(product > U256::from(u128::MAX));
        assert_eq!(product / U256::from(4u8), U256::from(u128::MAX));
        assert_eq!(U256::from(7u8).checked_div(U256::zero()), None);
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(1_000_000, 6, 18).unwrap(), WAD);
        assert_eq!(rescale(WAD + 999, 18, 6).unwrap(), 1_000_000);
        assert!(rescale(u128::MAX, 0, 18).is_err());
    }
}
