//! # Address
//!
//! 20-byte account identifier used for users, tokens, oracles, markets
//! and the engine's own components.
//!
//! Text form is `0x` followed by 40 hex digits, matching what wallets and
//! block explorers display.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::VaultError;

/// # Address
///
/// ## Example
/// ```rust
/// use briq_vault::Address;
///
/// let usdc: Address = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap();
/// assert!(!usdc.is_zero());
/// assert_eq!(usdc.to_string(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The null address. Rejected by every configuration setter.
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose low 8 bytes hold `value` big-endian.
    ///
    /// Handy for fixtures: `Address::from_low_u64(1)` is `0x00..01`.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `Err(InvalidAddress)` for the zero address, naming the field.
    pub fn ensure_non_zero(&self, what: &str) -> Result<(), VaultError> {
        if self.is_zero() {
            return Err(VaultError::InvalidAddress(format!("{} is the zero address", what)));
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if hex.len() != 40 {
            return Err(VaultError::InvalidAddress(format!(
                "expected 40 hex digits, got {}",
                hex.len()
            )));
        }

        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| VaultError::InvalidAddress(s.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| VaultError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
