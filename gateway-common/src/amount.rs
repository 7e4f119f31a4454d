//! Monetary amount (integer minor units) and currency code (§3).

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
#[error("amount must have 1 to 10 digits")]
pub struct InvalidAmount;

/// An amount in integer minor units (e.g. kopecks), 1 to 10 digits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Amount(u64);

const MAX_AMOUNT: u64 = 9_999_999_999;

impl Amount {
    pub fn from_minor_units(units: u64) -> Result<Self, InvalidAmount> {
        if units >= 1 && units <= MAX_AMOUNT {
            Ok(Self(units))
        } else {
            Err(InvalidAmount)
        }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let units = u64::deserialize(deserializer)?;
        Self::from_minor_units(units).map_err(de::Error::custom)
    }
}

/// An ISO 4217 currency code, stored as its 3-letter mnemonic.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Currency(String);

#[derive(Error, Debug, Eq, PartialEq)]
#[error("currency must be a 3-letter ISO 4217 code")]
pub struct InvalidCurrency;

impl Currency {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self("RUB".to_owned())
    }
}

impl std::str::FromStr for Currency {
    type Err = InvalidCurrency;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 3 && s.bytes().all(|b| b.is_ascii_alphabetic()) {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency)
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn amount_boundary() {
        assert!(Amount::from_minor_units(0).is_err());
        assert!(Amount::from_minor_units(1).is_ok());
        assert!(Amount::from_minor_units(MAX_AMOUNT).is_ok());
        assert!(Amount::from_minor_units(MAX_AMOUNT + 1).is_err());
    }

    #[test]
    fn default_currency_is_rub() {
        assert_eq!(Currency::default().as_str(), "RUB");
    }
}
