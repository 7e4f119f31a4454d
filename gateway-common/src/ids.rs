//! Validated newtypes for the identifiers in the data model (§3).

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum IdError {
    #[error("team slug must be 3-50 chars of [A-Za-z0-9_-]")]
    InvalidTeamSlug,
    #[error("payment id must be 1-20 printable chars")]
    InvalidPaymentId,
    #[error("order id must be 1-36 chars")]
    InvalidOrderId,
}

/// A merchant's slug identifier: 3-50 chars, `[A-Za-z0-9_-]+`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct TeamSlug(String);

impl TeamSlug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        (3..=50).contains(&s.len())
            && s.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}

impl FromStr for TeamSlug {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdError::InvalidTeamSlug)
        }
    }
}

impl fmt::Display for TeamSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TeamSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// An externally-visible payment identifier: at most 20 printable chars,
/// unique and merchant-scoped.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && s.chars().count() <= 20
            && s.chars().all(|c| !c.is_control())
    }
}

impl FromStr for PaymentId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdError::InvalidPaymentId)
        }
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PaymentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// A merchant-supplied order id: at most 36 chars, unique with [`TeamSlug`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        !s.is_empty() && s.chars().count() <= 36
    }
}

impl FromStr for OrderId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdError::InvalidOrderId)
        }
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn team_slug_boundary() {
        assert!("ab".parse::<TeamSlug>().is_err());
        assert!("abc".parse::<TeamSlug>().is_ok());
        assert!("a".repeat(50).parse::<TeamSlug>().is_ok());
        assert!("a".repeat(51).parse::<TeamSlug>().is_err());
        assert!("demo-team_1".parse::<TeamSlug>().is_ok());
        assert!("demo team".parse::<TeamSlug>().is_err());
    }

    #[test]
    fn payment_id_boundary() {
        assert!("".parse::<PaymentId>().is_err());
        assert!("a".repeat(20).parse::<PaymentId>().is_ok());
        assert!("a".repeat(21).parse::<PaymentId>().is_err());
    }

    #[test]
    fn order_id_boundary() {
        assert!("".parse::<OrderId>().is_err());
        assert!("a".repeat(36).parse::<OrderId>().is_ok());
        assert!("a".repeat(37).parse::<OrderId>().is_err());
    }
}
