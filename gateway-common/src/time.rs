use std::convert::TryFrom;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer, Serialize};

/// The number of milliseconds since the [`UNIX_EPOCH`].
///
/// Represented as a non-negative [`i64`] so it round-trips cleanly through
/// JSON numbers and SQL `bigint` columns alike.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct TimestampMs(i64);

impl TimestampMs {
    /// Returns the current time. Panics if the system clock is out of bounds
    /// (before 1970 or further out than ~292 million years).
    pub fn now() -> Self {
        Self::try_from(SystemTime::now()).expect("system clock out of bounds")
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, dur: Duration) -> Option<Self> {
        let millis = i64::try_from(dur.as_millis()).ok()?;
        self.0.checked_add(millis).map(Self)
    }

    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        let delta_ms = self.0.saturating_sub(earlier.0).max(0);
        Duration::from_millis(delta_ms as u64)
    }

    /// The calendar day this timestamp falls on, as a day-index since the
    /// epoch (UTC). Used to bucket per-day merchant limits (§8).
    pub fn day_index(self) -> i64 {
        self.0.div_euclid(86_400_000)
    }
}

impl From<TimestampMs> for SystemTime {
    fn from(ts: TimestampMs) -> Self {
        let millis =
            u64::try_from(ts.0).expect("non-negative invariant violated");
        UNIX_EPOCH + Duration::from_millis(millis)
    }
}

impl TryFrom<SystemTime> for TimestampMs {
    type Error = anyhow::Error;
    fn try_from(system_time: SystemTime) -> anyhow::Result<Self> {
        system_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .map(i64::try_from)
            .map(|res| res.map(Self))
            .context("Current time is before January 1st, 1970")?
            .context("Current time is more than 292 million years past epoch")
    }
}

impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = i64::deserialize(deserializer)?;
        if inner < 0 {
            return Err(de::Error::custom("timestamp must be non-negative"));
        }
        Ok(Self(inner))
    }
}
