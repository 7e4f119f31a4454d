//! Token-bucket rate limiting per `(policy, scope)` (§4.6).

use std::collections::HashMap;
use std::time::Duration;

use gateway_common::time::TimestampMs;
use tokio::sync::Mutex;

use crate::model::RateBucket;

/// A named rate-limit policy: sustained `rate` tokens/sec up to `burst`
/// capacity.
#[derive(Clone, Debug)]
pub struct Policy {
    pub name: &'static str,
    pub rate_per_sec: f64,
    pub burst: f64,
}

impl Policy {
    pub const GENERAL: Policy = Policy {
        name: "general",
        rate_per_sec: 100.0,
        burst: 200.0,
    };
    pub const PAYMENT_INIT: Policy = Policy {
        name: "payment-init",
        rate_per_sec: 20.0,
        burst: 40.0,
    };
    pub const PROCESSING: Policy = Policy {
        name: "processing",
        rate_per_sec: 50.0,
        burst: 50.0,
    };
}

/// The outcome of [`RateLimiter::try_acquire`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    Allowed,
    /// Caller should wait at least this long before retrying.
    Denied { retry_after: Duration },
}

/// Per-`(policy, scope)` token buckets, lazily refilled on access. `scope` is
/// typically a [`TeamSlug`](gateway_common::ids::TeamSlug) or the literal
/// string `"global"`.
pub struct RateLimiter {
    buckets: Mutex<HashMap<(&'static str, String), RateBucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to spend `cost` tokens from `policy`'s bucket for `scope`.
    pub async fn try_acquire(
        &self,
        policy: &Policy,
        scope: &str,
        cost: f64,
    ) -> Decision {
        let now = TimestampMs::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((policy.name, scope.to_string()))
            .or_insert_with(|| RateBucket {
                tokens: policy.burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refill = elapsed.as_secs_f64() * policy.rate_per_sec;
        bucket.tokens = (bucket.tokens + refill).min(policy.burst);
        bucket.last_refill = now;

        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            Decision::Allowed
        } else {
            let deficit = cost - bucket.tokens;
            let seconds_to_next_token = deficit / policy.rate_per_sec;
            Decision::Denied {
                retry_after: Duration::from_secs_f64(
                    seconds_to_next_token.max(0.0),
                ),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_burst_then_denies() {
        let limiter = RateLimiter::new();
        let policy = Policy {
            name: "test",
            rate_per_sec: 1.0,
            burst: 3.0,
        };
        for _ in 0..3 {
            assert_eq!(
                limiter.try_acquire(&policy, "merchant-a", 1.0).await,
                Decision::Allowed
            );
        }
        match limiter.try_acquire(&policy, "merchant-a", 1.0).await {
            Decision::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO)
            }
            Decision::Allowed => panic!("expected denial after exhausting burst"),
        }
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let limiter = RateLimiter::new();
        let policy = Policy {
            name: "test",
            rate_per_sec: 1.0,
            burst: 1.0,
        };
        assert_eq!(
            limiter.try_acquire(&policy, "merchant-a", 1.0).await,
            Decision::Allowed
        );
        // A different scope has its own bucket.
        assert_eq!(
            limiter.try_acquire(&policy, "merchant-b", 1.0).await,
            Decision::Allowed
        );
    }

    #[tokio::test]
    async fn refills_over_time() {
        let limiter = RateLimiter::new();
        let policy = Policy {
            name: "test",
            rate_per_sec: 100.0,
            burst: 1.0,
        };
        assert_eq!(
            limiter.try_acquire(&policy, "m", 1.0).await,
            Decision::Allowed
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            limiter.try_acquire(&policy, "m", 1.0).await,
            Decision::Allowed
        );
    }
}
