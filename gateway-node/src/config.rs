//! The gateway's configuration object (§6): `{DistributedLock, Queue,
//! Deadlock, RateLimit, Webhook}`, loadable from a TOML file and otherwise
//! defaulted to the values named throughout §4.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(rename = "DistributedLock")]
    pub distributed_lock: DistributedLockConfig,
    #[serde(rename = "Queue")]
    pub queue: QueueConfig,
    #[serde(rename = "Deadlock")]
    pub deadlock: DeadlockConfig,
    #[serde(rename = "RateLimit")]
    pub rate_limit: RateLimitConfig,
    #[serde(rename = "Webhook")]
    pub webhook: WebhookConfig,
}

impl GatewayConfig {
    /// Reads and parses `path` as TOML. Missing sections / fields fall back
    /// to their defaults, so an operator only needs to override what they
    /// care about.
    pub fn from_toml_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {path:?}"))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributedLockConfig {
    pub default_timeout_secs: u64,
    pub lease_duration_secs: u64,
    pub max_retries: u32,
    pub retry_delay_millis: u64,
}

impl Default for DistributedLockConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            lease_duration_secs: 60,
            max_retries: 3,
            retry_delay_millis: 50,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub workers: usize,
    pub processing_timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let d = gateway_core::queue::QueueConfig::default();
        Self {
            capacity: d.capacity,
            workers: d.workers,
            processing_timeout_secs: d.processing_timeout.as_secs(),
            retries: d.max_retries,
            backoff_base_secs: d.backoff_base.as_secs(),
        }
    }
}

impl QueueConfig {
    pub fn to_core(&self) -> gateway_core::queue::QueueConfig {
        let defaults = gateway_core::queue::QueueConfig::default();
        gateway_core::queue::QueueConfig {
            capacity: self.capacity,
            workers: self.workers,
            processing_timeout: Duration::from_secs(
                self.processing_timeout_secs,
            ),
            max_retries: self.retries,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_max: defaults.backoff_max,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeadlockConfig {
    pub interval_secs: u64,
    /// Carried for parity with §6's literal config shape; the detector
    /// itself has no per-wait timeout of its own (that's `DistributedLock`'s
    /// `defaultTimeout`).
    pub max_wait_secs: u64,
    pub auto_resolve: bool,
    pub history_cap: usize,
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        let d = gateway_core::deadlock::DeadlockConfig::default();
        Self {
            interval_secs: d.interval.as_secs(),
            max_wait_secs: 30,
            auto_resolve: d.auto_resolve,
            history_cap: d.history_cap,
        }
    }
}

impl DeadlockConfig {
    pub fn to_core(&self) -> gateway_core::deadlock::DeadlockConfig {
        gateway_core::deadlock::DeadlockConfig {
            interval: Duration::from_secs(self.interval_secs),
            auto_resolve: self.auto_resolve,
            history_cap: self.history_cap,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitPolicyConfig {
    pub rate: f64,
    pub burst: f64,
    /// `"team"` (per-`TeamSlug`) or `"global"` — how `scope` is derived when
    /// this policy is applied. Informational: the coordinator's built-in
    /// policies (§4.6) already pick their scope at each call site, the same
    /// way the teacher pins its server's rate limits in code rather than
    /// config.
    pub scope: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub policies: HashMap<String, RateLimitPolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut policies = HashMap::new();
        for policy in [
            gateway_core::rate_limit::Policy::GENERAL,
            gateway_core::rate_limit::Policy::PAYMENT_INIT,
            gateway_core::rate_limit::Policy::PROCESSING,
        ] {
            policies.insert(
                policy.name.to_string(),
                RateLimitPolicyConfig {
                    rate: policy.rate_per_sec,
                    burst: policy.burst,
                    scope: "team".to_string(),
                },
            );
        }
        Self { policies }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub poll_interval_millis: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        let d = gateway_core::webhook::WebhookConfig::default();
        Self {
            max_attempts: d.max_attempts,
            timeout_secs: 10,
            poll_interval_millis: d.poll_interval.as_millis() as u64,
        }
    }
}

impl WebhookConfig {
    pub fn to_core(&self) -> gateway_core::webhook::WebhookConfig {
        gateway_core::webhook::WebhookConfig {
            max_attempts: self.max_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_millis),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = GatewayConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: GatewayConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.queue.workers, config.queue.workers);
        assert_eq!(
            parsed.rate_limit.policies.len(),
            config.rate_limit.policies.len()
        );
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: GatewayConfig = toml::from_str(
            r#"
            [Queue]
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(parsed.queue.workers, 8);
        assert_eq!(parsed.queue.capacity, QueueConfig::default().capacity);
        assert_eq!(
            parsed.deadlock.interval_secs,
            DeadlockConfig::default().interval_secs
        );
    }
}
