//! Merchant lookup with a bounded-TTL read-through cache (§4.2).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use gateway_common::ids::TeamSlug;
use gateway_common::time::TimestampMs;
use tokio::sync::RwLock;

use crate::model::Merchant;

/// The durable side of merchant lookups. A real deployment backs this with
/// the `teams` table (§6); core scope only needs the read path.
#[async_trait]
pub trait MerchantSource: Send + Sync {
    async fn load(&self, team_slug: &TeamSlug) -> Option<Merchant>;
}

/// An in-memory [`MerchantSource`], seeded directly — stands in for the
/// `teams` table in the parts of the system this crate actually exercises.
#[derive(Default)]
pub struct StaticMerchantSource {
    merchants: HashMap<TeamSlug, Merchant>,
}

impl StaticMerchantSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, merchant: Merchant) {
        self.merchants.insert(merchant.team_slug.clone(), merchant);
    }
}

#[async_trait]
impl MerchantSource for StaticMerchantSource {
    async fn load(&self, team_slug: &TeamSlug) -> Option<Merchant> {
        self.merchants.get(team_slug).cloned()
    }
}

struct CacheEntry {
    merchant: Merchant,
    cached_at: TimestampMs,
}

/// Read-through cache in front of a [`MerchantSource`], with a bounded TTL
/// (§4.2). Writes (out of core scope) invalidate by evicting the entry.
pub struct MerchantStore<S: MerchantSource> {
    source: S,
    ttl: Duration,
    cache: RwLock<HashMap<TeamSlug, CacheEntry>>,
}

impl<S: MerchantSource> MerchantStore<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, team_slug: &TeamSlug) -> Option<Merchant> {
        let now = TimestampMs::now();
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(team_slug) {
                if now.saturating_duration_since(entry.cached_at) < self.ttl {
                    return Some(entry.merchant.clone());
                }
            }
        }

        let merchant = self.source.load(team_slug).await?;
        let mut cache = self.cache.write().await;
        cache.insert(
            team_slug.clone(),
            CacheEntry {
                merchant: merchant.clone(),
                cached_at: now,
            },
        );
        Some(merchant)
    }

    /// Invalidates the cached entry for `team_slug`, forcing the next
    /// [`lookup`](Self::lookup) to read through.
    pub async fn invalidate(&self, team_slug: &TeamSlug) {
        self.cache.write().await.remove(team_slug);
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use gateway_common::amount::{Amount, Currency};

    use super::*;

    fn demo_merchant() -> Merchant {
        Merchant {
            team_slug: TeamSlug::from_str("demo-team").unwrap(),
            password_hash: "d3ad".repeat(16),
            active: true,
            success_url: None,
            fail_url: None,
            notification_url: None,
            supported_currencies: vec![Currency::default()],
            min_amount: Amount::from_minor_units(1000).unwrap(),
            max_amount: Amount::from_minor_units(9_999_999).unwrap(),
            daily_limit: Amount::from_minor_units(9_999_999).unwrap(),
            monthly_limit: Amount::from_minor_units(9_999_999).unwrap(),
        }
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let mut source = StaticMerchantSource::new();
        source.insert(demo_merchant());
        let store = MerchantStore::new(source, Duration::from_secs(60));

        let slug = TeamSlug::from_str("demo-team").unwrap();
        let first = store.lookup(&slug).await.unwrap();
        let second = store.lookup(&slug).await.unwrap();
        assert_eq!(first.team_slug, second.team_slug);
    }

    #[tokio::test]
    async fn unknown_team_is_none() {
        let store =
            MerchantStore::new(StaticMerchantSource::new(), Duration::from_secs(60));
        let slug = TeamSlug::from_str("nope-team").unwrap();
        assert!(store.lookup(&slug).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_reread() {
        let mut source = StaticMerchantSource::new();
        source.insert(demo_merchant());
        let store = MerchantStore::new(source, Duration::from_secs(60));
        let slug = TeamSlug::from_str("demo-team").unwrap();

        store.lookup(&slug).await.unwrap();
        store.invalidate(&slug).await;
        assert!(store.cache.read().await.get(&slug).is_none());
    }
}
