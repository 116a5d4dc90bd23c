//! The owned market-data store: registry plus per-kind TTL caches.
//!
//! One instance is constructed at startup and injected (behind `Arc`) into
//! HTTP handlers and scheduled jobs. All concurrency discipline lives in
//! the per-kind caches; this type only decides keys and TTLs.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::cache::TtlCache;
use super::error::{FetchError, SourcesExhausted};
use super::model::{EstimateRecord, FundDirectorySource, FundSummary, NavSeries, ProviderStatus};
use super::registry::SourceRegistry;

const SUGGEST_TTL: Duration = Duration::from_secs(3600);
const CATALOG_TTL: Duration = Duration::from_secs(86400);
const CATALOG_KEY: &str = "all";

pub struct MarketData {
    registry: SourceRegistry,
    directory: Arc<dyn FundDirectorySource>,
    estimates: TtlCache<EstimateRecord>,
    navs: TtlCache<NavSeries>,
    suggests: TtlCache<Vec<FundSummary>>,
    catalog: TtlCache<Vec<FundSummary>>,
}

impl MarketData {
    pub fn new(
        registry: SourceRegistry,
        directory: Arc<dyn FundDirectorySource>,
        estimate_ttl: Duration,
        nav_ttl: Duration,
    ) -> Self {
        MarketData {
            registry,
            directory,
            estimates: TtlCache::new(estimate_ttl),
            navs: TtlCache::new(nav_ttl),
            suggests: TtlCache::new(SUGGEST_TTL),
            catalog: TtlCache::new(CATALOG_TTL),
        }
    }

    // The optional source restriction participates in the key so a pinned
    // source never serves another source's cached record.
    fn key(code: &str, only: Option<&str>) -> String {
        format!("{}::{}", only.unwrap_or("auto"), code)
    }

    pub async fn estimate(
        &self,
        code: &str,
        only: Option<&str>,
    ) -> Result<EstimateRecord, SourcesExhausted> {
        self.estimates
            .get_or_fetch(&Self::key(code, only), || {
                self.registry.resolve_estimate(code, only)
            })
            .await
    }

    pub async fn nav_history(
        &self,
        code: &str,
        only: Option<&str>,
    ) -> Result<NavSeries, SourcesExhausted> {
        self.navs
            .get_or_fetch(&Self::key(code, only), || {
                self.registry.resolve_nav(code, only)
            })
            .await
    }

    /// Post-close refresh path: bypasses freshness, overwrites on success.
    pub async fn force_refresh_nav(&self, code: &str) -> Result<NavSeries, SourcesExhausted> {
        self.navs
            .force_refresh(&Self::key(code, None), || {
                self.registry.resolve_nav(code, None)
            })
            .await
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<FundSummary>, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.suggests
            .get_or_fetch(query, || self.directory.suggest(query))
            .await
    }

    pub async fn catalog(&self) -> Result<Vec<FundSummary>, FetchError> {
        self.catalog
            .get_or_fetch(CATALOG_KEY, || self.directory.catalog())
            .await
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        self.registry.status()
    }

    /// Daily rollover: drop every cached record, whatever its kind.
    pub fn clear_all(&self) {
        info!("clearing all caches");
        self.estimates.clear();
        self.navs.clear();
        self.suggests.clear();
        self.catalog.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_second_call_within_ttl_is_a_pure_hit() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source.clone(), nav.clone(), Duration::from_secs(60));

        let first = market.estimate("110022", None).await.unwrap();
        let second = market.estimate("110022", None).await.unwrap();

        assert_eq!(first.value, second.value);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pinned_source_uses_its_own_cache_key() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source.clone(), nav, Duration::from_secs(60));

        let _ = market.estimate("110022", None).await.unwrap();
        let _ = market.estimate("110022", Some("stub-estimate")).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_all_forces_fresh_fetch() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source.clone(), nav.clone(), Duration::from_secs(60));

        let _ = market.estimate("110022", None).await.unwrap();
        let first_nav = market.nav_history("110022", None).await.unwrap();
        market.clear_all();
        let _ = market.estimate("110022", None).await.unwrap();
        let second_nav = market.nav_history("110022", None).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(nav.calls.load(Ordering::SeqCst), 2);
        assert_ne!(first_nav[0].nav, second_nav[0].nav);
    }

    #[tokio::test]
    async fn test_force_refresh_nav_bypasses_fresh_entry() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source, nav.clone(), Duration::from_secs(60));

        let _ = market.nav_history("110022", None).await.unwrap();
        let refreshed = market.force_refresh_nav("110022").await.unwrap();

        assert_eq!(nav.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed[0].nav, 2.0);
    }

    #[tokio::test]
    async fn test_returned_series_is_a_snapshot() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source, nav, Duration::from_secs(60));

        let mut series = market.nav_history("110022", None).await.unwrap();
        series[0].nav = 999.0;

        let cached = market.nav_history("110022", None).await.unwrap();
        assert_eq!(cached[0].nav, 1.0);
    }

    #[tokio::test]
    async fn test_empty_suggest_query_short_circuits() {
        let source = CountingEstimate::ok();
        let nav = CountingNav::ok();
        let market = market_with(source, nav, Duration::from_secs(60));

        let out = market.suggest("   ").await.unwrap();
        assert!(out.is_empty());
    }
}
