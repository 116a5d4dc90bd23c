//! Normalized records and the capability traits upstream sources implement.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt::Display;

use super::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Estimate,
    NavHistory,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Estimate => write!(f, "estimate"),
            SourceKind::NavHistory => write!(f, "nav-history"),
        }
    }
}

/// Intraday valuation estimate for a fund. Lives only as long as the
/// estimate cache TTL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateRecord {
    pub code: String,
    pub name: String,
    pub value: f64,
    pub change_pct: f64,
    pub as_of: NaiveDateTime,
    pub source: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_nav: Option<f64>,
}

/// Published NAV history, ascending by date with unique dates. Adapters
/// normalize with sort + dedup before returning.
pub type NavSeries = Vec<NavPoint>;

#[derive(Debug, Clone, Serialize)]
pub struct FundSummary {
    pub code: String,
    pub name: String,
    pub pinyin: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: &'static str,
    pub kind: SourceKind,
    pub enabled: bool,
    pub configured: bool,
    pub ok: bool,
}

#[async_trait]
pub trait EstimateSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reports credential presence without network I/O.
    fn configured(&self) -> bool {
        true
    }

    async fn fetch_estimate(&self, code: &str) -> Result<EstimateRecord, FetchError>;
}

#[async_trait]
pub trait NavHistorySource: Send + Sync {
    fn name(&self) -> &'static str;

    fn configured(&self) -> bool {
        true
    }

    async fn fetch_nav_history(&self, code: &str) -> Result<NavSeries, FetchError>;
}

/// Fund name directory (search suggestions and the full catalog). Single
/// upstream, no fallback chain.
#[async_trait]
pub trait FundDirectorySource: Send + Sync {
    async fn suggest(&self, query: &str) -> Result<Vec<FundSummary>, FetchError>;

    async fn catalog(&self) -> Result<Vec<FundSummary>, FetchError>;
}
