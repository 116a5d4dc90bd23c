//! Core business logic: normalized records, the fetch-error taxonomy, the
//! TTL cache, source registry/fallback and derived computations.

pub mod breaker;
pub mod cache;
pub mod calendar;
pub mod error;
pub mod market;
pub mod model;
pub mod registry;
pub mod series;

// Re-export main types for cleaner imports
pub use error::{FetchError, FetchFailure, SourcesExhausted};
pub use market::MarketData;
pub use model::{
    EstimateRecord, EstimateSource, FundDirectorySource, FundSummary, NavHistorySource, NavPoint,
    NavSeries, ProviderStatus, SourceKind,
};
pub use registry::SourceRegistry;
