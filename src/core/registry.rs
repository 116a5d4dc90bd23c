//! Source registry and fallback orchestration.
//!
//! Sources are declared once per data kind in fixed priority order (free
//! endpoints first, credentialed ones appended). A resolve walks the
//! enabled sources sequentially and short-circuits on the first success;
//! there is no quorum, no merging and no per-source retry, so interactive
//! callers get a bounded-latency answer.

use std::sync::Arc;
use tracing::{debug, warn};

use super::breaker::CircuitBreaker;
use super::error::{FetchError, FetchFailure, SourcesExhausted};
use super::model::{EstimateRecord, EstimateSource, NavHistorySource, NavSeries, ProviderStatus, SourceKind};

struct Slot<T: ?Sized> {
    source: Arc<T>,
    enabled: bool,
}

#[derive(Default)]
pub struct SourceRegistry {
    estimate: Vec<Slot<dyn EstimateSource>>,
    nav: Vec<Slot<dyn NavHistorySource>>,
    breaker: CircuitBreaker,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order is priority order.
    pub fn register_estimate(&mut self, source: Arc<dyn EstimateSource>, enabled: bool) {
        self.estimate.push(Slot { source, enabled });
    }

    pub fn register_nav(&mut self, source: Arc<dyn NavHistorySource>, enabled: bool) {
        self.nav.push(Slot { source, enabled });
    }

    /// Status of every declared source, enabled or not. Cheap: credential
    /// presence and breaker state only, no network probe.
    pub fn status(&self) -> Vec<ProviderStatus> {
        let estimate = self.estimate.iter().map(|slot| {
            self.slot_status(slot.source.name(), SourceKind::Estimate, slot.enabled, slot.source.configured())
        });
        let nav = self.nav.iter().map(|slot| {
            self.slot_status(slot.source.name(), SourceKind::NavHistory, slot.enabled, slot.source.configured())
        });
        estimate.chain(nav).collect()
    }

    fn slot_status(
        &self,
        name: &'static str,
        kind: SourceKind,
        enabled: bool,
        configured: bool,
    ) -> ProviderStatus {
        ProviderStatus {
            name,
            kind,
            enabled,
            configured,
            ok: enabled && configured && self.breaker.allow(name),
        }
    }

    /// Resolves an intraday estimate, trying enabled sources in priority
    /// order. `only` restricts the attempt to a single caller-named source.
    pub async fn resolve_estimate(
        &self,
        code: &str,
        only: Option<&str>,
    ) -> Result<EstimateRecord, SourcesExhausted> {
        let mut attempts = Vec::new();
        for slot in candidates(&self.estimate, |s| s.name(), only) {
            let name = slot.source.name();
            if let Some(failure) = self.check_circuit(name, SourceKind::Estimate, code) {
                attempts.push(failure);
                continue;
            }
            match slot.source.fetch_estimate(code).await {
                Ok(record) => {
                    self.breaker.on_success(name);
                    debug!(source = name, code, "estimate resolved");
                    return Ok(record);
                }
                Err(error) => {
                    self.record_failure(&mut attempts, name, SourceKind::Estimate, code, error)
                }
            }
        }
        Err(SourcesExhausted {
            kind: SourceKind::Estimate,
            code: code.to_string(),
            attempts,
        })
    }

    /// Resolves NAV history. An empty series from a source counts as a
    /// failed attempt and falls through to the next source.
    pub async fn resolve_nav(
        &self,
        code: &str,
        only: Option<&str>,
    ) -> Result<NavSeries, SourcesExhausted> {
        let mut attempts = Vec::new();
        for slot in candidates(&self.nav, |s| s.name(), only) {
            let name = slot.source.name();
            if let Some(failure) = self.check_circuit(name, SourceKind::NavHistory, code) {
                attempts.push(failure);
                continue;
            }
            match slot.source.fetch_nav_history(code).await {
                Ok(series) if series.is_empty() => self.record_failure(
                    &mut attempts,
                    name,
                    SourceKind::NavHistory,
                    code,
                    FetchError::parse("empty nav series"),
                ),
                Ok(series) => {
                    self.breaker.on_success(name);
                    debug!(source = name, code, points = series.len(), "nav history resolved");
                    return Ok(series);
                }
                Err(error) => {
                    self.record_failure(&mut attempts, name, SourceKind::NavHistory, code, error)
                }
            }
        }
        Err(SourcesExhausted {
            kind: SourceKind::NavHistory,
            code: code.to_string(),
            attempts,
        })
    }

    fn check_circuit(
        &self,
        name: &'static str,
        kind: SourceKind,
        code: &str,
    ) -> Option<FetchFailure> {
        if self.breaker.allow(name) {
            return None;
        }
        debug!(source = name, code, "skipping source, circuit open");
        Some(FetchFailure {
            source: name,
            kind,
            code: code.to_string(),
            error: FetchError::CircuitOpen,
        })
    }

    fn record_failure(
        &self,
        attempts: &mut Vec<FetchFailure>,
        name: &'static str,
        kind: SourceKind,
        code: &str,
        error: FetchError,
    ) {
        warn!(source = name, code, %error, "source fetch failed");
        self.breaker.on_failure(name);
        attempts.push(FetchFailure {
            source: name,
            kind,
            code: code.to_string(),
            error,
        });
    }
}

fn candidates<'a, T: ?Sized>(
    slots: &'a [Slot<T>],
    name: impl Fn(&T) -> &'static str + 'a,
    only: Option<&'a str>,
) -> impl Iterator<Item = &'a Slot<T>> {
    slots
        .iter()
        .filter(|slot| slot.enabled)
        .filter(move |slot| only.is_none_or(|wanted| name(&slot.source) == wanted))
}
