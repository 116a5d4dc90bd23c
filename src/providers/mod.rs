//! Upstream source adapters and their registry wiring.

pub mod catalog;
pub mod eastmoney;
pub mod fundgz;
pub mod pingzhong;
pub mod tushare;
pub mod util;
pub mod xueqiu;

use anyhow::Result;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::model::{EstimateSource, NavHistorySource};
use crate::core::registry::SourceRegistry;

/// Builds the registry in fixed priority order: free sources first, the
/// credentialed ones appended and enabled only when their credential is
/// present.
pub fn build_registry(config: &AppConfig) -> Result<SourceRegistry> {
    let endpoints = &config.endpoints;
    let mut registry = SourceRegistry::new();

    registry.register_estimate(Arc::new(fundgz::FundGzSource::new(&endpoints.fundgz)?), true);
    let xueqiu = xueqiu::XueqiuSource::new(&endpoints.xueqiu, config.xueqiu_cookie.clone())?;
    let xueqiu_enabled = xueqiu.configured();
    registry.register_estimate(Arc::new(xueqiu), xueqiu_enabled);

    registry.register_nav(
        Arc::new(eastmoney::EastmoneyNavSource::new(&endpoints.eastmoney)?),
        true,
    );
    registry.register_nav(
        Arc::new(pingzhong::PingZhongSource::new(&endpoints.pingzhong)?),
        true,
    );
    let tushare = tushare::TushareNavSource::new(&endpoints.tushare, config.tushare_token.clone())?;
    let tushare_enabled = tushare.configured();
    registry.register_nav(Arc::new(tushare), tushare_enabled);

    Ok(registry)
}
