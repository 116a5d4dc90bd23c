//! Scheduled cache maintenance.
//!
//! One driver task ticks every 30 seconds and fires each trigger once when
//! local time passes its HH:MM. Jobs are plain functions over the shared
//! market store and the configured watch-list, so they stay testable
//! without the driver.

use chrono::{Local, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{info, warn};

use crate::core::MarketData;
use crate::core::calendar::is_trading_day;

const TICK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    PrewarmEstimates,
    RefreshNavHistory,
    ClearCaches,
}

#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    pub at: NaiveTime,
    pub trading_days_only: bool,
    pub job: Job,
}

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// Pre-warm before the morning open and the midday resumption, pull the
/// authoritative NAV after close, drop everything at day rollover.
pub fn triggers() -> Vec<Trigger> {
    vec![
        Trigger {
            at: at(9, 0),
            trading_days_only: true,
            job: Job::PrewarmEstimates,
        },
        Trigger {
            at: at(13, 0),
            trading_days_only: true,
            job: Job::PrewarmEstimates,
        },
        Trigger {
            at: at(20, 0),
            trading_days_only: true,
            job: Job::RefreshNavHistory,
        },
        Trigger {
            at: at(0, 0),
            trading_days_only: false,
            job: Job::ClearCaches,
        },
    ]
}

/// Whether the trigger's time-of-day fell inside `(prev, now]`, honoring
/// its trading-day gate. Checked against both dates so a tick spanning
/// midnight still fires the rollover.
pub fn due(trigger: &Trigger, prev: NaiveDateTime, now: NaiveDateTime) -> bool {
    let mut dates = vec![prev.date()];
    if now.date() != prev.date() {
        dates.push(now.date());
    }
    dates.into_iter().any(|date| {
        let fire_at = date.and_time(trigger.at);
        prev < fire_at
            && fire_at <= now
            && (!trigger.trading_days_only || is_trading_day(date))
    })
}

pub fn start(market: Arc<MarketData>, watch_codes: Vec<String>) {
    tokio::spawn(async move {
        info!(codes = watch_codes.len(), "maintenance scheduler started");
        let triggers = triggers();
        let mut tick = interval(TICK);
        let mut prev = Local::now().naive_local();
        loop {
            tick.tick().await;
            let now = Local::now().naive_local();
            for trigger in &triggers {
                if due(trigger, prev, now) {
                    run_job(trigger.job, &market, &watch_codes).await;
                }
            }
            prev = now;
        }
    });
}

async fn run_job(job: Job, market: &MarketData, watch_codes: &[String]) {
    info!(?job, "running scheduled job");
    match job {
        Job::PrewarmEstimates => prewarm_estimates(market, watch_codes).await,
        Job::RefreshNavHistory => refresh_nav_history(market, watch_codes).await,
        Job::ClearCaches => market.clear_all(),
    }
}

/// Warms the estimate cache so the first user request after open does not
/// pay upstream latency. One code's failure never stops the sweep.
pub async fn prewarm_estimates(market: &MarketData, watch_codes: &[String]) {
    for code in watch_codes {
        if let Err(err) = market.estimate(code, None).await {
            warn!(%code, error = %err, "estimate pre-warm failed");
        }
    }
}

/// The authoritative end-of-day NAV only exists after close, so this path
/// bypasses freshness instead of waiting out the TTL.
pub async fn refresh_nav_history(market: &MarketData, watch_codes: &[String]) {
    for code in watch_codes {
        if let Err(err) = market.force_refresh_nav(code).await {
            warn!(%code, error = %err, "nav refresh failed");
        }
    }
}
