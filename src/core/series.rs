//! Derived computations over normalized NAV series. Pure functions, no
//! caching of their own.

use chrono::NaiveDate;
use serde::Serialize;

use super::model::NavPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Simple moving average aligned to the input dates. The first emitted
/// point sits at the window-th input point; no partial-window values.
pub fn moving_average(series: &[NavPoint], window: usize) -> Vec<MaPoint> {
    if window == 0 || series.len() < window {
        return Vec::new();
    }

    let mut sum: f64 = series[..window].iter().map(|p| p.nav).sum();
    let mut out = Vec::with_capacity(series.len() - window + 1);
    out.push(MaPoint {
        date: series[window - 1].date,
        value: sum / window as f64,
    });
    for i in window..series.len() {
        sum += series[i].nav - series[i - window].nav;
        out.push(MaPoint {
            date: series[i].date,
            value: sum / window as f64,
        });
    }
    out
}

/// Most recent point on or before `date`. `None` when the date precedes
/// the entire series. Series is ascending, so scan from the back.
pub fn nav_on_or_before(series: &[NavPoint], date: NaiveDate) -> Option<&NavPoint> {
    series.iter().rev().find(|point| point.date <= date)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBreakdown {
    pub current_value: f64,
    pub total_cost: f64,
    pub pnl: f64,
    pub pnl_rate: Option<f64>,
}

/// Profit of a holding: `(unit_value - unit_cost) * shares`, with the
/// rate relative to total cost. A non-positive cost yields no rate.
pub fn holding_profit(unit_value: f64, unit_cost: f64, shares: f64) -> ProfitBreakdown {
    let current_value = unit_value * shares;
    let total_cost = unit_cost * shares;
    let pnl = current_value - total_cost;
    let pnl_rate = (total_cost > 0.0).then(|| pnl / total_cost * 100.0);
    ProfitBreakdown {
        current_value,
        total_cost,
        pnl,
        pnl_rate,
    }
}
