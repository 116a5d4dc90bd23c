use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{NavHistorySource, NavPoint, NavSeries};

pub const NAME: &str = "eastmoney";

const TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: usize = 365;

/// Primary NAV-history endpoint (`f10/lsjz`): paged JSON with string-typed
/// rows, newest first.
pub struct EastmoneyNavSource {
    base_url: String,
    client: reqwest::Client,
    page_size: usize,
}

impl EastmoneyNavSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(EastmoneyNavSource {
            base_url: base_url.to_string(),
            client: http_client(TIMEOUT)?,
            page_size: PAGE_SIZE,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LsjzResponse {
    #[serde(rename = "Data", default)]
    data: Option<LsjzData>,
}

#[derive(Debug, Deserialize)]
struct LsjzData {
    #[serde(rename = "LSJZList", default)]
    list: Vec<LsjzRow>,
}

#[derive(Debug, Deserialize)]
struct LsjzRow {
    #[serde(rename = "FSRQ", default)]
    date: String,
    #[serde(rename = "DWJZ", default)]
    nav: String,
    #[serde(rename = "LJJZ", default)]
    cumulative: String,
}

fn parse_row(row: &LsjzRow) -> Option<NavPoint> {
    let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d").ok()?;
    let nav: f64 = row.nav.trim().parse().ok()?;
    Some(NavPoint {
        date,
        nav,
        cumulative_nav: row.cumulative.trim().parse().ok(),
    })
}

#[async_trait]
impl NavHistorySource for EastmoneyNavSource {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(name = "EastmoneyNavFetch", skip(self), fields(code = %code))]
    async fn fetch_nav_history(&self, code: &str) -> Result<NavSeries, FetchError> {
        let url = format!("{}/f10/lsjz", self.base_url);
        debug!("Requesting NAV history from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fundCode", code),
                ("pageIndex", "1"),
                ("pageSize", &self.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(classify)?;
        let payload: LsjzResponse = expect_success(response)?
            .json()
            .await
            .map_err(classify)?;

        // Blank and unparsable rows are dropped rather than failing the
        // whole series.
        let mut series: NavSeries = payload
            .data
            .map(|d| d.list)
            .unwrap_or_default()
            .iter()
            .filter_map(parse_row)
            .collect();

        series.sort_by_key(|point| point.date);
        series.dedup_by_key(|point| point.date);
        Ok(series)
    }
}
