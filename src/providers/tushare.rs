use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{NavHistorySource, NavPoint, NavSeries};

pub const NAME: &str = "tushare";

const TIMEOUT: Duration = Duration::from_secs(12);
const PAGE_SIZE: usize = 365;

/// Token-gated NAV source. One POST endpoint multiplexes every API by
/// `api_name`; rows come back as loosely-typed arrays.
pub struct TushareNavSource {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl TushareNavSource {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        Ok(TushareNavSource {
            base_url: base_url.to_string(),
            token,
            client: http_client(TIMEOUT)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    data: Option<TushareData>,
}

#[derive(Debug, Deserialize)]
struct TushareData {
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

fn response_ok(code: &Value) -> bool {
    code.as_i64() == Some(0) || code.as_str() == Some("0")
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

// Rows are [ts_code, nav_date, unit_nav]; unit_nav may arrive as number
// or string depending on the api tier.
fn parse_row(row: &[Value]) -> Option<NavPoint> {
    let date = parse_date(row.get(1)?.as_str()?)?;
    let nav = match row.get(2)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some(NavPoint {
        date,
        nav,
        cumulative_nav: None,
    })
}

#[async_trait]
impl NavHistorySource for TushareNavSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configured(&self) -> bool {
        self.token.is_some()
    }

    #[instrument(name = "TushareNavFetch", skip(self), fields(code = %code))]
    async fn fetch_nav_history(&self, code: &str) -> Result<NavSeries, FetchError> {
        let token = self
            .token
            .as_deref()
            .ok_or(FetchError::Unconfigured("TUSHARE_TOKEN"))?;

        let ts_code = if code.ends_with(".OF") {
            code.to_string()
        } else {
            format!("{code}.OF")
        };
        debug!("Requesting fund_nav from {} for {}", self.base_url, ts_code);

        let body = json!({
            "api_name": "fund_nav",
            "token": token,
            "params": { "ts_code": ts_code },
            "fields": "ts_code,nav_date,unit_nav",
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(classify)?;
        let payload: TushareResponse = expect_success(response)?
            .json()
            .await
            .map_err(classify)?;

        if !response_ok(&payload.code) {
            return Err(FetchError::Parse(format!(
                "tushare response code {}",
                payload.code
            )));
        }

        let mut series: NavSeries = payload
            .data
            .map(|d| d.items)
            .unwrap_or_default()
            .iter()
            .take(PAGE_SIZE)
            .filter_map(|row| parse_row(row))
            .collect();

        series.sort_by_key(|point| point.date);
        series.dedup_by_key(|point| point.date);
        Ok(series)
    }
}
