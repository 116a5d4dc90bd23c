use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{NavHistorySource, NavPoint, NavSeries};

pub const NAME: &str = "pingzhong";

const TIMEOUT: Duration = Duration::from_secs(12);
const TREND_VAR: &str = "Data_netWorthTrend";

/// Scrape-style NAV fallback: the fund page ships its chart data as JS
/// variables; the net-worth trend array is lifted straight out of the
/// script body.
pub struct PingZhongSource {
    base_url: String,
    client: reqwest::Client,
}

impl PingZhongSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(PingZhongSource {
            base_url: base_url.to_string(),
            client: http_client(TIMEOUT)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TrendPoint {
    #[serde(default)]
    x: Option<i64>,
    #[serde(default)]
    y: Option<f64>,
}

/// Slices the `var Data_netWorthTrend = [...];` literal out of the script.
fn extract_trend(body: &str) -> Option<&str> {
    let var = body.find(TREND_VAR)?;
    let rest = &body[var..];
    let open = rest.find('[')?;
    let close = rest[open..].find("];")? + open;
    Some(&rest[open..=close])
}

// Trend timestamps are UTC milliseconds at CST midnight; convert in CST so
// the calendar date matches the published NAV date.
fn cst() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn to_point(point: &TrendPoint) -> Option<NavPoint> {
    let ts = point.x?;
    let nav = point.y?;
    let date = DateTime::from_timestamp_millis(ts)?
        .with_timezone(&cst())
        .date_naive();
    Some(NavPoint {
        date,
        nav,
        cumulative_nav: None,
    })
}

#[async_trait]
impl NavHistorySource for PingZhongSource {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(name = "PingZhongFetch", skip(self), fields(code = %code))]
    async fn fetch_nav_history(&self, code: &str) -> Result<NavSeries, FetchError> {
        let url = format!("{}/pingzhongdata/{}.js", self.base_url, code);
        debug!("Requesting trend script from {}", url);

        let response = self.client.get(&url).send().await.map_err(classify)?;
        let body = expect_success(response)?
            .text()
            .await
            .map_err(classify)?;

        // A script without the variable yields an empty series; the
        // orchestrator treats that as a failed attempt.
        let Some(raw) = extract_trend(&body) else {
            return Ok(Vec::new());
        };

        let points: Vec<TrendPoint> = serde_json::from_str(raw)
            .map_err(|e| FetchError::Parse(format!("trend array: {e}")))?;

        let mut series: NavSeries = points.iter().filter_map(to_point).collect();
        series.sort_by_key(|point| point.date);
        series.dedup_by_key(|point| point.date);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_server(code: &str, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/pingzhongdata/{code}.js")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_trend_extraction_and_dates() {
        // 1785513600000 = 2026-08-01 00:00 +08:00, 1785686400000 = 2026-08-03.
        let body = concat!(
            "var Data_ACWorthTrend = [[1,2]];",
            "var Data_netWorthTrend = [",
            r#"{"x":1785686400000,"y":3.15,"equityReturn":0.3,"unitMoney":""},"#,
            r#"{"x":1785513600000,"y":3.10,"equityReturn":0.1,"unitMoney":""}"#,
            "];var Data_grandTotal = [];"
        );
        let server = mock_server("110022", body).await;
        let source = PingZhongSource::new(&server.uri()).unwrap();

        let series = source.fetch_nav_history("110022").await.unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(series[0].nav, 3.10);
        assert_eq!(series[1].date, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(series[1].nav, 3.15);
    }

    #[tokio::test]
    async fn test_missing_variable_yields_empty_series() {
        let server = mock_server("110022", "var Something_Else = 1;").await;
        let source = PingZhongSource::new(&server.uri()).unwrap();

        let series = source.fetch_nav_history("110022").await.unwrap();

        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_array_is_a_parse_error() {
        let server = mock_server("110022", "var Data_netWorthTrend = [not json];").await;
        let source = PingZhongSource::new(&server.uri()).unwrap();

        let err = source.fetch_nav_history("110022").await.unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_rows_without_coordinates_are_dropped() {
        let body = r#"var Data_netWorthTrend = [{"x":1785686400000},{"y":3.0},{"x":1785513600000,"y":3.1}];"#;
        let server = mock_server("110022", body).await;
        let source = PingZhongSource::new(&server.uri()).unwrap();

        let series = source.fetch_nav_history("110022").await.unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].nav, 3.1);
    }
}
