use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{EstimateRecord, EstimateSource};

pub const NAME: &str = "xueqiu";

const TIMEOUT: Duration = Duration::from_secs(10);

/// Cookie-gated quote endpoint used as the estimate fallback. Funds are
/// addressed as `F{code}`.
pub struct XueqiuSource {
    base_url: String,
    cookie: Option<String>,
    client: reqwest::Client,
}

impl XueqiuSource {
    pub fn new(base_url: &str, cookie: Option<String>) -> anyhow::Result<Self> {
        Ok(XueqiuSource {
            base_url: base_url.to_string(),
            cookie,
            client: http_client(TIMEOUT)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    quote: Option<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    current: Option<f64>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

fn quote_time(timestamp_ms: Option<i64>) -> NaiveDateTime {
    timestamp_ms
        .and_then(|ts| Local.timestamp_millis_opt(ts).single())
        .map(|dt| dt.naive_local())
        .unwrap_or_else(|| Local::now().naive_local())
}

#[async_trait]
impl EstimateSource for XueqiuSource {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configured(&self) -> bool {
        self.cookie.is_some()
    }

    #[instrument(name = "XueqiuFetch", skip(self), fields(code = %code))]
    async fn fetch_estimate(&self, code: &str) -> Result<EstimateRecord, FetchError> {
        let cookie = self
            .cookie
            .as_deref()
            .ok_or(FetchError::Unconfigured("XUEQIU_COOKIE"))?;

        let url = format!("{}/v5/stock/quote.json", self.base_url);
        let symbol = format!("F{code}");
        debug!("Requesting quote from {} for {}", url, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .header("Cookie", cookie)
            .header("Referer", "https://xueqiu.com/")
            .send()
            .await
            .map_err(classify)?;
        let payload: QuoteResponse = expect_success(response)?
            .json()
            .await
            .map_err(classify)?;

        let quote = payload
            .data
            .and_then(|d| d.quote)
            .ok_or_else(|| FetchError::parse("quote missing"))?;
        let value = quote.current.filter(|v| *v > 0.0).ok_or_else(|| {
            // The endpoint answers 200 with a hollow quote for unknown or
            // unauthenticated symbols.
            FetchError::parse("empty quote")
        })?;

        Ok(EstimateRecord {
            code: code.to_string(),
            name: quote.name.unwrap_or_default(),
            value,
            change_pct: quote.percent.unwrap_or(0.0),
            as_of: quote_time(quote.timestamp),
            source: NAME,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_successful_quote_fetch() {
        let server = MockServer::start().await;
        let body = r#"{"data":{"quote":{"symbol":"F110022","current":3.15,"percent":1.2,"name":"易方达消费","timestamp":1754202600000}}}"#;
        Mock::given(method("GET"))
            .and(path("/v5/stock/quote.json"))
            .and(query_param("symbol", "F110022"))
            .and(header("Cookie", "xq_a_token=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let source = XueqiuSource::new(&server.uri(), Some("xq_a_token=abc".to_string())).unwrap();
        let record = source.fetch_estimate("110022").await.unwrap();

        assert_eq!(record.code, "110022");
        assert_eq!(record.value, 3.15);
        assert_eq!(record.change_pct, 1.2);
        assert_eq!(record.source, "xueqiu");
    }

    #[tokio::test]
    async fn test_missing_cookie_is_unconfigured() {
        let source = XueqiuSource::new("http://unused.test", None).unwrap();

        assert!(!source.configured());
        let err = source.fetch_estimate("110022").await.unwrap_err();
        assert_eq!(err, FetchError::Unconfigured("XUEQIU_COOKIE"));
    }

    #[tokio::test]
    async fn test_hollow_quote_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v5/stock/quote.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data":{"quote":{"current":0}}}"#),
            )
            .mount(&server)
            .await;

        let source = XueqiuSource::new(&server.uri(), Some("c".to_string())).unwrap();
        let err = source.fetch_estimate("110022").await.unwrap_err();

        assert!(matches!(err, FetchError::Parse(ref msg) if msg.contains("empty quote")));
    }
}
