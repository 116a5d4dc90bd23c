use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{EstimateRecord, EstimateSource};

pub const NAME: &str = "fundgz";

const TIMEOUT: Duration = Duration::from_secs(8);

/// Free intraday estimate endpoint. Answers JSONP:
/// `jsonpgz({"fundcode":"110022","gsz":"1.2340",...});`
pub struct FundGzSource {
    base_url: String,
    client: reqwest::Client,
}

impl FundGzSource {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Ok(FundGzSource {
            base_url: base_url.to_string(),
            client: http_client(TIMEOUT)?,
        })
    }
}

// Every numeric field arrives as a string.
#[derive(Debug, Deserialize)]
struct FundGzPayload {
    fundcode: String,
    #[serde(default)]
    name: String,
    gsz: String,
    gszzl: String,
    gztime: String,
}

fn strip_jsonp(body: &str) -> Result<&str, FetchError> {
    let open = body.find('(');
    let close = body.rfind(')');
    match (open, close) {
        (Some(open), Some(close)) if open < close => Ok(&body[open + 1..close]),
        _ => Err(FetchError::parse("jsonp wrapper not found")),
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<f64, FetchError> {
    raw.parse()
        .map_err(|_| FetchError::Parse(format!("bad {field}: '{raw}'")))
}

#[async_trait]
impl EstimateSource for FundGzSource {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(name = "FundGzFetch", skip(self), fields(code = %code))]
    async fn fetch_estimate(&self, code: &str) -> Result<EstimateRecord, FetchError> {
        let url = format!("{}/js/{}.js", self.base_url, code);
        debug!("Requesting estimate from {}", url);

        let response = self.client.get(&url).send().await.map_err(classify)?;
        let body = expect_success(response)?
            .text()
            .await
            .map_err(classify)?;

        let payload: FundGzPayload = serde_json::from_str(strip_jsonp(&body)?)
            .map_err(|e| FetchError::Parse(format!("fundgz payload: {e}")))?;

        let as_of = NaiveDateTime::parse_from_str(&payload.gztime, "%Y-%m-%d %H:%M")
            .map_err(|_| FetchError::Parse(format!("bad gztime: '{}'", payload.gztime)))?;

        Ok(EstimateRecord {
            value: parse_decimal("gsz", &payload.gsz)?,
            change_pct: parse_decimal("gszzl", &payload.gszzl)?,
            code: payload.fundcode,
            name: payload.name,
            as_of,
            source: NAME,
        })
    }
}
