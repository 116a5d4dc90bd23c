use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{classify, expect_success, http_client};
use crate::core::error::FetchError;
use crate::core::model::{FundDirectorySource, FundSummary};

const TIMEOUT: Duration = Duration::from_secs(12);
const SUGGEST_LIMIT: usize = 50;

/// Fund name directory: search suggestions plus the full code catalog.
/// Single upstream for each, so failures surface directly instead of
/// going through the fallback chain.
pub struct FundCatalog {
    suggest_base: String,
    catalog_base: String,
    client: reqwest::Client,
}

impl FundCatalog {
    pub fn new(suggest_base: &str, catalog_base: &str) -> anyhow::Result<Self> {
        Ok(FundCatalog {
            suggest_base: suggest_base.to_string(),
            catalog_base: catalog_base.to_string(),
            client: http_client(TIMEOUT)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    #[serde(rename = "Datas", default)]
    datas: Vec<SuggestRow>,
}

// Field casing varies between deployments of the endpoint.
#[derive(Debug, Deserialize)]
struct SuggestRow {
    #[serde(rename = "CODE", alias = "Code", alias = "_id", default)]
    code: String,
    #[serde(rename = "NAME", alias = "Name", default)]
    name: String,
    #[serde(rename = "PINYIN", alias = "Pinyin", default)]
    pinyin: String,
}

/// Catalog rows are JS arrays `[code, pinyin, name, type, full_pinyin]`.
fn parse_catalog_row(row: &Value) -> Option<FundSummary> {
    let row = row.as_array()?;
    if row.len() < 3 {
        return None;
    }
    let code = row[0].as_str()?;
    let name = row[2].as_str()?;
    if code.is_empty() || name.is_empty() {
        return None;
    }
    Some(FundSummary {
        code: code.to_string(),
        name: name.to_string(),
        pinyin: row[1].as_str().unwrap_or_default().to_string(),
    })
}

fn slice_js_array(body: &str) -> Result<&str, FetchError> {
    let open = body.find('[');
    let close = body.rfind(']');
    match (open, close) {
        (Some(open), Some(close)) if open < close => Ok(&body[open..=close]),
        _ => Err(FetchError::parse("catalog array not found")),
    }
}

#[async_trait]
impl FundDirectorySource for FundCatalog {
    #[instrument(name = "FundSuggest", skip(self), fields(query = %query))]
    async fn suggest(&self, query: &str) -> Result<Vec<FundSummary>, FetchError> {
        let url = format!("{}/FundSearch/api/FundSearchAPI.ashx", self.suggest_base);
        debug!("Requesting suggestions from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("m", "1"), ("key", query)])
            .send()
            .await
            .map_err(classify)?;
        let payload: SuggestResponse = expect_success(response)?
            .json()
            .await
            .map_err(classify)?;

        Ok(payload
            .datas
            .into_iter()
            .filter(|row| !row.code.is_empty())
            .take(SUGGEST_LIMIT)
            .map(|row| FundSummary {
                code: row.code,
                name: row.name,
                pinyin: row.pinyin,
            })
            .collect())
    }

    #[instrument(name = "FundCatalogFetch", skip(self))]
    async fn catalog(&self) -> Result<Vec<FundSummary>, FetchError> {
        let url = format!("{}/js/fundcode_search.js", self.catalog_base);
        debug!("Requesting catalog from {}", url);

        let response = self.client.get(&url).send().await.map_err(classify)?;
        let body = expect_success(response)?
            .text()
            .await
            .map_err(classify)?;

        let rows: Vec<Value> = serde_json::from_str(slice_js_array(&body)?)
            .map_err(|e| FetchError::Parse(format!("catalog array: {e}")))?;

        Ok(rows.iter().filter_map(parse_catalog_row).collect())
    }
}
