//! HTTP surface: thin axum handlers over the market-data service. Parsing
//! and serialization only; every decision lives in `core`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::core::error::{FetchError, SourcesExhausted};
use crate::core::model::{EstimateRecord, FundSummary, NavSeries, ProviderStatus};
use crate::core::series::{MaPoint, holding_profit, moving_average, nav_on_or_before};
use crate::core::{MarketData, calendar};

const PRO_TREND_POINTS: usize = 240;

pub fn app_router(market: Arc<MarketData>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/healthz", get(healthz))
        .route("/api/real-time/estimate", get(real_time_estimate))
        .route("/api/history/nav/{code}", get(nav_history))
        .route("/api/history/ma-line/{code}", get(ma_line))
        .route("/api/chart/pro-trend/{code}", get(pro_trend))
        .route("/api/hold/profit", post(hold_profit))
        .route("/api/data/source-list", get(source_list))
        .route("/api/trade/status", get(trade_status))
        .route("/api/fund/suggest", get(fund_suggest))
        .route("/api/fund/catalog", get(fund_catalog))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(market)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Exhausted(#[from] SourcesExhausted),
    #[error("{0}")]
    Upstream(#[from] FetchError),
}

#[derive(Serialize)]
struct SourceFailureBody {
    source: &'static str,
    error: String,
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceFailureBody>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, sources) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, Vec::new()),
            ApiError::Exhausted(err) => (
                StatusCode::BAD_GATEWAY,
                err.attempts
                    .iter()
                    .map(|attempt| SourceFailureBody {
                        source: attempt.source,
                        error: attempt.error.to_string(),
                    })
                    .collect(),
            ),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, Vec::new()),
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
            sources,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct EstimateQuery {
    codes: String,
    source: Option<String>,
}

#[derive(Serialize)]
struct EstimateItem {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<EstimateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct EstimateResponse {
    items: Vec<EstimateItem>,
}

async fn real_time_estimate(
    State(market): State<Arc<MarketData>>,
    Query(query): Query<EstimateQuery>,
) -> ApiResult<Json<EstimateResponse>> {
    let codes: Vec<&str> = query
        .codes
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .collect();
    if codes.is_empty() {
        return Err(ApiError::BadRequest("codes is required".to_string()));
    }

    // Distinct codes are distinct cache keys, so the batch fans out in
    // parallel; one code's failure never aborts the others.
    let items = join_all(codes.into_iter().map(|code| {
        let market = &market;
        let source = query.source.as_deref();
        async move {
            match market.estimate(code, source).await {
                Ok(record) => EstimateItem {
                    code: code.to_string(),
                    data: Some(record),
                    error: None,
                },
                Err(err) => EstimateItem {
                    code: code.to_string(),
                    data: None,
                    error: Some(err.to_string()),
                },
            }
        }
    }))
    .await;

    Ok(Json(EstimateResponse { items }))
}

#[derive(Deserialize)]
struct SourceQuery {
    source: Option<String>,
}

async fn nav_history(
    State(market): State<Arc<MarketData>>,
    Path(code): Path<String>,
    Query(query): Query<SourceQuery>,
) -> ApiResult<Json<NavSeries>> {
    let series = market.nav_history(&code, query.source.as_deref()).await?;
    Ok(Json(series))
}

#[derive(Serialize)]
struct MaLineResponse {
    code: String,
    points: NavSeries,
    ma10: Vec<MaPoint>,
    ma30: Vec<MaPoint>,
    ma60: Vec<MaPoint>,
}

async fn ma_line(
    State(market): State<Arc<MarketData>>,
    Path(code): Path<String>,
) -> ApiResult<Json<MaLineResponse>> {
    let points = market.nav_history(&code, None).await?;
    Ok(Json(MaLineResponse {
        ma10: moving_average(&points, 10),
        ma30: moving_average(&points, 30),
        ma60: moving_average(&points, 60),
        code,
        points,
    }))
}

#[derive(Serialize)]
struct ChartPoint {
    ts: i64,
    nav: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProTrendResponse {
    code: String,
    points: Vec<ChartPoint>,
    ma5: Vec<ChartPoint>,
    ma10: Vec<ChartPoint>,
    last_nav: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimate: Option<EstimateRecord>,
}

// Chart timestamps are milliseconds at CST midnight, matching the dates
// the NAV publishers use.
fn date_ms(date: NaiveDate) -> i64 {
    let cst = FixedOffset::east_opt(8 * 3600).unwrap();
    cst.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .unwrap()
        .timestamp_millis()
}

fn chart_points(ma: &[MaPoint]) -> Vec<ChartPoint> {
    ma.iter()
        .map(|point| ChartPoint {
            ts: date_ms(point.date),
            nav: point.value,
        })
        .collect()
}

async fn pro_trend(
    State(market): State<Arc<MarketData>>,
    Path(code): Path<String>,
) -> ApiResult<Json<ProTrendResponse>> {
    let series = market.nav_history(&code, None).await?;
    let window = &series[series.len().saturating_sub(PRO_TREND_POINTS)..];

    let points: Vec<ChartPoint> = window
        .iter()
        .map(|point| ChartPoint {
            ts: date_ms(point.date),
            nav: point.nav,
        })
        .collect();

    // Overlay is best effort; a dead estimate source never fails the chart.
    let estimate = market.estimate(&code, None).await.ok();

    Ok(Json(ProTrendResponse {
        code,
        ma5: chart_points(&moving_average(window, 5)),
        ma10: chart_points(&moving_average(window, 10)),
        last_nav: window.last().map(|point| point.nav),
        points,
        estimate,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingRequest {
    code: String,
    shares: f64,
    #[serde(default)]
    cost: Option<f64>,
    #[serde(default)]
    purchase_date: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfitDto {
    current_value: f64,
    total_cost: f64,
    pnl: f64,
    pnl_rate: Option<f64>,
}

#[derive(Serialize)]
struct HoldingProfitItem {
    code: String,
    #[serde(flatten)]
    result: Option<ProfitDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HoldingProfitResponse {
    items: Vec<HoldingProfitItem>,
    total_value: f64,
    total_cost: f64,
    total_pnl: f64,
    total_pnl_rate: Option<f64>,
}

/// Unit cost comes from the explicit `cost`, else from the most recent
/// NAV on or before the purchase date.
async fn resolve_unit_cost(
    market: &MarketData,
    request: &HoldingRequest,
) -> Result<f64, String> {
    if let Some(cost) = request.cost.filter(|cost| *cost > 0.0) {
        return Ok(cost);
    }
    let Some(date) = request.purchase_date else {
        return Err("cost or purchaseDate required".to_string());
    };
    let series = market
        .nav_history(&request.code, None)
        .await
        .map_err(|err| err.to_string())?;
    nav_on_or_before(&series, date)
        .map(|point| point.nav)
        .ok_or_else(|| format!("no NAV on or before {date}"))
}

async fn resolve_unit_value(market: &MarketData, code: &str) -> Result<f64, String> {
    if let Ok(record) = market.estimate(code, None).await {
        return Ok(record.value);
    }
    let series = market
        .nav_history(code, None)
        .await
        .map_err(|err| err.to_string())?;
    series
        .last()
        .map(|point| point.nav)
        .ok_or_else(|| "no NAV available".to_string())
}

async fn profit_item(market: &MarketData, request: &HoldingRequest) -> Result<ProfitDto, String> {
    if request.shares <= 0.0 {
        return Err("shares must be positive".to_string());
    }
    let unit_cost = resolve_unit_cost(market, request).await?;
    let unit_value = resolve_unit_value(market, &request.code).await?;
    let profit = holding_profit(unit_value, unit_cost, request.shares);
    Ok(ProfitDto {
        current_value: profit.current_value,
        total_cost: profit.total_cost,
        pnl: profit.pnl,
        pnl_rate: profit.pnl_rate,
    })
}

async fn hold_profit(
    State(market): State<Arc<MarketData>>,
    Json(requests): Json<Vec<HoldingRequest>>,
) -> ApiResult<Json<HoldingProfitResponse>> {
    if requests.is_empty() {
        return Err(ApiError::BadRequest("at least one holding required".to_string()));
    }

    let mut items = Vec::with_capacity(requests.len());
    let mut total_value = 0.0;
    let mut total_cost = 0.0;
    for request in &requests {
        match profit_item(&market, request).await {
            Ok(result) => {
                total_value += result.current_value;
                total_cost += result.total_cost;
                items.push(HoldingProfitItem {
                    code: request.code.clone(),
                    result: Some(result),
                    error: None,
                });
            }
            Err(error) => items.push(HoldingProfitItem {
                code: request.code.clone(),
                result: None,
                error: Some(error),
            }),
        }
    }

    let total_pnl = total_value - total_cost;
    Ok(Json(HoldingProfitResponse {
        items,
        total_value,
        total_cost,
        total_pnl,
        total_pnl_rate: (total_cost > 0.0).then(|| total_pnl / total_cost * 100.0),
    }))
}

async fn source_list(State(market): State<Arc<MarketData>>) -> Json<Vec<ProviderStatus>> {
    Json(market.status())
}

async fn trade_status() -> Json<calendar::TradeStatus> {
    Json(calendar::trade_status())
}

#[derive(Deserialize)]
struct SuggestQuery {
    query: String,
}

async fn fund_suggest(
    State(market): State<Arc<MarketData>>,
    Query(query): Query<SuggestQuery>,
) -> ApiResult<Json<Vec<FundSummary>>> {
    Ok(Json(market.suggest(&query.query).await?))
}

async fn fund_catalog(
    State(market): State<Arc<MarketData>>,
) -> ApiResult<Json<Vec<FundSummary>>> {
    Ok(Json(market.catalog().await?))
}
