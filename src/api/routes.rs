use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::SharedState;
use crate::error::ApiError;
use crate::model::{CoinResponse, CoinRow, HealthResponse, MessageResponse, PriceLogEntry, TimeRange};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// Exact match against the configured token, whitespace included. Only the
/// bearer scheme is accepted; the scheme name itself is case-insensitive.
pub fn validate_token(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let (scheme, token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .ok_or(ApiError::Unauthorized("Not authenticated"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::Unauthorized("Not authenticated"));
    }
    if token != expected {
        return Err(ApiError::Unauthorized("Invalid token"));
    }
    Ok(())
}

pub async fn start_task(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Err(e) = validate_token(&headers, &state.api_token) {
        warn!("Rejected /start-task request: {}", e);
        return Err(e);
    }

    let message = if state.ingestion.start().await {
        info!("Ingestion task started via /start-task");
        "Background task started."
    } else {
        "Background task already running."
    };

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl DateRangeQuery {
    fn to_range(&self) -> Result<TimeRange, ApiError> {
        Ok(TimeRange {
            start: parse_bound("start_date", self.start_date.as_deref())?,
            end: parse_bound("end_date", self.end_date.as_deref())?,
        })
    }
}

fn parse_bound(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidQuery(format!("{field}: invalid datetime '{s}'"))),
    }
}

/// Accepts RFC 3339 (the offset colon is optional), a naive ISO-8601
/// date-time (taken as UTC) or a bare date (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

async fn with_price_logs(
    state: &SharedState,
    coin: CoinRow,
    range: TimeRange,
) -> Result<CoinResponse, ApiError> {
    let price_logs = state
        .db
        .get_price_logs(&coin.id, range)
        .await?
        .into_iter()
        .map(PriceLogEntry::from)
        .collect();

    Ok(CoinResponse { coin, price_logs })
}

pub async fn get_all_price_logs(
    Query(params): Query<DateRangeQuery>,
    State(state): State<SharedState>,
) -> Result<Json<Vec<CoinResponse>>, ApiError> {
    let range = params.to_range()?;

    let coins = state.db.list_coins().await?;
    let mut out = Vec::with_capacity(coins.len());
    for coin in coins {
        out.push(with_price_logs(&state, coin, range).await?);
    }

    Ok(Json(out))
}

pub async fn get_coin_price_logs(
    Path(coin_id): Path<String>,
    Query(params): Query<DateRangeQuery>,
    State(state): State<SharedState>,
) -> Result<Json<CoinResponse>, ApiError> {
    let range = params.to_range()?;

    let coin = state
        .db
        .find_coin(&coin_id)
        .await?
        .ok_or(ApiError::NotFound("Coin not found"))?;

    Ok(Json(with_price_logs(&state, coin, range).await?))
}
