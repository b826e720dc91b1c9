use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serialization::{de_f64, de_i64, de_opt_f64, de_string_or_empty};

/// One entry of the CoinCap `/v2/assets` listing, as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCoin {
    pub id: String,
    #[serde(deserialize_with = "de_i64")]
    pub rank: i64,
    pub symbol: String,
    pub name: String,
    #[serde(deserialize_with = "de_f64")]
    pub supply: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub max_supply: Option<f64>,
    #[serde(deserialize_with = "de_f64")]
    pub market_cap_usd: f64,
    #[serde(deserialize_with = "de_f64")]
    pub volume_usd_24_hr: f64,
    #[serde(deserialize_with = "de_f64")]
    pub price_usd: f64,
    #[serde(deserialize_with = "de_f64")]
    pub change_percent_24_hr: f64,
    #[serde(default, rename = "vwap24Hr", deserialize_with = "de_opt_f64")]
    pub vwap_24_hr: Option<f64>,
    #[serde(default, deserialize_with = "de_string_or_empty")]
    pub explorer: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetsResponse {
    pub data: Vec<RemoteCoin>,
}

/// Current snapshot of a coin, one row per remote id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinRow {
    pub id: String,
    pub rank: i64,
    pub symbol: String,
    pub name: String,
    pub supply: f64,
    pub max_supply: Option<f64>,
    pub market_cap_usd: f64,
    pub volume_usd_24h: f64,
    pub price_usd: f64,
    pub change_percent_24hr: f64,
    pub vwap_24hr: Option<f64>,
    pub explorer: String,
}

impl From<RemoteCoin> for CoinRow {
    fn from(c: RemoteCoin) -> Self {
        Self {
            symbol: c.symbol.to_lowercase(),
            name: c.name.to_lowercase(),
            id: c.id,
            rank: c.rank,
            supply: c.supply,
            max_supply: c.max_supply,
            market_cap_usd: c.market_cap_usd,
            volume_usd_24h: c.volume_usd_24_hr,
            price_usd: c.price_usd,
            change_percent_24hr: c.change_percent_24_hr,
            vwap_24hr: c.vwap_24_hr,
            explorer: c.explorer,
        }
    }
}

/// Append-only price observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLog {
    pub id: i64,
    pub coin_id: String,
    pub coin_symbol: String,
    pub price_usd: f64,
    pub log_time: DateTime<Utc>,
}

/// Inclusive `[start, end]` window over `log_time`. A `None` bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceLogEntry {
    pub price: f64,
    pub log_time: DateTime<Utc>,
}

impl From<PriceLog> for PriceLogEntry {
    fn from(log: PriceLog) -> Self {
        Self {
            price: log.price_usd,
            log_time: log.log_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinResponse {
    #[serde(flatten)]
    pub coin: CoinRow,
    pub price_logs: Vec<PriceLogEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
