use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use coinstats::api::{create_router, AppState};
use coinstats::{CoinRow, CoinSource, Database, IngestionService, Ingestor, RemoteCoin};
use serde_json::Value;
use tower::ServiceExt;

struct CountingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl CoinSource for CountingSource {
    async fn fetch_coins(&self) -> anyhow::Result<Vec<RemoteCoin>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

struct TestApp {
    router: Router,
    db: Arc<Database>,
    ingestion: Arc<IngestionService>,
    source: Arc<CountingSource>,
}

fn coin(id: &str, symbol: &str, rank: i64, price: f64) -> CoinRow {
    CoinRow {
        id: id.to_string(),
        rank,
        symbol: symbol.to_string(),
        name: id.to_string(),
        supply: 19_000_000.0,
        max_supply: Some(21_000_000.0),
        market_cap_usd: 800_000_000_000.0,
        volume_usd_24h: 20_000_000_000.0,
        price_usd: price,
        change_percent_24hr: 1.2,
        vwap_24hr: None,
        explorer: "https://blockchain.info/".to_string(),
    }
}

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
}

async fn setup() -> TestApp {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    for h in 9..=11 {
        db.save_cycle(
            &[
                coin("bitcoin", "btc", 1, 40_000.0 + h as f64),
                coin("ethereum", "eth", 2, 2_000.0 + h as f64),
            ],
            hour(h),
        )
        .await
        .unwrap();
    }

    let source = Arc::new(CountingSource {
        calls: AtomicUsize::new(0),
    });
    let ingestor = Ingestor::new(source.clone(), db.clone());
    let ingestion = Arc::new(IngestionService::new(ingestor, Duration::from_secs(3600)));

    let router = create_router(Arc::new(AppState {
        db: db.clone(),
        ingestion: ingestion.clone(),
        api_token: "secret".to_string(),
    }));

    TestApp {
        router,
        db,
        ingestion,
        source,
    }
}

async fn get(router: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = token {
        req = req.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let resp = router
        .clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn prices(coin: &Value) -> Vec<f64> {
    coin["price_logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["price"].as_f64().unwrap())
        .collect()
}

#[tokio::test]
async fn health_is_ok() {
    let app = setup().await;
    let (status, body) = get(&app.router, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn lists_every_coin_with_history() {
    let app = setup().await;
    let (status, body) = get(&app.router, "/coins/price-logs", None).await;
    assert_eq!(status, StatusCode::OK);

    let coins = body.as_array().unwrap();
    assert_eq!(coins.len(), 2);
    assert_eq!(coins[0]["id"], "bitcoin");
    assert_eq!(coins[0]["max_supply"], 21_000_000.0);
    assert!(coins[0]["vwap_24hr"].is_null());
    assert_eq!(prices(&coins[0]), vec![40_009.0, 40_010.0, 40_011.0]);
    assert_eq!(coins[1]["price_logs"][0]["log_time"], "2024-03-01T09:00:00Z");
}

#[tokio::test]
async fn date_filters_are_inclusive_and_optional() {
    let app = setup().await;

    let (_, body) = get(
        &app.router,
        "/coins/price-logs?start_date=2024-03-01T10:00:00&end_date=2024-03-01T11:00:00Z",
        None,
    )
    .await;
    assert_eq!(prices(&body[0]), vec![40_010.0, 40_011.0]);

    let (_, body) = get(&app.router, "/coins/price-logs?end_date=2024-03-01T09:30:00", None).await;
    assert_eq!(prices(&body[1]), vec![2_009.0]);

    let (_, body) = get(&app.router, "/coins/price-logs?start_date=&end_date=", None).await;
    assert_eq!(prices(&body[1]).len(), 3);

    let (status, body) = get(&app.router, "/coins/price-logs?start_date=tomorrow", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("start_date"));
}

#[tokio::test]
async fn single_coin_by_id_or_symbol() {
    let app = setup().await;

    let (status, body) = get(&app.router, "/coin/ethereum/price-logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "eth");
    assert_eq!(prices(&body).len(), 3);

    let (status, body) = get(
        &app.router,
        "/coin/BTC/price-logs?start_date=2024-03-01T11:00:00Z",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "bitcoin");
    assert_eq!(prices(&body), vec![40_011.0]);

    let (status, body) = get(&app.router, "/coin/dogecoin/price-logs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Coin not found");
}

#[tokio::test]
async fn start_task_rejects_bad_tokens() {
    let app = setup().await;

    let (status, body) = get(&app.router, "/start-task", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid token");

    let (status, _) = get(&app.router, "/start-task", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(!app.ingestion.is_running().await);
    assert_eq!(app.source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_task_spawns_one_loop() {
    let app = setup().await;

    let (status, body) = get(&app.router, "/start-task", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Background task started.");
    assert!(app.ingestion.is_running().await);

    let (status, body) = get(&app.router, "/start-task", Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Background task already running.");

    for _ in 0..100 {
        if app.source.calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    app.ingestion.stop().await;
    assert_eq!(app.source.calls.load(Ordering::SeqCst), 1);

    // an empty listing leaves the store untouched
    assert_eq!(app.db.get_coin_count().await.unwrap(), 2);
    assert_eq!(app.db.get_price_log_count().await.unwrap(), 6);
}
