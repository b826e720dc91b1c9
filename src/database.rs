use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::model::{CoinRow, PriceLog, TimeRange};

pub struct Database {
    pool: SqlitePool,
}

// Fixed-width UTC text so that string comparison in SQL matches time order.
fn to_sql_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_sql_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in store: {s}"))?
        .with_timezone(&Utc))
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true);

        // Every connection to `sqlite::memory:` is its own database, so keep
        // exactly one connection alive for the lifetime of the pool.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coins (
                id TEXT PRIMARY KEY,
                rank INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                supply REAL NOT NULL,
                max_supply REAL,
                market_cap_usd REAL NOT NULL,
                volume_usd_24h REAL NOT NULL,
                price_usd REAL NOT NULL,
                change_percent_24hr REAL NOT NULL,
                vwap_24hr REAL,
                explorer TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(&pool)
        .await?;

        // No FOREIGN KEY on coin_id.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                coin_id TEXT NOT NULL,
                coin_symbol TEXT NOT NULL,
                price_usd REAL NOT NULL,
                log_time TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_coins_symbol ON coins(symbol);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_logs_coin_id ON price_logs(coin_id);")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_logs_log_time ON price_logs(log_time);")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_logs_coin_time ON price_logs(coin_id, log_time);",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Upserts every coin and appends one price log per coin, all in one
    /// transaction.
    pub async fn save_cycle(&self, coins: &[CoinRow], log_time: DateTime<Utc>) -> Result<()> {
        let log_time = to_sql_ts(log_time);
        let mut tx = self.pool.begin().await?;

        for coin in coins {
            sqlx::query(
                r#"
                INSERT INTO coins (id, rank, symbol, name, supply, max_supply, market_cap_usd,
                    volume_usd_24h, price_usd, change_percent_24hr, vwap_24hr, explorer)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    rank = excluded.rank,
                    symbol = excluded.symbol,
                    name = excluded.name,
                    supply = excluded.supply,
                    max_supply = excluded.max_supply,
                    market_cap_usd = excluded.market_cap_usd,
                    volume_usd_24h = excluded.volume_usd_24h,
                    price_usd = excluded.price_usd,
                    change_percent_24hr = excluded.change_percent_24hr,
                    vwap_24hr = excluded.vwap_24hr,
                    explorer = excluded.explorer
                "#,
            )
            .bind(&coin.id)
            .bind(coin.rank)
            .bind(&coin.symbol)
            .bind(&coin.name)
            .bind(coin.supply)
            .bind(coin.max_supply)
            .bind(coin.market_cap_usd)
            .bind(coin.volume_usd_24h)
            .bind(coin.price_usd)
            .bind(coin.change_percent_24hr)
            .bind(coin.vwap_24hr)
            .bind(&coin.explorer)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO price_logs (coin_id, coin_symbol, price_usd, log_time) VALUES (?, ?, ?, ?)",
            )
            .bind(&coin.id)
            .bind(&coin.symbol)
            .bind(coin.price_usd)
            .bind(&log_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_coins(&self) -> Result<Vec<CoinRow>> {
        let rows = sqlx::query("SELECT * FROM coins ORDER BY rank ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(coin_from_row).collect()
    }

    pub async fn get_coin(&self, id: &str) -> Result<Option<CoinRow>> {
        let row = sqlx::query("SELECT * FROM coins WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(coin_from_row).transpose()
    }

    /// Resolves `key` as an exact id first, then as a case-insensitive symbol.
    pub async fn find_coin(&self, key: &str) -> Result<Option<CoinRow>> {
        if let Some(coin) = self.get_coin(key).await? {
            return Ok(Some(coin));
        }

        let row = sqlx::query("SELECT * FROM coins WHERE symbol = ? ORDER BY rank ASC, id ASC LIMIT 1")
            .bind(key.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(coin_from_row).transpose()
    }

    pub async fn get_price_logs(&self, coin_id: &str, range: TimeRange) -> Result<Vec<PriceLog>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, coin_id, coin_symbol, price_usd, log_time FROM price_logs WHERE coin_id = ",
        );
        qb.push_bind(coin_id);
        if let Some(start) = range.start {
            qb.push(" AND log_time >= ").push_bind(to_sql_ts(start));
        }
        if let Some(end) = range.end {
            qb.push(" AND log_time <= ").push_bind(to_sql_ts(end));
        }
        qb.push(" ORDER BY log_time ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter().map(price_log_from_row).collect()
    }

    pub async fn get_coin_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM coins")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    pub async fn get_price_log_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM price_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }
}

fn coin_from_row(row: &SqliteRow) -> Result<CoinRow> {
    Ok(CoinRow {
        id: row.try_get("id")?,
        rank: row.try_get("rank")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        supply: row.try_get("supply")?,
        max_supply: row.try_get("max_supply")?,
        market_cap_usd: row.try_get("market_cap_usd")?,
        volume_usd_24h: row.try_get("volume_usd_24h")?,
        price_usd: row.try_get("price_usd")?,
        change_percent_24hr: row.try_get("change_percent_24hr")?,
        vwap_24hr: row.try_get("vwap_24hr")?,
        explorer: row.try_get("explorer")?,
    })
}

fn price_log_from_row(row: &SqliteRow) -> Result<PriceLog> {
    let log_time: String = row.try_get("log_time")?;
    Ok(PriceLog {
        id: row.try_get("id")?,
        coin_id: row.try_get("coin_id")?,
        coin_symbol: row.try_get("coin_symbol")?,
        price_usd: row.try_get("price_usd")?,
        log_time: from_sql_ts(&log_time)?,
    })
}
