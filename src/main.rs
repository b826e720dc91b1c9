use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use coinstats::api::{self, AppState};
use coinstats::config::{Cli, Command, Config};
use coinstats::ingest::CycleReport;
use coinstats::{CoinCapClient, Database, IngestionService, Ingestor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let db = Database::new(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    let db = Arc::new(db);

    let source = Arc::new(CoinCapClient::new(config.coincap_url.clone())?);
    let ingestor = Ingestor::new(source, db.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db, ingestor).await,
        Command::Sync => {
            let report = ingestor.run_cycle(Utc::now()).await?;
            print_report(&report);
            Ok(())
        }
    }
}

async fn serve(config: Config, db: Arc<Database>, ingestor: Ingestor) -> Result<()> {
    let ingestion = Arc::new(IngestionService::new(ingestor, config.ingest_interval()));
    ingestion.start().await;

    let state = Arc::new(AppState {
        db,
        ingestion,
        api_token: config.api_token,
    });

    api::start_server(state, &config.host, config.port).await
}

fn print_report(report: &CycleReport) {
    println!(
        "{:<5} {:<24} {:<8} {:>14} {:>18} {:>10}",
        "Rank", "Id", "Symbol", "Price(USD)", "MktCap(USD)", "24h%"
    );
    println!("{}", "-".repeat(84));
    for c in &report.coins {
        println!(
            "{:<5} {:<24} {:<8} {:>14.2} {:>18.0} {:>+10.2}",
            c.rank, c.id, c.symbol, c.price_usd, c.market_cap_usd, c.change_percent_24hr,
        );
    }
    println!("\n{} coins logged at {}", report.coins.len(), report.log_time);
}
