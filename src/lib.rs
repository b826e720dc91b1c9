pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod model;
mod serialization;

pub use database::Database;
pub use fetch::{CoinCapClient, CoinSource};
pub use ingest::{truncate_to_hour, IngestionService, Ingestor};
pub use model::{CoinRow, PriceLog, RemoteCoin, TimeRange};
