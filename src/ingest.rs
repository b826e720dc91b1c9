//! Periodic CoinCap ingestion.
//!
//! An [`Ingestor`] performs one fetch-and-reconcile cycle. An
//! [`IngestionService`] owns at most one background task that runs cycles on
//! a fixed period until it is stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::select;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::fetch::CoinSource;
use crate::model::CoinRow;

/// Zeroes minutes, seconds and sub-second components.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(ts)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub coins: Vec<CoinRow>,
    pub log_time: DateTime<Utc>,
}

pub struct Ingestor {
    source: Arc<dyn CoinSource>,
    db: Arc<Database>,
}

impl Ingestor {
    pub fn new(source: Arc<dyn CoinSource>, db: Arc<Database>) -> Self {
        Self { source, db }
    }

    pub async fn run_cycle(&self, started_at: DateTime<Utc>) -> Result<CycleReport> {
        let log_time = truncate_to_hour(started_at);

        let remote = self.source.fetch_coins().await?;
        let coins: Vec<CoinRow> = remote.into_iter().map(CoinRow::from).collect();

        self.db.save_cycle(&coins, log_time).await?;

        info!("Stored {} coins for {}", coins.len(), log_time);
        Ok(CycleReport { coins, log_time })
    }
}

struct RunningTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct IngestionService {
    ingestor: Arc<Ingestor>,
    period: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl IngestionService {
    pub fn new(ingestor: Ingestor, period: Duration) -> Self {
        Self {
            ingestor: Arc::new(ingestor),
            period,
            task: Mutex::new(None),
        }
    }

    /// Spawns the periodic task. Returns `false` without spawning anything if
    /// a task is already alive.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("Ingestion task is already running");
            return false;
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let ingestor = self.ingestor.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            // First tick completes immediately, so a cycle runs at startup.
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_run: Option<Instant> = None;

            loop {
                select! {
                    _ = ticker.tick() => {
                        if let Some(last) = last_run {
                            debug!("Running ingestion cycle (last run: {:.2?} ago)", last.elapsed());
                        }
                        // A stop request abandons the in-flight cycle; its
                        // uncommitted transaction is rolled back on drop.
                        select! {
                            res = ingestor.run_cycle(Utc::now()) => {
                                if let Err(e) = res {
                                    error!("Ingestion cycle failed: {:#}", e);
                                }
                            }
                            _ = stop_rx.recv() => {
                                info!("Stopping ingestion task during a cycle");
                                break;
                            }
                        }
                        last_run = Some(Instant::now());
                    }
                    _ = stop_rx.recv() => {
                        info!("Stopping ingestion task");
                        break;
                    }
                }
            }
        });

        *task = Some(RunningTask { stop_tx, handle });
        info!("Ingestion task started (period {:?})", self.period);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Signals the task to exit and waits for it. An in-flight cycle is
    /// cancelled, so a hung fetch does not block shutdown.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        let _ = task.stop_tx.send(()).await;
        if let Err(e) = task.handle.await {
            error!("Ingestion task ended abnormally: {}", e);
        }
    }
}
