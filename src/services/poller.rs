use chrono::Utc;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use crate::devices::{Measurement, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Emitted,
    /// The reader exhausted its retries; nothing was sent this tick.
    Skipped,
    /// The measurement stream has no receiver anymore.
    Closed,
}

/// Drives one reader on a fixed period.
pub struct Poller {
    reader: Arc<dyn Reader>,
    period: Duration,
    retries: u32,
    tx: mpsc::Sender<Measurement>,
    emitted: u64,
    skipped: u64,
}

impl Poller {
    pub fn new(
        reader: Arc<dyn Reader>,
        period: Duration,
        retries: u32,
        tx: mpsc::Sender<Measurement>,
    ) -> Self {
        Self {
            reader,
            period,
            retries,
            tx,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// One read with the retry budget. The bus is used from a blocking thread
    /// so a slow exchange never stalls other pollers' timers.
    pub async fn tick(&mut self) -> PollOutcome {
        let reader = self.reader.clone();
        let retries = self.retries;
        let result = tokio::task::spawn_blocking(move || reader.read_values(retries)).await;

        let values = match result {
            Ok(Ok(values)) => values,
            Ok(Err(failure)) => {
                debug!("⏭️  Skipping tick: {}", failure);
                self.skipped += 1;
                return PollOutcome::Skipped;
            }
            Err(e) => {
                error!("❌ {}: read task failed: {}", self.reader.name(), e);
                self.skipped += 1;
                return PollOutcome::Skipped;
            }
        };

        let measurement = Measurement::new(self.reader.name(), values, Utc::now());
        if self.tx.send(measurement).await.is_err() {
            return PollOutcome::Closed;
        }
        self.emitted += 1;
        PollOutcome::Emitted
    }

    /// Ticks until `shutdown` flips to true (or its sender goes away).
    /// A tick that overruns its period delays the next one.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "⏱️  Polling {} every {}s",
            self.reader.name(),
            self.period.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick().await == PollOutcome::Closed {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            "🛑 Poller {} stopped: {} emitted, {} skipped",
            self.reader.name(),
            self.emitted,
            self.skipped
        );
        self
    }
}
