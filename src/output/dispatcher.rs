use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use super::sink::Sink;
use crate::config::DEFAULT_SINK_MAX_RETRIES;
use crate::devices::Measurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    NeedsInit,
    Initializing,
    Ready,
    /// Last publish failed; the next measurement re-initializes first.
    Faulted,
    /// Init retries exhausted. Terminal.
    GivenUp,
}

/// Coarse connection health, reported per sink when a pipeline stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Degraded,
}

/// What happened to one measurement at one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Published,
    Dropped,
    Skipped,
}

/// Forwards measurements to one sink, isolating its failures from every
/// other sink. Delivery is at-most-once: nothing is ever resent.
pub struct Dispatcher<S> {
    sink: S,
    state: DispatcherState,
    max_retries: u32,
    remaining: u32,
    published: u64,
    dropped: u64,
}

impl<S: Sink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self::with_max_retries(sink, DEFAULT_SINK_MAX_RETRIES)
    }

    /// A budget of 0 is treated as 1: every sink gets at least one init attempt.
    pub fn with_max_retries(sink: S, max_retries: u32) -> Self {
        let max_retries = max_retries.max(1);
        Self {
            sink,
            state: DispatcherState::NeedsInit,
            max_retries,
            remaining: max_retries,
            published: 0,
            dropped: 0,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn remaining_retries(&self) -> u32 {
        self.remaining
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.state {
            DispatcherState::Ready => ConnectionState::Connected,
            DispatcherState::Faulted => ConnectionState::Degraded,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn handle(&mut self, measurement: &Measurement) -> Delivery {
        if measurement.values().is_empty() {
            return Delivery::Skipped;
        }

        match self.state {
            DispatcherState::GivenUp => return Delivery::Skipped,
            DispatcherState::NeedsInit | DispatcherState::Faulted => {
                if !self.initialize().await {
                    self.dropped += 1;
                    return Delivery::Dropped;
                }
            }
            DispatcherState::Ready | DispatcherState::Initializing => {}
        }

        match self.sink.publish(measurement).await {
            Ok(()) => {
                self.published += 1;
                debug!(
                    "✅ {} sent to {} ({})",
                    measurement.device_name(),
                    self.sink.sink_type(),
                    self.sink.destination()
                );
                Delivery::Published
            }
            Err(e) => {
                error!(
                    "❌ {} client failed to publish {}: {}",
                    self.sink.sink_type(),
                    measurement.device_name(),
                    e
                );
                self.state = DispatcherState::Faulted;
                self.dropped += 1;
                Delivery::Dropped
            }
        }
    }

    async fn initialize(&mut self) -> bool {
        self.state = DispatcherState::Initializing;
        match self.sink.init().await {
            Ok(()) => {
                info!(
                    "🔗 {} sink connected to {}",
                    self.sink.sink_type(),
                    self.sink.destination()
                );
                self.remaining = self.max_retries;
                self.state = DispatcherState::Ready;
                true
            }
            Err(e) => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining > 0 {
                    warn!(
                        "⚠️ {} initialization failed: {}. Remaining retries: {}",
                        self.sink.sink_type(),
                        e,
                        self.remaining
                    );
                    self.state = DispatcherState::NeedsInit;
                } else {
                    error!(
                        "🛑 {} initialization failed: {}. Giving up on {}",
                        self.sink.sink_type(),
                        e,
                        self.sink.destination()
                    );
                    self.state = DispatcherState::GivenUp;
                }
                false
            }
        }
    }

    /// Drains the fan-out until it closes or the sink is given up.
    pub async fn run(mut self, mut rx: broadcast::Receiver<Arc<Measurement>>) -> Self {
        loop {
            match rx.recv().await {
                Ok(measurement) => {
                    self.handle(&measurement).await;
                    if self.state == DispatcherState::GivenUp {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "⚠️ {} sink lagging, dropped {} oldest measurement(s)",
                        self.sink.sink_type(),
                        skipped
                    );
                    self.dropped += skipped;
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!(
            "📊 {} sink stopped: {} published, {} dropped",
            self.sink.sink_type(),
            self.published,
            self.dropped
        );
        self
    }
}
