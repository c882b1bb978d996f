//! In-memory backends that record every call, for tests and dry runs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use super::pubsub::PubSubBackend;
use super::timeseries::{Point, TimeSeriesBackend};
use crate::utils::error::SolarError;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct TimeSeriesState {
    opens: u32,
    failing_opens: u32,
    failing_writes: bool,
    writes: Vec<(String, Point)>,
}

/// Clones share state, so a test can keep one handle and give the other to a sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingTimeSeries {
    state: Arc<Mutex<TimeSeriesState>>,
}

impl RecordingTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls to `open` fail.
    pub fn fail_opens(&self, count: u32) {
        lock(&self.state).failing_opens = count;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).failing_writes = fail;
    }

    /// Number of `open` attempts, failed ones included.
    pub fn opens(&self) -> u32 {
        lock(&self.state).opens
    }

    pub fn writes(&self) -> Vec<(String, Point)> {
        lock(&self.state).writes.clone()
    }
}

#[async_trait]
impl TimeSeriesBackend for RecordingTimeSeries {
    fn destination(&self) -> &str {
        "memory"
    }

    async fn open(&mut self) -> Result<(), SolarError> {
        let mut state = lock(&self.state);
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(SolarError::ConnectionError("open refused".to_string()));
        }
        Ok(())
    }

    async fn write(&mut self, bucket: &str, point: Point) -> Result<(), SolarError> {
        let mut state = lock(&self.state);
        if state.failing_writes {
            return Err(SolarError::SinkError("write refused".to_string()));
        }
        state.writes.push((bucket.to_string(), point));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PubSubState {
    connects: Vec<(String, u16, String)>,
    failing_connects: u32,
    failing_publishes: bool,
    messages: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPubSub {
    state: Arc<Mutex<PubSubState>>,
}

impl RecordingPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(&self, count: u32) {
        lock(&self.state).failing_connects = count;
    }

    pub fn fail_publishes(&self, fail: bool) {
        lock(&self.state).failing_publishes = fail;
    }

    pub fn connects(&self) -> Vec<(String, u16, String)> {
        lock(&self.state).connects.clone()
    }

    /// `(topic, payload)` in publish order.
    pub fn messages(&self) -> Vec<(String, String)> {
        lock(&self.state).messages.clone()
    }
}

#[async_trait]
impl PubSubBackend for RecordingPubSub {
    async fn connect(&mut self, broker: &str, port: u16, client_id: &str) -> Result<(), SolarError> {
        let mut state = lock(&self.state);
        state
            .connects
            .push((broker.to_string(), port, client_id.to_string()));
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(SolarError::ConnectionError("connect refused".to_string()));
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: String) -> Result<(), SolarError> {
        let mut state = lock(&self.state);
        if state.failing_publishes {
            return Err(SolarError::SinkError("publish refused".to_string()));
        }
        state.messages.push((topic.to_string(), payload));
        Ok(())
    }
}
