use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::serial::SerialLink;
use crate::utils::error::SolarError;

/// In-memory serial line replaying scripted responses, for bench tests and
/// for exercising readers without hardware.
///
/// Clones share state, so a test can keep one handle while the transport owns another.
#[derive(Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    open: bool,
    responses: VecDeque<Vec<u8>>,
    fallback: Option<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    reads: usize,
    opens: usize,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response; queued responses are served before the repeated one.
    pub fn push_response(&self, bytes: impl Into<Vec<u8>>) {
        self.state().responses.push_back(bytes.into());
    }

    /// Response served whenever the queue is empty.
    pub fn repeat_response(&self, bytes: impl Into<Vec<u8>>) {
        self.state().fallback = Some(bytes.into());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialLink for MemoryLink {
    fn port_name(&self) -> &str {
        "memory"
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn open(&mut self) -> Result<(), SolarError> {
        let mut state = self.state();
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, SolarError> {
        self.state().writes.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, SolarError> {
        let mut state = self.state();
        state.reads += 1;
        let mut response = match state.responses.pop_front() {
            Some(response) => response,
            None => state.fallback.clone().unwrap_or_default(),
        };
        response.truncate(len);
        Ok(response)
    }
}
