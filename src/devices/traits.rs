use log::{debug, warn};
use std::fmt;

use super::measurement::Values;
use crate::utils::error::SolarError;

/// Every attempt of one `read_values` call failed.
#[derive(Debug)]
pub struct ReadFailure {
    pub device: String,
    pub attempts: u32,
    pub last_error: SolarError,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: no valid response after {} attempt(s): {}",
            self.device, self.attempts, self.last_error
        )
    }
}

/// A logical device on a shared bus.
pub trait Reader: Send + Sync {
    fn name(&self) -> &str;

    /// One complete exchange with the device, lock held for its duration.
    fn read_once(&self) -> Result<Values, SolarError>;

    /// Tries up to `retries + 1` exchanges, re-acquiring the bus for each.
    fn read_values(&self, retries: u32) -> Result<Values, ReadFailure> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.read_once() {
                Ok(values) => return Ok(values),
                Err(e) if attempts <= retries => {
                    debug!(
                        "{}: attempt {} failed ({}), {} retries left",
                        self.name(),
                        attempts,
                        e,
                        retries - attempts + 1
                    );
                }
                Err(e) => {
                    warn!("⚠️ {}: read failed after {} attempt(s): {}", self.name(), attempts, e);
                    return Err(ReadFailure {
                        device: self.name().to_string(),
                        attempts,
                        last_error: e,
                    });
                }
            }
        }
    }
}
