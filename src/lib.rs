//! SolarPi acquisition library
//!
//! Polls inverters and energy meters sharing one RS-485 bus, each at its own
//! interval, and forwards every reading to InfluxDB and MQTT. A sink that
//! goes down is reconnected a bounded number of times without affecting the
//! others.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
#[cfg(feature = "sqlite")]
pub mod storage;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{FieldValue, Measurement, ReadFailure, Reader, Values};
pub use output::{Dispatcher, Sink};
pub use services::{Aggregator, Pipeline, Poller};
pub use transport::Transport;
pub use utils::error::{ConfigError, SolarError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
