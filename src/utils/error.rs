use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolarError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch")]
    CrcError,

    #[error("Wrong response length: expected {expected} bytes, got {actual}")]
    ResponseLength { expected: usize, actual: usize },

    #[error("Invalid response from device")]
    InvalidResponse,

    #[error("Device exception code {0:#04x}")]
    DeviceException(u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Sink not initialized: {0}")]
    NotInitialized(String),

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Startup configuration failures. These are the only errors allowed to end the process.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable(s) not set: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {0}: {1}")]
    Invalid(String, String),

    #[error("No devices configured")]
    NoDevices,

    #[error("No sinks configured")]
    NoSinks,

    #[error("Cannot read config file: {0}")]
    File(String),
}

impl From<ConfigError> for SolarError {
    fn from(err: ConfigError) -> Self {
        SolarError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for SolarError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => SolarError::Timeout,
            _ => SolarError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for SolarError {
    fn from(err: serialport::Error) -> Self {
        SolarError::ConnectionError(format!("Serial port error: {}", err))
    }
}

impl From<serde_json::Error> for SolarError {
    fn from(err: serde_json::Error) -> Self {
        SolarError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::ser::Error> for SolarError {
    fn from(err: toml::ser::Error) -> Self {
        SolarError::SerializationError(format!("TOML error: {}", err))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for SolarError {
    fn from(err: sqlx::Error) -> Self {
        SolarError::CommunicationError(format!("Database error: {}", err))
    }
}

impl From<influxdb2::RequestError> for SolarError {
    fn from(err: influxdb2::RequestError) -> Self {
        SolarError::SinkError(format!("InfluxDB request failed: {}", err))
    }
}

impl From<rumqttc::ClientError> for SolarError {
    fn from(err: rumqttc::ClientError) -> Self {
        SolarError::SinkError(format!("MQTT client error: {}", err))
    }
}

impl From<rumqttc::ConnectionError> for SolarError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        SolarError::ConnectionError(format!("MQTT connection error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for SolarError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SolarError::Timeout
    }
}
