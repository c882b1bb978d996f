pub mod env;
pub mod settings;

pub use settings::{
    Config, EnergyMeterConfig, InfluxDbConfig, InverterConfig, MqttConfig, ParityConfig,
    ReadoutConfig, SerialConfig, DEFAULT_SINK_MAX_RETRIES,
};
