use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::devices::{sdm630_registers, MeterRegister};
use crate::utils::error::{ConfigError, SolarError};

pub const DEFAULT_SINK_MAX_RETRIES: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial: SerialConfig,

    // Polling settings
    pub read_retries: u32,
    pub channel_capacity: usize,

    // Devices on the bus
    pub inverters: Vec<InverterConfig>,
    pub energy_meters: Vec<EnergyMeterConfig>,
    pub readouts: Vec<ReadoutConfig>,

    // Sinks
    pub sink_max_retries: u32,
    pub influxdb: Option<InfluxDbConfig>,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub parity: ParityConfig,
    pub data_bits: u8,
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InverterConfig {
    pub name: Option<String>,
    pub bus_address: u8,
    #[serde(default = "default_inverter_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyMeterConfig {
    pub name: Option<String>,
    pub unit_id: u8,
    #[serde(default = "default_meter_interval")]
    pub interval_seconds: u64,
    #[serde(default = "sdm630_registers")]
    pub registers: Vec<MeterRegister>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadoutConfig {
    pub name: Option<String>,
    pub response_length: usize,
    #[serde(default = "default_inverter_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxDbConfig {
    pub url: String,
    pub token: String,
    pub organisation: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

fn default_inverter_interval() -> u64 {
    10
}

fn default_meter_interval() -> u64 {
    60
}

pub(crate) fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
            parity: ParityConfig::None,
            data_bits: 8,
            stop_bits: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            read_retries: 2,
            channel_capacity: 64,
            inverters: Vec::new(),
            energy_meters: Vec::new(),
            readouts: Vec::new(),
            sink_max_retries: DEFAULT_SINK_MAX_RETRIES,
            influxdb: None,
            mqtt: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, SolarError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn device_count(&self) -> usize {
        self.inverters.len() + self.energy_meters.len() + self.readouts.len()
    }

    pub fn sink_count(&self) -> usize {
        self.influxdb.is_some() as usize + self.mqtt.is_some() as usize
    }

    /// Startup checks; any failure here ends the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Missing(vec!["SERIAL_PORT".to_string()]));
        }
        if self.device_count() == 0 {
            return Err(ConfigError::NoDevices);
        }
        if self.sink_count() == 0 {
            return Err(ConfigError::NoSinks);
        }

        let intervals = self
            .inverters
            .iter()
            .map(|d| d.interval_seconds)
            .chain(self.energy_meters.iter().map(|d| d.interval_seconds))
            .chain(self.readouts.iter().map(|d| d.interval_seconds));
        for interval in intervals {
            if interval == 0 {
                return Err(ConfigError::Invalid(
                    "interval_seconds".to_string(),
                    "0".to_string(),
                ));
            }
        }

        for readout in &self.readouts {
            if readout.response_length == 0 {
                return Err(ConfigError::Invalid(
                    "response_length".to_string(),
                    "0".to_string(),
                ));
            }
        }

        for meter in &self.energy_meters {
            if meter.registers.is_empty() {
                return Err(ConfigError::Invalid(
                    "registers".to_string(),
                    format!("energy meter {} has no registers", meter.unit_id),
                ));
            }
        }
        Ok(())
    }
}
