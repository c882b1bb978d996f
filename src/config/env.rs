//! Configuration from environment variables, as used by the container images.

use std::str::FromStr;
use uuid::Uuid;

use super::settings::{
    default_mqtt_port, Config, EnergyMeterConfig, InfluxDbConfig, InverterConfig, MqttConfig,
    ParityConfig, ReadoutConfig,
};
use crate::devices::{sdm630_registers, sdm630_registers_named};
use crate::utils::error::ConfigError;

const INFLUXDB_VARS: [&str; 4] = [
    "INFLUXDB_URL",
    "INFLUXDB_TOKEN",
    "INFLUXDB_ORG",
    "INFLUXDB_BUCKET",
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    /// Builds a config from `lookup`, reporting every missing variable at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut missing = Vec::new();
        let mut config = Config::default();

        match env.get("SERIAL_PORT") {
            Some(port) => config.serial.port = port,
            None => missing.push("SERIAL_PORT".to_string()),
        }
        config.serial.baud_rate = env.parse_or("BAUD_RATE", config.serial.baud_rate)?;
        config.serial.timeout_ms = env.parse_or("SERIAL_TIMEOUT_MS", config.serial.timeout_ms)?;
        if let Some(parity) = env.get("SERIAL_PARITY") {
            config.serial.parity = match parity.to_ascii_lowercase().as_str() {
                "none" | "n" => ParityConfig::None,
                "even" | "e" => ParityConfig::Even,
                "odd" | "o" => ParityConfig::Odd,
                _ => return Err(ConfigError::Invalid("SERIAL_PARITY".to_string(), parity)),
            };
        }
        config.read_retries = env.parse_or("READ_RETRIES", config.read_retries)?;
        config.sink_max_retries = env.parse_or("SINK_MAX_RETRIES", config.sink_max_retries)?;

        // Inverters: "1,2" with optional matching "WR Garage,WR Schipf"
        if let Some(addresses) = env.get("INVERTER_ADDRESSES") {
            let addresses: Vec<u8> = parse_list("INVERTER_ADDRESSES", &addresses)?;
            let names: Vec<Option<String>> = match env.get("INVERTER_NAMES") {
                Some(names) => {
                    let names: Vec<String> = names.split(',').map(|n| n.trim().to_string()).collect();
                    if names.len() != addresses.len() {
                        return Err(ConfigError::Invalid(
                            "INVERTER_NAMES".to_string(),
                            format!("{} names for {} addresses", names.len(), addresses.len()),
                        ));
                    }
                    names.into_iter().map(Some).collect()
                }
                None => vec![None; addresses.len()],
            };
            let interval = env.parse_or("INVERTER_INTERVAL_SECONDS", 10)?;
            config.inverters = addresses
                .into_iter()
                .zip(names)
                .map(|(bus_address, name)| InverterConfig {
                    name,
                    bus_address,
                    interval_seconds: interval,
                })
                .collect();
        }

        if let Some(unit_id) = env.get("SDM_UNIT_ID") {
            let unit_id = parse_value("SDM_UNIT_ID", &unit_id)?;
            let registers = match env.get("SDM_REGISTERS") {
                Some(list) => sdm630_registers_named(list.split(',').map(str::trim))
                    .map_err(|unknown| {
                        ConfigError::Invalid("SDM_REGISTERS".to_string(), unknown.join(","))
                    })?,
                None => sdm630_registers(),
            };
            config.energy_meters.push(EnergyMeterConfig {
                name: env.get("SDM_NAME"),
                unit_id,
                interval_seconds: env.parse_or("SDM_INTERVAL_SECONDS", 60)?,
                registers,
            });
        }

        if let Some(length) = env.get("READOUT_LENGTH") {
            config.readouts.push(ReadoutConfig {
                name: env.get("READOUT_NAME"),
                response_length: parse_value("READOUT_LENGTH", &length)?,
                interval_seconds: env.parse_or("READOUT_INTERVAL_SECONDS", 10)?,
            });
        }

        config.influxdb = influxdb_from(&env, &mut missing);

        if let Some(broker) = env.get("MQTT_BROKER") {
            config.mqtt = Some(MqttConfig {
                broker,
                port: env.parse_or("MQTT_PORT", default_mqtt_port())?,
                client_id: env
                    .get("MQTT_CLIENT_ID")
                    .unwrap_or_else(|| format!("solarpi-{}", Uuid::new_v4().simple())),
                keep_alive_seconds: env.parse_or("MQTT_KEEP_ALIVE_SECONDS", 30)?,
            });
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        Ok(config)
    }
}

impl InfluxDbConfig {
    /// Reads only the InfluxDB variables, for tools that never touch the bus.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut missing = Vec::new();
        match influxdb_from(&env, &mut missing) {
            Some(config) => Ok(config),
            None if missing.is_empty() => Err(ConfigError::Missing(
                INFLUXDB_VARS.iter().map(|key| key.to_string()).collect(),
            )),
            None => Err(ConfigError::Missing(missing)),
        }
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// All-or-nothing: setting any of the variables makes the rest required.
fn influxdb_from<F>(env: &Env<F>, missing: &mut Vec<String>) -> Option<InfluxDbConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let values: Vec<Option<String>> = INFLUXDB_VARS.iter().map(|key| env.get(key)).collect();
    for (key, value) in INFLUXDB_VARS.iter().zip(&values) {
        if value.is_none() && values.iter().any(Option::is_some) {
            missing.push(key.to_string());
        }
    }
    match values.as_slice() {
        [Some(url), Some(token), Some(organisation), Some(bucket)] => Some(InfluxDbConfig {
            url: url.clone(),
            token: token.clone(),
            organisation: organisation.clone(),
            bucket: bucket.clone(),
        }),
        _ => None,
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => parse_value(key, &value),
            None => Ok(default),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value.to_string()))
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn reads_devices_and_sinks() {
        let config = load(&[
            ("SERIAL_PORT", "/dev/ttyUSB0"),
            ("INVERTER_ADDRESSES", "1, 2"),
            ("INVERTER_NAMES", "WR Garage,WR Schipf"),
            ("SDM_UNIT_ID", "3"),
            ("SDM_REGISTERS", "total_power_active"),
            ("MQTT_BROKER", "broker.local"),
            ("MQTT_CLIENT_ID", "solarpi"),
        ])
        .unwrap();

        assert_eq!(config.inverters.len(), 2);
        assert_eq!(config.inverters[1].bus_address, 2);
        assert_eq!(config.inverters[1].name.as_deref(), Some("WR Schipf"));
        assert_eq!(config.energy_meters[0].registers.len(), 1);
        let mqtt = config.mqtt.as_ref().unwrap();
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.client_id, "solarpi");
        assert!(config.influxdb.is_none());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn lists_every_missing_variable() {
        let err = load(&[("INFLUXDB_URL", "http://localhost:8086")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                "SERIAL_PORT".to_string(),
                "INFLUXDB_TOKEN".to_string(),
                "INFLUXDB_ORG".to_string(),
                "INFLUXDB_BUCKET".to_string(),
            ])
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = load(&[("SERIAL_PORT", "/dev/ttyUSB0"), ("INVERTER_ADDRESSES", "1,x")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("INVERTER_ADDRESSES".to_string(), "x".to_string())
        );
    }

    #[test]
    fn influxdb_alone() {
        let lookup = |key: &str| match key {
            "INFLUXDB_URL" => Some("http://localhost:8086".to_string()),
            "INFLUXDB_TOKEN" => Some("t".to_string()),
            "INFLUXDB_ORG" => Some("o".to_string()),
            "INFLUXDB_BUCKET" => Some("solarpi".to_string()),
            _ => None,
        };
        assert_eq!(InfluxDbConfig::from_lookup(lookup).unwrap().bucket, "solarpi");

        let err = InfluxDbConfig::from_lookup(|_: &str| None).unwrap_err();
        assert_eq!(err, ConfigError::Missing(INFLUXDB_VARS.iter().map(|k| k.to_string()).collect()));
    }

    #[test]
    fn generates_client_id() {
        let config = load(&[("SERIAL_PORT", "/dev/ttyUSB0"), ("MQTT_BROKER", "b")]).unwrap();
        assert!(config.mqtt.unwrap().client_id.starts_with("solarpi-"));
    }
}
