use log::{info, warn};
use std::path::Path;

use super::{Cli, Commands};
use crate::config::Config;
use crate::services::Pipeline;
use crate::utils::error::{ConfigError, SolarError};

/// From `--config` when given, otherwise from the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    }
}

pub async fn execute(cli: &Cli) -> Result<(), SolarError> {
    match cli.command() {
        Commands::Run => run(cli.config.as_deref()).await,
        Commands::Read { pretty } => read(cli.config.as_deref(), pretty).await,
        #[cfg(feature = "sqlite")]
        Commands::Migrate {
            database,
            batch_size,
        } => migrate(cli.config.as_deref(), &database, batch_size).await,
        Commands::PrintConfig => {
            let config = load_config(cli.config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Ports => list_ports(),
    }
}

async fn run(path: Option<&Path>) -> Result<(), SolarError> {
    let config = load_config(path)?;
    config.validate()?;
    info!(
        "🔌 Serial: {} @ {} baud, {} device(s), {} sink(s)",
        config.serial.port,
        config.serial.baud_rate,
        config.device_count(),
        config.sink_count()
    );

    let report = Pipeline::from_config(config).run().await;
    for sink in &report.sinks {
        info!(
            "📤 {} ({}): {:?} ({:?}), {} published, {} dropped",
            sink.sink_type,
            sink.destination,
            sink.state,
            sink.connection,
            sink.published,
            sink.dropped
        );
    }
    Ok(())
}

async fn read(path: Option<&Path>, pretty: bool) -> Result<(), SolarError> {
    let config = load_config(path)?;
    if config.device_count() == 0 {
        return Err(ConfigError::NoDevices.into());
    }

    let pipeline = Pipeline::from_config(config);
    let measurements = pipeline.read_once().await;
    let json = if pretty {
        serde_json::to_string_pretty(&measurements)?
    } else {
        serde_json::to_string(&measurements)?
    };
    println!("{}", json);

    if measurements.is_empty() {
        return Err(SolarError::CommunicationError(
            "No device returned a valid response".to_string(),
        ));
    }
    if measurements.len() < pipeline.readers().len() {
        warn!(
            "⚠️ {} of {} device(s) did not answer",
            pipeline.readers().len() - measurements.len(),
            pipeline.readers().len()
        );
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn migrate(path: Option<&Path>, database: &Path, batch_size: usize) -> Result<(), SolarError> {
    use crate::config::InfluxDbConfig;
    use crate::output::InfluxDbBackend;
    use crate::storage::{legacy_tables, Migrator};

    let influx = match path {
        Some(path) => Config::from_file(path)?
            .influxdb
            .ok_or_else(|| {
                ConfigError::Invalid("influxdb".to_string(), "section missing".to_string())
            })?,
        None => InfluxDbConfig::from_env()?,
    };
    let bucket = influx.bucket.clone();
    let mut backend = InfluxDbBackend::new(influx);

    let migrator = Migrator::open(database).await?.with_batch_size(batch_size);
    let report = migrator.run(&legacy_tables(), &mut backend, &bucket).await?;
    println!("Migrated {} row(s)", report.total_rows());
    Ok(())
}

fn list_ports() -> Result<(), SolarError> {
    println!("📡 Available Serial Ports:");

    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }

    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port.port_name);
        if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
            if let Some(manufacturer) = &usb.manufacturer {
                println!("      📱 Manufacturer: {}", manufacturer);
            }
            if let Some(product) = &usb.product {
                println!("      🏷️  Product: {}", product);
            }
        }
    }
    Ok(())
}
