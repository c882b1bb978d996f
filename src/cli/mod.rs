use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

pub use commands::execute;

/// Polls Kaco inverters and an SDM630 meter over RS-485 and forwards the
/// readings to InfluxDB and MQTT.
#[derive(Parser, Debug)]
#[command(name = "solarpi")]
#[command(version, about)]
pub struct Cli {
    /// TOML configuration file. Environment variables are used when absent.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Poll all devices and dispatch to every sink until interrupted (default)
    Run,

    /// Poll every device once and print the readings as JSON
    Read {
        #[arg(long)]
        pretty: bool,
    },

    /// Copy a legacy SolarPi SQLite database into InfluxDB
    #[cfg(feature = "sqlite")]
    Migrate {
        #[arg(short, long, default_value = "SolarPi.db")]
        database: PathBuf,

        #[arg(long, default_value_t = crate::storage::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Print the effective configuration as TOML
    PrintConfig,

    /// List serial ports found on this machine
    Ports,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
