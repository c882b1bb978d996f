use futures_util::future::join_all;
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::aggregator::Aggregator;
use super::poller::Poller;
use crate::config::Config;
use crate::devices::{
    EnergyMeterReader, KacoPowadorReader, Measurement, Reader, SerialReadoutReader,
};
use crate::output::{
    ConnectionState, Dispatcher, DispatcherState, InfluxDbBackend, MqttBackend, PubSubSink, Sink,
    TimeSeriesSink,
};
use crate::transport::{SerialPortLink, Transport};

/// One reader and its polling period.
pub struct ScheduledReader {
    pub reader: Arc<dyn Reader>,
    pub period: Duration,
}

/// How one sink fared over a run.
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub sink_type: String,
    pub destination: String,
    pub state: DispatcherState,
    pub connection: ConnectionState,
    pub published: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub emitted: u64,
    pub skipped: u64,
    pub forwarded: u64,
    pub sinks: Vec<SinkReport>,
}

/// Transport, readers, pollers, aggregator and dispatchers wired from one `Config`.
pub struct Pipeline {
    config: Config,
    readers: Vec<ScheduledReader>,
}

impl Pipeline {
    /// Builds on the configured serial port. The port is opened on first use,
    /// so this never touches the hardware.
    pub fn from_config(config: Config) -> Self {
        let transport = Transport::new(SerialPortLink::new(config.serial.clone()));
        Self::with_transport(config, transport)
    }

    /// Every reader in `config` shares `transport`.
    pub fn with_transport(config: Config, transport: Transport) -> Self {
        let mut readers = Vec::with_capacity(config.device_count());

        for inverter in &config.inverters {
            readers.push(ScheduledReader {
                reader: Arc::new(KacoPowadorReader::new(
                    transport.clone(),
                    inverter.bus_address,
                    inverter.name.clone(),
                )),
                period: Duration::from_secs(inverter.interval_seconds),
            });
        }
        for meter in &config.energy_meters {
            readers.push(ScheduledReader {
                reader: Arc::new(EnergyMeterReader::new(
                    transport.clone(),
                    meter.unit_id,
                    meter.registers.clone(),
                    meter.name.clone(),
                )),
                period: Duration::from_secs(meter.interval_seconds),
            });
        }
        for readout in &config.readouts {
            readers.push(ScheduledReader {
                reader: Arc::new(SerialReadoutReader::new(
                    transport.clone(),
                    readout.response_length,
                    readout.name.clone(),
                )),
                period: Duration::from_secs(readout.interval_seconds),
            });
        }

        for scheduled in &readers {
            info!(
                "📋 Registered {} (every {}s)",
                scheduled.reader.name(),
                scheduled.period.as_secs()
            );
        }
        Self { config, readers }
    }

    pub fn readers(&self) -> &[ScheduledReader] {
        &self.readers
    }

    /// Sinks for every configured backend.
    pub fn configured_sinks(&self) -> Vec<Box<dyn Sink>> {
        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
        if let Some(influx) = &self.config.influxdb {
            sinks.push(Box::new(TimeSeriesSink::new(
                influx.bucket.clone(),
                InfluxDbBackend::new(influx.clone()),
            )));
        }
        if let Some(mqtt) = &self.config.mqtt {
            sinks.push(Box::new(PubSubSink::new(
                mqtt.broker.clone(),
                mqtt.port,
                mqtt.client_id.clone(),
                MqttBackend::new(mqtt),
            )));
        }
        sinks
    }

    /// Runs with the configured sinks until SIGINT or SIGTERM.
    pub async fn run(self) -> PipelineReport {
        let sinks = self.configured_sinks();
        self.run_until(sinks, shutdown_signal()).await
    }

    /// Runs until `shutdown` resolves. Pollers stop first; the aggregator and
    /// dispatchers then drain whatever is already queued and exit.
    pub async fn run_until<F>(self, sinks: Vec<Box<dyn Sink>>, shutdown: F) -> PipelineReport
    where
        F: Future<Output = ()>,
    {
        info!(
            "🚀 Starting pipeline: {} reader(s), {} sink(s)",
            self.readers.len(),
            sinks.len()
        );
        let aggregator = Aggregator::new(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatchers: Vec<_> = sinks
            .into_iter()
            .map(|sink| {
                let dispatcher = Dispatcher::with_max_retries(sink, self.config.sink_max_retries);
                tokio::spawn(dispatcher.run(aggregator.subscribe()))
            })
            .collect();

        let pollers: Vec<_> = self
            .readers
            .iter()
            .map(|scheduled| {
                let poller = Poller::new(
                    scheduled.reader.clone(),
                    scheduled.period,
                    self.config.read_retries,
                    aggregator.sender(),
                );
                tokio::spawn(poller.run(shutdown_rx.clone()))
            })
            .collect();
        drop(shutdown_rx);

        let aggregator = tokio::spawn(aggregator.run());

        shutdown.await;
        info!("👋 Shutting down");
        // Receivers may already be gone if every poller ended on its own.
        let _ = shutdown_tx.send(true);

        let mut report = PipelineReport::default();
        for result in join_all(pollers).await {
            match result {
                Ok(poller) => {
                    report.emitted += poller.emitted();
                    report.skipped += poller.skipped();
                }
                Err(e) => error!("❌ Poller task failed: {}", e),
            }
        }

        match aggregator.await {
            Ok(forwarded) => report.forwarded = forwarded,
            Err(e) => error!("❌ Aggregator task failed: {}", e),
        }

        for result in join_all(dispatchers).await {
            match result {
                Ok(dispatcher) => report.sinks.push(SinkReport {
                    sink_type: dispatcher.sink().sink_type().to_string(),
                    destination: dispatcher.sink().destination().to_string(),
                    state: dispatcher.state(),
                    connection: dispatcher.connection_state(),
                    published: dispatcher.published(),
                    dropped: dispatcher.dropped(),
                }),
                Err(e) => error!("❌ Dispatcher task failed: {}", e),
            }
        }

        info!(
            "✅ Pipeline stopped: {} emitted, {} skipped, {} forwarded",
            report.emitted, report.skipped, report.forwarded
        );
        report
    }

    /// Polls every reader once, in configuration order, with the configured retries.
    pub async fn read_once(&self) -> Vec<Measurement> {
        let mut measurements = Vec::with_capacity(self.readers.len());
        for scheduled in &self.readers {
            let reader = scheduled.reader.clone();
            let retries = self.config.read_retries;
            match tokio::task::spawn_blocking(move || reader.read_values(retries)).await {
                Ok(Ok(values)) => measurements.push(Measurement::new(
                    scheduled.reader.name(),
                    values,
                    chrono::Utc::now(),
                )),
                Ok(Err(failure)) => warn!("⚠️ {}", failure),
                Err(e) => error!("❌ {}: read task failed: {}", scheduled.reader.name(), e),
            }
        }
        measurements
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnergyMeterConfig, InfluxDbConfig, InverterConfig, MqttConfig};
    use crate::devices::sdm630_registers;
    use crate::transport::MemoryLink;

    fn config() -> Config {
        Config {
            inverters: vec![
                InverterConfig {
                    name: Some("WR Garage".into()),
                    bus_address: 1,
                    interval_seconds: 10,
                },
                InverterConfig {
                    name: None,
                    bus_address: 2,
                    interval_seconds: 10,
                },
            ],
            energy_meters: vec![EnergyMeterConfig {
                name: None,
                unit_id: 3,
                interval_seconds: 60,
                registers: sdm630_registers(),
            }],
            influxdb: Some(InfluxDbConfig {
                url: "http://localhost:8086".into(),
                token: "t".into(),
                organisation: "o".into(),
                bucket: "solarpi".into(),
            }),
            mqtt: Some(MqttConfig {
                broker: "localhost".into(),
                port: 1883,
                client_id: "solarpi".into(),
                keep_alive_seconds: 30,
            }),
            ..Config::default()
        }
    }

    #[test]
    fn builds_one_reader_per_device_on_shared_bus() {
        let pipeline = Pipeline::with_transport(config(), Transport::new(MemoryLink::new()));
        let names: Vec<&str> = pipeline.readers().iter().map(|r| r.reader.name()).collect();
        assert_eq!(
            names,
            vec!["WR Garage", "Kaco Powador (memory:2)", "SDM630 (memory:3)"]
        );
        assert_eq!(pipeline.readers()[2].period, Duration::from_secs(60));
    }

    #[test]
    fn builds_configured_sinks() {
        let pipeline = Pipeline::with_transport(config(), Transport::new(MemoryLink::new()));
        let sinks = pipeline.configured_sinks();
        let kinds: Vec<&str> = sinks.iter().map(|s| s.sink_type()).collect();
        assert_eq!(kinds, vec!["time-series", "pub/sub"]);
        assert_eq!(sinks[1].destination(), "localhost:1883");
    }

    #[tokio::test]
    async fn read_once_skips_failed_readers() {
        let link = MemoryLink::new();
        link.repeat_response(vec![0u8; 4]);
        let pipeline = Pipeline::with_transport(config(), Transport::new(link));
        assert!(pipeline.read_once().await.is_empty());
    }
}
