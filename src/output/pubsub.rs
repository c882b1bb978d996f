use async_trait::async_trait;
use log::{info, warn};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::sink::Sink;
use crate::config::MqttConfig;
use crate::devices::Measurement;
use crate::utils::error::SolarError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 64;

#[async_trait]
pub trait PubSubBackend: Send {
    async fn connect(&mut self, broker: &str, port: u16, client_id: &str) -> Result<(), SolarError>;

    async fn publish(&mut self, topic: &str, payload: String) -> Result<(), SolarError>;
}

/// `wr garage` + `status` -> `wr_garage/status`
pub fn topic_for(device_name: &str, field: &str) -> String {
    format!("{}/{}", device_name.to_lowercase().replace(' ', "_"), field)
}

/// Publishes one message per field of each measurement.
pub struct PubSubSink<B> {
    destination: String,
    broker: String,
    port: u16,
    client_id: String,
    backend: B,
}

impl<B: PubSubBackend> PubSubSink<B> {
    pub fn new(broker: impl Into<String>, port: u16, client_id: impl Into<String>, backend: B) -> Self {
        let broker = broker.into();
        Self {
            destination: format!("{}:{}", broker, port),
            broker,
            port,
            client_id: client_id.into(),
            backend,
        }
    }
}

#[async_trait]
impl<B: PubSubBackend> Sink for PubSubSink<B> {
    fn sink_type(&self) -> &str {
        "pub/sub"
    }

    fn destination(&self) -> &str {
        &self.destination
    }

    async fn init(&mut self) -> Result<(), SolarError> {
        self.backend
            .connect(&self.broker, self.port, &self.client_id)
            .await
    }

    async fn publish(&mut self, measurement: &Measurement) -> Result<(), SolarError> {
        for (field, value) in measurement.values().iter() {
            let topic = topic_for(measurement.device_name(), field);
            self.backend.publish(&topic, value.to_string()).await?;
        }
        Ok(())
    }
}

/// MQTT 3.1.1 via `rumqttc`. The event loop runs in its own task once connected.
pub struct MqttBackend {
    keep_alive: Duration,
    client: Option<AsyncClient>,
    event_loop: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl MqttBackend {
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            keep_alive: Duration::from_secs(config.keep_alive_seconds.max(5)),
            client: None,
            event_loop: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
        self.client = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for MqttBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[async_trait]
impl PubSubBackend for MqttBackend {
    async fn connect(&mut self, broker: &str, port: u16, client_id: &str) -> Result<(), SolarError> {
        self.teardown();
        info!("📻 Connecting to MQTT broker {}:{} as {}", broker, port, client_id);

        let mut options = MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(self.keep_alive);
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connack = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(SolarError::from(e)),
                }
            }
        })
        .await??;

        if connack.code != ConnectReturnCode::Success {
            return Err(SolarError::ConnectionError(format!(
                "Failed to connect, return code {:?}",
                connack.code
            )));
        }

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = event_loop.poll().await {
                    warn!("⚠️ MQTT connection lost: {}", e);
                    flag.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        self.connected = connected;
        self.client = Some(client);
        self.event_loop = Some(handle);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: String) -> Result<(), SolarError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SolarError::ConnectionError("MQTT connection is stale".to_string()));
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SolarError::NotInitialized("mqtt".to_string()))?;

        client
            .publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .await?;
        Ok(())
    }
}
