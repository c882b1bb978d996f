use async_trait::async_trait;
use chrono::{DateTime, Utc};
use influxdb2::models::DataPoint;
use influxdb2::Client;
use log::{debug, info};

use super::sink::Sink;
use crate::config::InfluxDbConfig;
use crate::devices::{FieldValue, Measurement, Values};
use crate::utils::error::SolarError;

/// One time-series record.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Values,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// Measurement name and `device` tag are the device name; every value becomes a field.
    pub fn from_measurement(measurement: &Measurement) -> Self {
        Self {
            measurement: measurement.device_name().to_string(),
            tags: vec![("device".to_string(), measurement.device_name().to_string())],
            fields: measurement.values().clone(),
            timestamp: measurement.captured_at(),
        }
    }
}

#[async_trait]
pub trait TimeSeriesBackend: Send {
    fn destination(&self) -> &str;

    async fn open(&mut self) -> Result<(), SolarError>;

    async fn write(&mut self, bucket: &str, point: Point) -> Result<(), SolarError>;

    async fn write_batch(&mut self, bucket: &str, points: Vec<Point>) -> Result<(), SolarError> {
        for point in points {
            self.write(bucket, point).await?;
        }
        Ok(())
    }
}

/// Writes one point per measurement into a bucket.
pub struct TimeSeriesSink<B> {
    bucket: String,
    backend: B,
}

impl<B: TimeSeriesBackend> TimeSeriesSink<B> {
    pub fn new(bucket: impl Into<String>, backend: B) -> Self {
        Self {
            bucket: bucket.into(),
            backend,
        }
    }
}

#[async_trait]
impl<B: TimeSeriesBackend> Sink for TimeSeriesSink<B> {
    fn sink_type(&self) -> &str {
        "time-series"
    }

    fn destination(&self) -> &str {
        self.backend.destination()
    }

    async fn init(&mut self) -> Result<(), SolarError> {
        self.backend.open().await
    }

    async fn publish(&mut self, measurement: &Measurement) -> Result<(), SolarError> {
        self.backend
            .write(&self.bucket, Point::from_measurement(measurement))
            .await
    }
}

/// InfluxDB 2.x over HTTP.
pub struct InfluxDbBackend {
    config: InfluxDbConfig,
    client: Option<Client>,
}

impl InfluxDbBackend {
    pub fn new(config: InfluxDbConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    fn client(&self) -> Result<&Client, SolarError> {
        self.client
            .as_ref()
            .ok_or_else(|| SolarError::NotInitialized(self.config.url.clone()))
    }
}

pub fn to_data_point(point: &Point) -> Result<DataPoint, SolarError> {
    let timestamp = point.timestamp.timestamp_nanos_opt().ok_or_else(|| {
        SolarError::InvalidData(format!("Timestamp out of range: {}", point.timestamp))
    })?;

    let mut builder = DataPoint::builder(point.measurement.as_str());
    for (key, value) in &point.tags {
        builder = builder.tag(key.as_str(), value.as_str());
    }
    for (name, value) in point.fields.iter() {
        builder = match value {
            FieldValue::Int(v) => builder.field(name, v),
            FieldValue::Float(v) => builder.field(name, v),
        };
    }

    builder
        .timestamp(timestamp)
        .build()
        .map_err(|e| SolarError::InvalidData(format!("Invalid data point: {}", e)))
}

#[async_trait]
impl TimeSeriesBackend for InfluxDbBackend {
    fn destination(&self) -> &str {
        &self.config.url
    }

    async fn open(&mut self) -> Result<(), SolarError> {
        info!(
            "🗄️  Connecting to InfluxDB {} (org {}, bucket {})",
            self.config.url, self.config.organisation, self.config.bucket
        );
        let client = Client::new(
            self.config.url.as_str(),
            self.config.organisation.as_str(),
            self.config.token.as_str(),
        );

        if !client.ready().await? {
            return Err(SolarError::SinkError(format!(
                "InfluxDB at {} is not ready",
                self.config.url
            )));
        }

        self.client = Some(client);
        Ok(())
    }

    async fn write(&mut self, bucket: &str, point: Point) -> Result<(), SolarError> {
        self.write_batch(bucket, vec![point]).await
    }

    async fn write_batch(&mut self, bucket: &str, points: Vec<Point>) -> Result<(), SolarError> {
        let data_points = points
            .iter()
            .map(to_data_point)
            .collect::<Result<Vec<_>, _>>()?;
        let count = data_points.len();

        self.client()?
            .write(bucket, futures_util::stream::iter(data_points))
            .await?;

        debug!("Wrote {} point(s) to bucket {}", count, bucket);
        Ok(())
    }
}
