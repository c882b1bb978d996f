use async_trait::async_trait;

use crate::devices::Measurement;
use crate::utils::error::SolarError;

/// An external telemetry system measurements are forwarded to.
#[async_trait]
pub trait Sink: Send {
    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;

    /// Opens the connection or session. Called again after any publish failure.
    async fn init(&mut self) -> Result<(), SolarError>;

    async fn publish(&mut self, measurement: &Measurement) -> Result<(), SolarError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Box<S> {
    fn sink_type(&self) -> &str {
        (**self).sink_type()
    }

    fn destination(&self) -> &str {
        (**self).destination()
    }

    async fn init(&mut self) -> Result<(), SolarError> {
        (**self).init().await
    }

    async fn publish(&mut self, measurement: &Measurement) -> Result<(), SolarError> {
        (**self).publish(measurement).await
    }
}
