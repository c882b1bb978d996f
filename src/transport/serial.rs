use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::SolarError;

/// Byte-oriented serial connection as seen by the bus.
///
/// `read` returns at most `len` bytes and may return fewer when the line
/// times out; callers treat a short read as a failed exchange.
pub trait SerialLink: Send {
    fn port_name(&self) -> &str;
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<(), SolarError>;
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SolarError>;
    fn read(&mut self, len: usize) -> Result<Vec<u8>, SolarError>;
}

/// RS-485 adapter opened through the `serialport` crate.
pub struct SerialPortLink {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortLink {
    /// Creates a closed link; the first exchange opens it.
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            warn!("🔌 Closed serial port {} after I/O failure", self.config.port);
        }
    }
}

impl SerialLink for SerialPortLink {
    fn port_name(&self) -> &str {
        &self.config.port
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<(), SolarError> {
        info!("🔌 Opening serial port: {}", self.config.port);
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {} stop bit(s), parity {:?}",
            self.config.baud_rate, self.config.data_bits, self.config.stop_bits, self.config.parity
        );

        let parity = match self.config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let data_bits = match self.config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match self.config.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };

        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .open()
            .map_err(|e| {
                SolarError::ConnectionError(format!(
                    "Failed to open port {}: {}",
                    self.config.port, e
                ))
            })?;

        self.port = Some(port);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, SolarError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SolarError::ConnectionError("Serial port not open".to_string()))?;

        // Leftovers of an earlier timed-out answer would shift this frame.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("Could not clear input buffer on {}: {}", self.config.port, e);
        }

        let result = port.write_all(bytes).and_then(|_| port.flush());
        match result {
            Ok(()) => {
                debug!("📤 {} <- {}", self.config.port, hex::encode(bytes));
                Ok(bytes.len())
            }
            Err(e) => {
                self.close();
                Err(SolarError::CommunicationError(format!("Write failed: {}", e)))
            }
        }
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, SolarError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| SolarError::ConnectionError("Serial port not open".to_string()))?;

        let mut response = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match port.read(&mut response[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close();
                    return Err(SolarError::CommunicationError(format!("Read failed: {}", e)));
                }
            }
        }
        response.truncate(filled);

        debug!("📥 {} -> {}", self.config.port, hex::encode(&response));
        Ok(response)
    }
}
