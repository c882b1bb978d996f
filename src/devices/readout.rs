use super::measurement::Values;
use super::traits::Reader;
use crate::transport::Transport;
use crate::utils::error::SolarError;

/// Passive listener for a device that streams fixed-length readouts
/// without being asked. Token 1 of each frame is the power in W.
pub struct SerialReadoutReader {
    name: String,
    response_length: usize,
    transport: Transport,
}

impl SerialReadoutReader {
    pub fn new(transport: Transport, response_length: usize, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| format!("SerialReadout ({})", transport.port_name()));
        Self {
            name,
            response_length,
            transport,
        }
    }

    pub fn parse_frame(frame: &[u8]) -> Result<Values, SolarError> {
        let text = String::from_utf8_lossy(frame);
        let token = text
            .split_ascii_whitespace()
            .nth(1)
            .ok_or_else(|| SolarError::InvalidData("Readout frame has no power field".to_string()))?;
        let leistung = token
            .parse::<i64>()
            .map_err(|_| SolarError::InvalidData(format!("leistung: cannot parse '{}'", token)))?;

        let mut values = Values::new();
        values.insert("leistung", leistung);
        Ok(values)
    }
}

impl Reader for SerialReadoutReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_once(&self) -> Result<Values, SolarError> {
        let response = self.transport.acquire().exchange(&[], self.response_length)?;
        if response.len() != self.response_length {
            return Err(SolarError::ResponseLength {
                expected: self.response_length,
                actual: response.len(),
            });
        }
        Self::parse_frame(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::FieldValue;
    use crate::transport::MemoryLink;

    #[test]
    fn reads_without_writing() {
        let link = MemoryLink::new();
        link.push_response(b"P: 1834 W\r\n".to_vec());
        let reader = SerialReadoutReader::new(Transport::new(link.clone()), 11, None);

        let values = reader.read_values(0).unwrap();
        assert_eq!(values.get("leistung"), Some(FieldValue::Int(1834)));
        assert!(link.writes().is_empty());
        assert_eq!(reader.name(), "SerialReadout (memory)");
    }

    #[test]
    fn wrong_length_is_a_failed_attempt() {
        let link = MemoryLink::new();
        link.repeat_response(b"P: 18".to_vec());
        let reader = SerialReadoutReader::new(Transport::new(link.clone()), 11, None);

        assert_eq!(reader.read_values(1).unwrap_err().attempts, 2);
        assert_eq!(link.read_count(), 2);
    }
}
