use log::debug;

use super::measurement::Values;
use super::traits::Reader;
use crate::transport::Transport;
use crate::utils::error::SolarError;

#[derive(Debug, Clone, Copy)]
enum Field {
    Int,
    Float,
    /// Reported in A, stored in mA.
    Scaled(f64),
}

/// Token 1..=9 of the "get all" answer.
const FIELDS: [(&str, Field); 9] = [
    ("status", Field::Int),
    ("generatorspannung", Field::Float),
    ("generatorstrom", Field::Scaled(1000.0)),
    ("generatorleistung", Field::Float),
    ("netzspannung", Field::Float),
    ("einspeisestrom", Field::Scaled(1000.0)),
    ("einspeiseleistung", Field::Float),
    ("temperatur", Field::Float),
    ("tagesertrag", Field::Float),
];

/// Field names in frame order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().map(|(name, _)| *name)
}

/// Kaco Powador inverter on the RS-485 bus (ASCII protocol).
pub struct KacoPowadorReader {
    name: String,
    bus_address: u8,
    transport: Transport,
}

impl KacoPowadorReader {
    pub const RESPONSE_LENGTH: usize = 66;
    pub const GET_ALL_CMD: u8 = 0;

    pub fn new(transport: Transport, bus_address: u8, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| {
            format!("Kaco Powador ({}:{})", transport.port_name(), bus_address)
        });
        Self {
            name,
            bus_address,
            transport,
        }
    }

    /// `#` + two-digit bus address + command + CR.
    pub fn command_frame(&self, command: u8) -> Vec<u8> {
        format!("#{:02}{}\r", self.bus_address, command).into_bytes()
    }

    pub fn parse_frame(frame: &[u8]) -> Result<Values, SolarError> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| SolarError::InvalidData("Non-ASCII inverter frame".to_string()))?;

        // Token 0 echoes address and command.
        let tokens: Vec<&str> = text.split_ascii_whitespace().skip(1).take(FIELDS.len()).collect();
        if tokens.len() < FIELDS.len() {
            return Err(SolarError::InvalidData(format!(
                "Expected {} fields, found {}",
                FIELDS.len(),
                tokens.len()
            )));
        }

        let mut values = Values::new();
        for ((name, field), token) in FIELDS.iter().zip(tokens) {
            let invalid = || SolarError::InvalidData(format!("{}: cannot parse '{}'", name, token));
            match field {
                Field::Int => values.insert(*name, token.parse::<i64>().map_err(|_| invalid())?),
                Field::Float => values.insert(*name, token.parse::<f64>().map_err(|_| invalid())?),
                Field::Scaled(factor) => {
                    values.insert(*name, token.parse::<f64>().map_err(|_| invalid())? * factor)
                }
            }
        }
        Ok(values)
    }
}

impl Reader for KacoPowadorReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_once(&self) -> Result<Values, SolarError> {
        let command = self.command_frame(Self::GET_ALL_CMD);
        let response = self
            .transport
            .acquire()
            .exchange(&command, Self::RESPONSE_LENGTH)?;

        if response.len() != Self::RESPONSE_LENGTH {
            return Err(SolarError::ResponseLength {
                expected: Self::RESPONSE_LENGTH,
                actual: response.len(),
            });
        }

        debug!("{}: {}", self.name, String::from_utf8_lossy(&response).trim());
        Self::parse_frame(&response)
    }
}

/// Pads an answer to the fixed frame length the way the inverter does.
pub fn encode_frame(bus_address: u8, tokens: &[&str]) -> Vec<u8> {
    let mut text = format!("\n*{:02}{} {}", bus_address, KacoPowadorReader::GET_ALL_CMD, tokens.join(" "));
    while text.len() < KacoPowadorReader::RESPONSE_LENGTH - 1 {
        text.push(' ');
    }
    text.push('\r');
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::FieldValue;
    use crate::transport::MemoryLink;

    const RAW: [&str; 9] = ["4", "360.2", "0.43", "155", "231.8", "0.59", "131", "34", "1627"];

    #[test]
    fn command_frame_format() {
        let reader = KacoPowadorReader::new(Transport::new(MemoryLink::new()), 1, None);
        assert_eq!(reader.command_frame(0), b"#010\r".to_vec());
        assert_eq!(reader.name(), "Kaco Powador (memory:1)");
    }

    #[test]
    fn currents_are_scaled_and_others_verbatim() {
        let frame = encode_frame(1, &RAW);
        assert_eq!(frame.len(), KacoPowadorReader::RESPONSE_LENGTH);

        let values = KacoPowadorReader::parse_frame(&frame).unwrap();
        assert_eq!(values.get("status"), Some(FieldValue::Int(4)));
        assert_eq!(values.get("generatorstrom"), Some(FieldValue::Float(0.43 * 1000.0)));
        assert_eq!(values.get("einspeisestrom"), Some(FieldValue::Float(0.59 * 1000.0)));
        assert_eq!(values.get("generatorspannung"), Some(FieldValue::Float(360.2)));
        assert_eq!(values.get("generatorleistung"), Some(FieldValue::Float(155.0)));
        assert_eq!(values.get("netzspannung"), Some(FieldValue::Float(231.8)));
        assert_eq!(values.get("einspeiseleistung"), Some(FieldValue::Float(131.0)));
        assert_eq!(values.get("temperatur"), Some(FieldValue::Float(34.0)));
        assert_eq!(values.get("tagesertrag"), Some(FieldValue::Float(1627.0)));
        assert_eq!(values.len(), 9);
    }

    #[test]
    fn garbage_token_is_rejected() {
        let mut raw = RAW;
        raw[4] = "23x.8";
        let err = KacoPowadorReader::parse_frame(&encode_frame(1, &raw)).unwrap_err();
        assert!(matches!(err, SolarError::InvalidData(_)));
    }

    #[test]
    fn short_frame_retries_then_fails() {
        let link = MemoryLink::new();
        link.repeat_response(vec![b' '; 10]);
        let reader = KacoPowadorReader::new(Transport::new(link.clone()), 2, None);

        let failure = reader.read_values(2).unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(link.writes().len(), 3);
        assert!(link.writes().iter().all(|w| w == b"#020\r"));
    }

    #[test]
    fn recovers_on_second_attempt() {
        let link = MemoryLink::new();
        link.push_response(vec![b' '; 10]);
        link.push_response(encode_frame(3, &RAW));
        let reader = KacoPowadorReader::new(Transport::new(link.clone()), 3, Some("WR Garage".into()));

        let values = reader.read_values(1).unwrap();
        assert_eq!(values.get("status"), Some(FieldValue::Int(4)));
        assert_eq!(link.read_count(), 2);
    }
}
