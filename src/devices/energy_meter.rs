use serde::{Deserialize, Serialize};

use super::measurement::Values;
use super::traits::Reader;
use crate::modbus::{
    decode_f32_be, expected_response_len, parse_register_response, read_input_registers_request,
    READ_INPUT_REGISTERS,
};
use crate::transport::Transport;
use crate::utils::error::SolarError;

/// Each SDM630 parameter is one IEEE-754 float spread over two input registers.
const REGISTERS_PER_VALUE: u16 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterRegister {
    pub name: String,
    pub address: u16,
}

/// Input register map of the Eastron SDM630.
pub const SDM630_REGISTERS: [(&str, u16); 14] = [
    ("l1_voltage", 0x0000),
    ("l2_voltage", 0x0002),
    ("l3_voltage", 0x0004),
    ("l1_current", 0x0006),
    ("l2_current", 0x0008),
    ("l3_current", 0x000A),
    ("l1_power_active", 0x000C),
    ("l2_power_active", 0x000E),
    ("l3_power_active", 0x0010),
    ("total_power_active", 0x0034),
    ("frequency", 0x0046),
    ("import_energy_active", 0x0048),
    ("export_energy_active", 0x004A),
    ("total_energy_active", 0x0156),
];

pub fn sdm630_registers() -> Vec<MeterRegister> {
    SDM630_REGISTERS
        .iter()
        .map(|(name, address)| MeterRegister {
            name: name.to_string(),
            address: *address,
        })
        .collect()
}

/// Looks up SDM630 registers by name, returning the unknown names on failure.
pub fn sdm630_registers_named<'a, I>(names: I) -> Result<Vec<MeterRegister>, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut registers = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        match SDM630_REGISTERS.iter().find(|(n, _)| *n == name) {
            Some((n, address)) => registers.push(MeterRegister {
                name: n.to_string(),
                address: *address,
            }),
            None => unknown.push(name.to_string()),
        }
    }
    if unknown.is_empty() {
        Ok(registers)
    } else {
        Err(unknown)
    }
}

/// Modbus RTU energy meter sharing the RS-485 bus with the inverters.
pub struct EnergyMeterReader {
    name: String,
    unit_id: u8,
    registers: Vec<MeterRegister>,
    transport: Transport,
}

impl EnergyMeterReader {
    pub fn new(
        transport: Transport,
        unit_id: u8,
        registers: Vec<MeterRegister>,
        name: Option<String>,
    ) -> Self {
        let name =
            name.unwrap_or_else(|| format!("SDM630 ({}:{})", transport.port_name(), unit_id));
        Self {
            name,
            unit_id,
            registers,
            transport,
        }
    }

    fn read_register(&self, register: &MeterRegister) -> Result<f32, SolarError> {
        let request = read_input_registers_request(self.unit_id, register.address, REGISTERS_PER_VALUE);
        let response = self
            .transport
            .acquire()
            .exchange(&request, expected_response_len(REGISTERS_PER_VALUE))?;

        let data = parse_register_response(
            self.unit_id,
            READ_INPUT_REGISTERS,
            &response,
            REGISTERS_PER_VALUE,
        )?;
        decode_f32_be(&data)
            .first()
            .copied()
            .ok_or(SolarError::InvalidResponse)
    }
}

impl Reader for EnergyMeterReader {
    fn name(&self) -> &str {
        &self.name
    }

    /// One exchange per register; other readers may use the bus in between.
    fn read_once(&self) -> Result<Values, SolarError> {
        let mut values = Values::new();
        for register in &self.registers {
            let value = self.read_register(register)?;
            values.insert(register.name.clone(), value);
        }
        Ok(values)
    }
}
