use super::crc::crc16_modbus;
use crate::utils::error::SolarError;

pub const READ_INPUT_REGISTERS: u8 = 0x04;
const EXCEPTION_FLAG: u8 = 0x80;

/// Builds a read request: unit, function, start (BE), count (BE), CRC (LE).
pub fn read_registers_request(unit_id: u8, function: u8, start_addr: u16, count: u16) -> Vec<u8> {
    let mut request = vec![unit_id, function];
    request.extend_from_slice(&start_addr.to_be_bytes());
    request.extend_from_slice(&count.to_be_bytes());

    let crc = crc16_modbus(&request);
    request.extend_from_slice(&crc.to_le_bytes());
    request
}

pub fn read_input_registers_request(unit_id: u8, start_addr: u16, count: u16) -> Vec<u8> {
    read_registers_request(unit_id, READ_INPUT_REGISTERS, start_addr, count)
}

/// Address + function + byte count + data + 2 CRC bytes.
pub fn expected_response_len(count: u16) -> usize {
    5 + (count as usize) * 2
}

/// Validates a register read response and returns only the data bytes.
pub fn parse_register_response(
    unit_id: u8,
    function: u8,
    response: &[u8],
    count: u16,
) -> Result<Vec<u8>, SolarError> {
    // Exception frames are 5 bytes: unit, function|0x80, code, CRC
    if response.len() == 5 && response[1] == function | EXCEPTION_FLAG {
        verify_crc(response)?;
        return Err(SolarError::DeviceException(response[2]));
    }

    let expected = expected_response_len(count);
    if response.len() != expected {
        return Err(SolarError::ResponseLength {
            expected,
            actual: response.len(),
        });
    }

    verify_crc(response)?;

    if response[0] != unit_id || response[1] != function {
        return Err(SolarError::InvalidResponse);
    }
    if response[2] as usize != (count as usize) * 2 {
        return Err(SolarError::InvalidData(format!(
            "byte count {} does not match {} registers",
            response[2], count
        )));
    }

    Ok(response[3..expected - 2].to_vec())
}

fn verify_crc(frame: &[u8]) -> Result<(), SolarError> {
    let data_len = frame.len() - 2;
    let received_crc = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    if received_crc != crc16_modbus(&frame[..data_len]) {
        return Err(SolarError::CrcError);
    }
    Ok(())
}

/// Decodes consecutive big-endian IEEE-754 floats (two registers each).
pub fn decode_f32_be(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
pub(crate) fn build_response(unit_id: u8, function: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![unit_id, function, data.len() as u8];
    frame.extend_from_slice(data);
    let crc = crc16_modbus(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}
