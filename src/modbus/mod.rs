pub mod crc;
pub mod protocol;

pub use crc::crc16_modbus;
pub use protocol::{
    decode_f32_be, expected_response_len, parse_register_response, read_input_registers_request,
    READ_INPUT_REGISTERS,
};
