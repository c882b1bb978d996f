pub mod energy_meter;
pub mod kaco;
pub mod measurement;
pub mod readout;
pub mod traits;

pub use energy_meter::{sdm630_registers, sdm630_registers_named, EnergyMeterReader, MeterRegister};
pub use kaco::KacoPowadorReader;
pub use measurement::{FieldValue, Measurement, Values};
pub use readout::SerialReadoutReader;
pub use traits::{ReadFailure, Reader};
