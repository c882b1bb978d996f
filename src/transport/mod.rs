pub mod bus;
pub mod memory;
pub mod serial;

pub use bus::{Transport, TransportGuard};
pub use memory::MemoryLink;
pub use serial::{SerialLink, SerialPortLink};
