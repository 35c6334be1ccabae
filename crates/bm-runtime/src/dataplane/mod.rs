//! Packet processing side of the switch.

mod driver;

pub use driver::{DataPlaneDriver, DriverConfig, DriverStats, PacketProcessor, ProcessedPacket, RawPacket, TableWalker};
