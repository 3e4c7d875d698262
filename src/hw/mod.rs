mod btleplug_backend;
mod device;
mod fake_backend;
mod hardware;

pub use self::device::{DEFAULT_RETRY_COUNT, Device, DeviceConfig};
pub use self::fake_backend::{FakeEvent, FakeEventLog, FakeOperation};
pub(crate) use self::fake_backend::{FakeTransportConfig, HexPayload};
pub use self::hardware::{AddressingMode, BleSession, BleTransport, WriteMode};
pub(crate) use self::hardware::{fake_transport, real_transport};
