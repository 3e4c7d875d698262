mod app;
mod cli;
mod error;
mod handlers;
mod hw;
mod notification;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{fake_transport, real_transport, run, run_with_clients};
pub use cli::{Args, ControlRequest, FakeArgs, LogLevel, OutputFormat};
pub use error::{AttemptError, FixtureError, SendError, TransportError};
pub use handlers::{
    Action, CommandCodec, CommandFrame, FrameCodecError, PasswordDigest, SendReceipt,
};
pub use hw::{
    AddressingMode, BleSession, BleTransport, DEFAULT_RETRY_COUNT, Device, DeviceConfig, FakeEvent,
    FakeEventLog, FakeOperation, WriteMode,
};
pub use notification::{
    DeviceStatus, NotificationDecodeError, NotificationHandler, NotificationListener,
};
pub use protocol::EndpointId;
pub use terminal::TerminalClient;
