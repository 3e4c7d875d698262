pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod ui;

pub use self::command::{Args, ControlRequest, FakeArgs, LogLevel, OutputFormat};
