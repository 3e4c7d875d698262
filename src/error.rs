use thiserror::Error;

use crate::handlers::FrameCodecError;
use crate::hw::FakeOperation;
use crate::protocol::{EndpointId, endpoint_metadata};

/// Errors returned by the BLE transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no SwitchBot with address `{address}` was discovered")]
    DeviceNotFound { address: String },
    #[error(
        "required endpoint `{name}` ({uuid}) was not found on the connected device",
        name = endpoint_metadata(*endpoint).name(),
        uuid = endpoint_metadata(*endpoint).uuid()
    )]
    MissingEndpoint { endpoint: EndpointId },
    #[error("the device is not connected")]
    NotConnected,
    #[error("notifications were not enabled before waiting for one")]
    NotificationsNotEnabled,
    #[error("injected fake failure during {operation}")]
    Injected { operation: FakeOperation },
}

/// Reason a single connect/refresh/write attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("the device did not acknowledge the command")]
    AckFailure,
    #[error(transparent)]
    InvalidFrame(#[from] FrameCodecError),
}

/// Errors returned when sending one action.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("the command frame cannot be transmitted")]
    InvalidFrame(#[source] FrameCodecError),
    #[error("SwitchBot communication failed after {attempts} attempt(s)")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: AttemptError,
    },
}

impl SendError {
    /// Number of attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidFrame(_) => 0,
            Self::ExhaustedRetries { attempts, .. } => *attempts,
        }
    }
}

/// Errors returned when parsing fake transport fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("hex payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
