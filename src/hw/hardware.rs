use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::btleplug_backend::BtleplugTransport;
use super::fake_backend::{FakeTransport, FakeTransportConfig};
use crate::error::TransportError;
use crate::notification::NotificationListener;
use crate::protocol::EndpointId;

/// BLE write mode. Every SwitchBot write asks for a response.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WriteMode {
    WithResponse,
}

/// Peer address type requested when opening a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum AddressingMode {
    /// Random (private) address; the actuator only accepts this mode.
    #[display("random")]
    Random,
}

/// Opens sessions to BLE peripherals.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Connects to the peripheral at `address` and resolves its SwitchBot endpoints.
    async fn open(
        &self,
        address: &str,
        mode: AddressingMode,
    ) -> Result<Box<dyn BleSession>, TransportError>;
}

/// One live connection to a peripheral.
#[async_trait]
pub trait BleSession: Send {
    /// Writes `payload` to `endpoint`, returning the device-level acknowledgement.
    async fn write(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<bool, TransportError>;

    /// Arms notification delivery for `endpoint`.
    async fn enable_notifications(&mut self, endpoint: EndpointId) -> Result<(), TransportError>;

    /// Waits up to `timeout` for one notification and hands it to `listener`.
    ///
    /// Returns whether a notification arrived. Running out of time is not an error.
    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
        listener: &mut (dyn NotificationListener + Send),
    ) -> Result<bool, TransportError>;

    /// Releases the connection.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

#[cfg(test)]
impl std::fmt::Debug for dyn BleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BleSession")
    }
}

/// Creates a transport backed by the platform BLE stack.
#[must_use]
pub(crate) fn real_transport() -> Box<dyn BleTransport> {
    Box::new(BtleplugTransport::new())
}

/// Creates a scripted in-memory transport.
#[must_use]
pub(crate) fn fake_transport(config: FakeTransportConfig) -> Box<dyn BleTransport> {
    info!("using fake BLE backend");
    Box::new(FakeTransport::new(config))
}
