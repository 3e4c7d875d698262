use std::fmt;

use bon::Builder;
use tracing::{debug, instrument, warn};

use super::hardware::{AddressingMode, BleSession, BleTransport};
use crate::error::{SendError, TransportError};
use crate::handlers::{Action, CommandSender, PasswordDigest, SendReceipt};
use crate::notification::{DeviceStatus, StatusCache};

/// Default number of retries after a failed attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Settings used to construct a [`Device`].
#[derive(Clone, Builder)]
pub struct DeviceConfig {
    /// Hardware address of the actuator.
    #[builder(into)]
    address: String,
    /// Maximum retries per action after the first attempt.
    #[builder(default = DEFAULT_RETRY_COUNT)]
    retry_count: u32,
    /// Optional shared secret configured on the device.
    #[builder(into)]
    password: Option<String>,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("address", &self.address)
            .field("retry_count", &self.retry_count)
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

/// Handle to one SwitchBot actuator.
///
/// Owns at most one live BLE session. Every operation takes `&mut self`, so a
/// handle cannot drive two connections at once.
pub struct Device {
    address: String,
    retry_count: u32,
    password_digest: PasswordDigest,
    transport: Box<dyn BleTransport>,
    connection: Option<Box<dyn BleSession>>,
    status: StatusCache,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .field("retry_count", &self.retry_count)
            .field("has_password", &!self.password_digest.is_empty())
            .field("connected", &self.connection.is_some())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Creates a disconnected device handle.
    ///
    /// ```
    /// use switchbot::{Device, DeviceConfig};
    ///
    /// let config = DeviceConfig::builder()
    ///     .address("AA:BB:CC:DD:EE:FF")
    ///     .password("secret")
    ///     .build();
    /// let device = Device::new(config, switchbot::real_transport());
    /// assert_eq!(3, device.retry_count());
    /// assert!(!device.is_connected());
    /// ```
    #[must_use]
    pub fn new(config: DeviceConfig, transport: Box<dyn BleTransport>) -> Self {
        let DeviceConfig {
            address,
            retry_count,
            password,
        } = config;
        let password_digest = PasswordDigest::from_password(password.as_deref());
        debug!(%address, digest = %password_digest, "created SwitchBot handle");

        Self {
            address,
            retry_count,
            password_digest,
            transport,
            connection: None,
            status: StatusCache::default(),
        }
    }

    /// Hardware address of the actuator.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Configured retry budget per action.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Digest embedded in every frame; empty when there is no password.
    #[must_use]
    pub fn password_digest(&self) -> &PasswordDigest {
        &self.password_digest
    }

    /// Whether a BLE session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Last status reported by the device, if any has been received.
    #[must_use]
    pub fn status(&self) -> Option<DeviceStatus> {
        self.status.status()
    }

    /// Last-known battery level.
    #[must_use]
    pub fn battery_percent(&self) -> Option<u8> {
        self.status().map(DeviceStatus::battery_percent)
    }

    /// Last-known firmware version.
    #[must_use]
    pub fn firmware_version(&self) -> Option<f32> {
        self.status().map(DeviceStatus::firmware_version)
    }

    /// Switches the device on. Returns whether the device acknowledged it.
    pub async fn turn_on(&mut self) -> bool {
        self.send(Action::On).await.is_ok()
    }

    /// Switches the device off. Returns whether the device acknowledged it.
    pub async fn turn_off(&mut self) -> bool {
        self.send(Action::Off).await.is_ok()
    }

    /// Presses the button. Returns whether the device acknowledged it.
    pub async fn press(&mut self) -> bool {
        self.send(Action::Press).await.is_ok()
    }

    /// Sends `action` using the configured retry budget.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be transmitted or every attempt failed.
    pub async fn send(&mut self, action: Action) -> Result<SendReceipt, SendError> {
        let retries = self.retry_count;
        CommandSender::send(self, action, retries).await
    }

    /// Opens a session unless one is already open.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub(crate) async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connection.is_some() {
            return Ok(());
        }

        debug!("connecting to SwitchBot");
        match self
            .transport
            .open(&self.address, AddressingMode::Random)
            .await
        {
            Ok(session) => {
                self.connection = Some(session);
                debug!("connected to SwitchBot");
                Ok(())
            }
            Err(error) => {
                debug!(%error, "failed connecting to SwitchBot");
                Err(error)
            }
        }
    }

    /// Releases the session, if any. Close failures are logged and swallowed.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub(crate) async fn disconnect(&mut self) {
        let Some(session) = self.connection.take() else {
            return;
        };

        debug!("disconnecting");
        if let Err(error) = session.close().await {
            warn!(%error, "error disconnecting from SwitchBot");
        }
    }

    /// Returns the open session, or `NotConnected`.
    pub(crate) fn session(&mut self) -> Result<&mut Box<dyn BleSession>, TransportError> {
        self.connection.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Returns the open session together with the status cache it reports into.
    pub(crate) fn session_and_status(
        &mut self,
    ) -> Result<(&mut Box<dyn BleSession>, &mut StatusCache), TransportError> {
        let session = self
            .connection
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        Ok((session, &mut self.status))
    }

    pub(crate) fn status_cache(&self) -> &StatusCache {
        &self.status
    }
}
