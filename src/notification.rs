use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::protocol::EndpointId;
use crate::utils::format_hex;

const STATUS_PAYLOAD_MIN_LEN: usize = 3;

/// Battery and firmware status reported by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceStatus {
    battery_percent: u8,
    firmware_version: f32,
}

impl DeviceStatus {
    /// Raw battery level; the firmware keeps it within `0..=100`.
    #[must_use]
    pub fn battery_percent(self) -> u8 {
        self.battery_percent
    }

    /// Firmware version with one fractional digit.
    #[must_use]
    pub fn firmware_version(self) -> f32 {
        self.firmware_version
    }
}

/// Errors returned while decoding notification payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NotificationDecodeError {
    #[error("status payload has {len} byte(s), expected at least {required}")]
    PayloadTooShort { len: usize, required: usize },
}

/// Decodes raw status notification payloads.
pub struct NotificationHandler;

impl NotificationHandler {
    /// Decodes one status notification payload.
    ///
    /// Byte 1 is the battery level and byte 2 is the firmware version times ten.
    ///
    /// ```
    /// use switchbot::NotificationHandler;
    ///
    /// let status = NotificationHandler::decode(&[0x00, 0x4B, 0x1E])?;
    /// assert_eq!(75, status.battery_percent());
    /// assert_eq!(3.0, status.firmware_version());
    /// # Ok::<(), switchbot::NotificationDecodeError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is shorter than three bytes.
    #[instrument(skip(payload), level = "trace", fields(payload_len = payload.len()))]
    pub fn decode(payload: &[u8]) -> Result<DeviceStatus, NotificationDecodeError> {
        let &[_, battery_percent, firmware, ..] = payload else {
            return Err(NotificationDecodeError::PayloadTooShort {
                len: payload.len(),
                required: STATUS_PAYLOAD_MIN_LEN,
            });
        };

        Ok(DeviceStatus {
            battery_percent,
            firmware_version: f32::from(firmware) / 10.0,
        })
    }
}

/// Receives notifications delivered by a BLE session.
///
/// Called synchronously from inside the session's notification wait, so
/// implementations must only update in-memory state.
pub trait NotificationListener {
    /// Handles one notification payload from `endpoint`.
    fn on_notification(&mut self, endpoint: EndpointId, payload: &[u8]);
}

/// Last-known device status cached on a device handle.
#[derive(Debug, Default)]
pub(crate) struct StatusCache {
    status: Option<DeviceStatus>,
    last_refresh: Option<Instant>,
    updates: u64,
}

impl StatusCache {
    pub(crate) fn status(&self) -> Option<DeviceStatus> {
        self.status
    }

    pub(crate) fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Number of status notifications decoded so far.
    pub(crate) fn updates(&self) -> u64 {
        self.updates
    }

    /// Records a confirmed refresh; never moves the timestamp backwards.
    pub(crate) fn mark_refreshed(&mut self, at: Instant) {
        self.last_refresh = Some(self.last_refresh.map_or(at, |last| last.max(at)));
    }
}

impl NotificationListener for StatusCache {
    fn on_notification(&mut self, endpoint: EndpointId, payload: &[u8]) {
        if endpoint != EndpointId::StatusCharacteristic {
            debug!(%endpoint, "ignoring notification from unexpected endpoint");
            return;
        }

        match NotificationHandler::decode(payload) {
            Ok(status) => {
                info!(
                    battery_percent = status.battery_percent,
                    firmware_version = status.firmware_version,
                    "received SwitchBot status notification"
                );
                self.status = Some(status);
                self.updates += 1;
            }
            Err(error) => {
                warn!(
                    %error,
                    payload = %format_hex(payload),
                    "discarding malformed status notification"
                );
            }
        }
    }
}
