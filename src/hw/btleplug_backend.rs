use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::OnceCell;
use tokio::time::{Instant, sleep, timeout};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, trace};

use super::hardware::{AddressingMode, BleSession, BleTransport, WriteMode};
use crate::error::TransportError;
use crate::notification::NotificationListener;
use crate::protocol::{self, EndpointId};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(250);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Transport backed by `btleplug`.
#[derive(Debug, Default)]
pub(crate) struct BtleplugTransport {
    manager: OnceCell<Manager>,
}

impl BtleplugTransport {
    /// Creates the real BLE transport. The platform manager is created on first use.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    async fn manager(&self) -> Result<&Manager, TransportError> {
        let manager = self
            .manager
            .get_or_try_init(|| async { Manager::new().await })
            .await?;
        Ok(manager)
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<Adapter>, TransportError> {
        let adapters = self.manager().await?.adapters().await?;
        if adapters.is_empty() {
            return Err(TransportError::NoAdapters);
        }
        Ok(adapters)
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    #[instrument(skip(self), level = "debug")]
    async fn open(
        &self,
        address: &str,
        mode: AddressingMode,
    ) -> Result<Box<dyn BleSession>, TransportError> {
        // btleplug resolves the peer address type from the advertisement.
        debug!(%mode, "requested addressing mode");

        let adapters = self.adapters().await?;
        for adapter in &adapters {
            adapter.start_scan(ScanFilter::default()).await?;
        }

        let discovered = timeout(DISCOVERY_TIMEOUT, find_peripheral(&adapters, address)).await;

        for adapter in &adapters {
            if let Err(error) = adapter.stop_scan().await {
                debug!(?error, "failed to stop adapter scan cleanly");
            }
        }

        let peripheral = match discovered {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(TransportError::DeviceNotFound {
                    address: address.to_string(),
                });
            }
        };

        let prepared = prepare_session(&peripheral).await;
        let characteristics = release_on_error(prepared, || peripheral.disconnect()).await?;

        info!("connected to SwitchBot");
        Ok(Box::new(RealSession {
            peripheral,
            characteristics,
            notifications: None,
        }))
    }
}

/// Connects if needed, discovers services and resolves every endpoint.
async fn prepare_session(
    peripheral: &Peripheral,
) -> Result<HashMap<EndpointId, Characteristic>, TransportError> {
    if !peripheral.is_connected().await? {
        peripheral.connect().await?;
    }
    peripheral.discover_services().await?;
    characteristics_by_endpoint(peripheral)
}

/// Runs `release` when `result` is an error; the original error is kept.
async fn release_on_error<T, F, R>(
    result: Result<T, TransportError>,
    release: F,
) -> Result<T, TransportError>
where
    F: FnOnce() -> R,
    R: Future<Output = Result<(), btleplug::Error>>,
{
    if let Err(error) = &result {
        debug!(%error, "session setup failed; disconnecting");
        if let Err(release_error) = release().await {
            debug!(error = ?release_error, "failed to disconnect after setup error");
        }
    }
    result
}

/// Whether `close` should disconnect given the reported link state.
///
/// An unknown state still disconnects.
fn needs_disconnect(connected: Result<bool, btleplug::Error>) -> bool {
    match connected {
        Ok(connected) => connected,
        Err(error) => {
            debug!(?error, "cannot query connection state; disconnecting anyway");
            true
        }
    }
}

/// Polls every adapter until a peripheral with `address` shows up.
async fn find_peripheral(
    adapters: &[Adapter],
    address: &str,
) -> Result<Peripheral, TransportError> {
    loop {
        for adapter in adapters {
            for peripheral in adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                if properties
                    .address
                    .to_string()
                    .eq_ignore_ascii_case(address)
                    || peripheral.id().to_string().eq_ignore_ascii_case(address)
                {
                    debug!(rssi = ?properties.rssi, "discovered matching peripheral");
                    return Ok(peripheral);
                }
            }
        }

        sleep(DISCOVERY_POLL_INTERVAL).await;
    }
}

fn characteristics_by_endpoint(
    peripheral: &Peripheral,
) -> Result<HashMap<EndpointId, Characteristic>, TransportError> {
    let service_uuid = protocol::endpoint_metadata(EndpointId::ControlService).uuid();
    let service = peripheral
        .services()
        .into_iter()
        .find(|service| service.uuid.to_string().eq_ignore_ascii_case(service_uuid))
        .ok_or(TransportError::MissingEndpoint {
            endpoint: EndpointId::ControlService,
        })?;

    protocol::characteristic_endpoints()
        .map(|endpoint| {
            let uuid = protocol::endpoint_metadata(endpoint).uuid();
            service
                .characteristics
                .iter()
                .find(|characteristic| {
                    characteristic
                        .uuid
                        .to_string()
                        .eq_ignore_ascii_case(uuid)
                })
                .cloned()
                .map(|characteristic| (endpoint, characteristic))
                .ok_or(TransportError::MissingEndpoint { endpoint })
        })
        .collect()
}

/// Active session bound to a real peripheral.
struct RealSession {
    peripheral: Peripheral,
    characteristics: HashMap<EndpointId, Characteristic>,
    notifications: Option<NotificationStream>,
}

impl RealSession {
    fn characteristic_for(&self, endpoint: EndpointId) -> Result<&Characteristic, TransportError> {
        self.characteristics
            .get(&endpoint)
            .ok_or(TransportError::MissingEndpoint { endpoint })
    }

    fn endpoint_for_notification(&self, notification: &ValueNotification) -> Option<EndpointId> {
        protocol::endpoint_for_uuid(&notification.uuid.to_string())
            .filter(|endpoint| self.characteristics.contains_key(endpoint))
    }
}

#[async_trait]
impl BleSession for RealSession {
    #[instrument(
        skip(self, payload),
        level = "trace",
        fields(%endpoint, ?mode, payload_len = payload.len())
    )]
    async fn write(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<bool, TransportError> {
        let characteristic = self.characteristic_for(endpoint)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        // btleplug only returns once the write request has been answered.
        Ok(true)
    }

    #[instrument(skip(self), level = "trace", fields(%endpoint))]
    async fn enable_notifications(&mut self, endpoint: EndpointId) -> Result<(), TransportError> {
        if self.notifications.is_none() {
            self.notifications = Some(self.peripheral.notifications().await?);
        }
        let characteristic = self.characteristic_for(endpoint)?;
        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    #[instrument(skip(self, listener), level = "debug", fields(?timeout))]
    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
        listener: &mut (dyn NotificationListener + Send),
    ) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let stream = self
                .notifications
                .as_mut()
                .ok_or(TransportError::NotificationsNotEnabled)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let notification = match tokio::time::timeout(remaining, stream.next()).await {
                Ok(Some(notification)) => notification,
                Ok(None) => {
                    trace!("notification stream closed while waiting");
                    return Ok(false);
                }
                Err(_elapsed) => {
                    trace!("timed out waiting for notification");
                    return Ok(false);
                }
            };

            let Some(endpoint) = self.endpoint_for_notification(&notification) else {
                trace!(
                    uuid = %notification.uuid,
                    "ignoring notification from unknown characteristic"
                );
                continue;
            };
            listener.on_notification(endpoint, &notification.value);
            return Ok(true);
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        if needs_disconnect(self.peripheral.is_connected().await) {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[tokio::test]
    async fn setup_error_releases_the_link() {
        let releases = AtomicUsize::new(0);

        let result: Result<(), TransportError> = release_on_error(
            Err(TransportError::MissingEndpoint {
                endpoint: EndpointId::StatusCharacteristic,
            }),
            || async {
                releases.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert_matches!(
            result,
            Err(TransportError::MissingEndpoint {
                endpoint: EndpointId::StatusCharacteristic
            })
        );
        assert_eq!(1, releases.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_release_keeps_setup_error() {
        let result: Result<(), TransportError> = release_on_error(
            Err(TransportError::Ble(btleplug::Error::DeviceNotFound)),
            || async { Err(btleplug::Error::NotConnected) },
        )
        .await;

        assert_matches!(
            result,
            Err(TransportError::Ble(btleplug::Error::DeviceNotFound))
        );
    }

    #[tokio::test]
    async fn successful_setup_keeps_the_link() {
        let releases = AtomicUsize::new(0);

        let result = release_on_error(Ok(7), || async {
            releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_matches!(result, Ok(7));
        assert_eq!(0, releases.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case(Ok(true), true)]
    #[case(Ok(false), false)]
    #[case(Err(btleplug::Error::NotConnected), true)]
    fn close_disconnects_unless_known_disconnected(
        #[case] connected: Result<bool, btleplug::Error>,
        #[case] expected: bool,
    ) {
        assert_eq!(expected, needs_disconnect(connected));
    }
}
