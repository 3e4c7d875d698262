use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::time::sleep;
use tracing::{debug, instrument};

use super::hardware::{AddressingMode, BleSession, BleTransport, WriteMode};
use crate::error::{FixtureError, TransportError};
use crate::notification::NotificationListener;
use crate::protocol::EndpointId;

/// Parsed fake hex payload.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct HexPayload {
    payload: Vec<u8>,
}

impl FromStr for HexPayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let payload = hex::decode(cleaned)?;
        Ok(Self { payload })
    }
}

/// Transport operation that a fake script can fail.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum FakeOperation {
    #[display("open")]
    Open,
    #[display("write")]
    Write,
    #[display("enable notifications")]
    EnableNotifications,
    #[display("wait for notification")]
    WaitForNotification,
    #[display("close")]
    Close,
}

/// One transport interaction observed by the fake backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FakeEvent {
    Open {
        address: String,
        mode: AddressingMode,
    },
    EnableNotifications(EndpointId),
    Write {
        endpoint: EndpointId,
        payload: Vec<u8>,
    },
    WaitForNotification,
    Close,
}

/// Shared record of fake transport interactions.
#[derive(Debug, Clone, Default)]
pub struct FakeEventLog {
    events: Arc<Mutex<Vec<FakeEvent>>>,
}

impl FakeEventLog {
    /// Returns a snapshot of every recorded event in order.
    #[must_use]
    pub fn events(&self) -> Vec<FakeEvent> {
        self.lock().clone()
    }

    /// Counts recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&FakeEvent) -> bool) -> usize {
        self.lock().iter().filter(|event| predicate(event)).count()
    }

    /// Returns the payloads written to `endpoint`, in order.
    #[must_use]
    pub fn writes_to(&self, endpoint: EndpointId) -> Vec<Vec<u8>> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                FakeEvent::Write {
                    endpoint: written,
                    payload,
                } if *written == endpoint => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: FakeEvent) {
        debug!(?event, "fake transport event");
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FakeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settings for constructing a fake transport.
#[derive(Debug, Builder)]
pub(crate) struct FakeTransportConfig {
    #[builder(default)]
    failing_opens: usize,
    #[builder(default)]
    failing_writes: usize,
    #[builder(default)]
    unacknowledged_writes: usize,
    #[builder(default)]
    failing_closes: usize,
    #[builder(default)]
    failing_enables: usize,
    #[builder(default)]
    failing_waits: usize,
    status_notification: Option<HexPayload>,
    #[builder(default)]
    open_delay: Duration,
    #[builder(default)]
    event_log: FakeEventLog,
}

/// Remaining scripted failures, shared by every session of one transport.
#[derive(Debug)]
struct FakeScript {
    failing_opens: usize,
    failing_writes: usize,
    unacknowledged_writes: usize,
    failing_closes: usize,
    failing_enables: usize,
    failing_waits: usize,
}

impl FakeScript {
    fn consume(counter: &mut usize) -> bool {
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }
}

/// Fake transport used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    script: Arc<Mutex<FakeScript>>,
    status_notification: Option<Vec<u8>>,
    open_delay: Duration,
    event_log: FakeEventLog,
}

impl FakeTransport {
    /// Creates a fake transport from explicit settings.
    pub(crate) fn new(config: FakeTransportConfig) -> Self {
        let FakeTransportConfig {
            failing_opens,
            failing_writes,
            unacknowledged_writes,
            failing_closes,
            failing_enables,
            failing_waits,
            status_notification,
            open_delay,
            event_log,
        } = config;

        Self {
            script: Arc::new(Mutex::new(FakeScript {
                failing_opens,
                failing_writes,
                unacknowledged_writes,
                failing_closes,
                failing_enables,
                failing_waits,
            })),
            status_notification: status_notification.map(Into::into),
            open_delay,
            event_log,
        }
    }
}

fn lock_script(script: &Mutex<FakeScript>) -> MutexGuard<'_, FakeScript> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BleTransport for FakeTransport {
    #[instrument(skip(self), level = "debug")]
    async fn open(
        &self,
        address: &str,
        mode: AddressingMode,
    ) -> Result<Box<dyn BleSession>, TransportError> {
        if !self.open_delay.is_zero() {
            sleep(self.open_delay).await;
        }

        self.event_log.record(FakeEvent::Open {
            address: address.to_string(),
            mode,
        });
        if FakeScript::consume(&mut lock_script(&self.script).failing_opens) {
            return Err(TransportError::Injected {
                operation: FakeOperation::Open,
            });
        }

        Ok(Box::new(FakeSession {
            script: Arc::clone(&self.script),
            status_notification: self.status_notification.clone(),
            notifications_enabled: false,
            event_log: self.event_log.clone(),
        }))
    }
}

/// A connected fake session.
#[derive(Debug)]
struct FakeSession {
    script: Arc<Mutex<FakeScript>>,
    status_notification: Option<Vec<u8>>,
    notifications_enabled: bool,
    event_log: FakeEventLog,
}

#[async_trait]
impl BleSession for FakeSession {
    async fn write(
        &mut self,
        endpoint: EndpointId,
        payload: &[u8],
        _mode: WriteMode,
    ) -> Result<bool, TransportError> {
        self.event_log.record(FakeEvent::Write {
            endpoint,
            payload: payload.to_vec(),
        });

        let mut script = lock_script(&self.script);
        if FakeScript::consume(&mut script.failing_writes) {
            return Err(TransportError::Injected {
                operation: FakeOperation::Write,
            });
        }
        Ok(!FakeScript::consume(&mut script.unacknowledged_writes))
    }

    async fn enable_notifications(&mut self, endpoint: EndpointId) -> Result<(), TransportError> {
        self.event_log.record(FakeEvent::EnableNotifications(endpoint));
        if FakeScript::consume(&mut lock_script(&self.script).failing_enables) {
            return Err(TransportError::Injected {
                operation: FakeOperation::EnableNotifications,
            });
        }
        self.notifications_enabled = true;
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
        listener: &mut (dyn NotificationListener + Send),
    ) -> Result<bool, TransportError> {
        self.event_log.record(FakeEvent::WaitForNotification);
        if !self.notifications_enabled {
            return Err(TransportError::NotificationsNotEnabled);
        }
        if FakeScript::consume(&mut lock_script(&self.script).failing_waits) {
            return Err(TransportError::Injected {
                operation: FakeOperation::WaitForNotification,
            });
        }

        match &self.status_notification {
            Some(payload) => {
                listener.on_notification(EndpointId::StatusCharacteristic, payload);
                Ok(true)
            }
            None => {
                sleep(timeout).await;
                Ok(false)
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.event_log.record(FakeEvent::Close);
        if FakeScript::consume(&mut lock_script(&self.script).failing_closes) {
            return Err(TransportError::Injected {
                operation: FakeOperation::Close,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("570100", vec![0x57, 0x01, 0x00])]
    #[case("00 4B 1E", vec![0x00, 0x4B, 0x1E])]
    fn hex_payload_parses_spaced_hex(#[case] raw: &str, #[case] expected: Vec<u8>) {
        let payload: HexPayload = raw.parse().expect("hex should parse");
        assert_eq!(expected, Vec::from(payload));
    }

    #[test]
    fn hex_payload_rejects_odd_length() {
        let result = "A".parse::<HexPayload>();
        assert_matches!(
            result,
            Err(FixtureError::InvalidHex(hex::FromHexError::OddLength))
        );
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let event_log = FakeEventLog::default();
        let transport = FakeTransport::new(
            FakeTransportConfig::builder()
                .failing_opens(1)
                .unacknowledged_writes(1)
                .event_log(event_log.clone())
                .build(),
        );

        let first = transport.open("AA", AddressingMode::Random).await;
        assert_matches!(
            first,
            Err(TransportError::Injected {
                operation: FakeOperation::Open
            })
        );

        let mut session = transport
            .open("AA", AddressingMode::Random)
            .await
            .expect("second open should succeed");
        let nack = session
            .write(EndpointId::CommandCharacteristic, &[0x57], WriteMode::WithResponse)
            .await
            .expect("write should not fail");
        let ack = session
            .write(EndpointId::CommandCharacteristic, &[0x57], WriteMode::WithResponse)
            .await
            .expect("write should not fail");
        session.close().await.expect("close should succeed");

        assert_eq!((false, true), (nack, ack));
        assert_eq!(
            2,
            event_log.count(|event| matches!(event, FakeEvent::Open { .. }))
        );
        assert_eq!(1, event_log.count(|event| matches!(event, FakeEvent::Close)));
    }

    #[tokio::test]
    async fn wait_requires_enabled_notifications() {
        let transport = FakeTransport::new(FakeTransportConfig::builder().build());
        let mut session = transport
            .open("AA", AddressingMode::Random)
            .await
            .expect("open should succeed");
        let mut listener = crate::notification::StatusCache::default();

        let result = session
            .wait_for_notification(Duration::from_secs(3), &mut listener)
            .await;
        assert_matches!(result, Err(TransportError::NotificationsNotEnabled));
    }
}
