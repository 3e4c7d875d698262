use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use super::status_refresher::StatusRefresher;
use super::{Action, CommandCodec, CommandFrame};
use crate::error::{AttemptError, SendError};
use crate::hw::{Device, WriteMode};
use crate::protocol::EndpointId;
use crate::utils::format_hex;

/// Pause between a failed attempt and the next one.
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Receipt for an acknowledged action.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SendReceipt {
    action: Action,
    frame: CommandFrame,
    attempts: u32,
}

impl SendReceipt {
    /// The action that was acknowledged.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// The frame written to the device.
    #[must_use]
    pub fn frame(&self) -> &CommandFrame {
        &self.frame
    }

    /// Attempts used, including the successful one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Runs connect, status refresh, write and disconnect with bounded retries.
pub(crate) struct CommandSender;

impl CommandSender {
    /// Sends `action`, retrying the whole cycle up to `retries` more times.
    ///
    /// The device is disconnected after every attempt, whatever its outcome.
    #[instrument(skip(device), level = "info", fields(address = %device.address()))]
    pub(crate) async fn send(
        device: &mut Device,
        action: Action,
        retries: u32,
    ) -> Result<SendReceipt, SendError> {
        let frame = CommandCodec::encode(action, device.password_digest());
        let payload = frame.to_bytes().map_err(SendError::InvalidFrame)?;
        info!(%frame, "sending command to SwitchBot");

        let mut attempts = 0;
        let mut retries_remaining = retries;
        loop {
            attempts += 1;
            let outcome = Self::attempt(device, &payload).await;
            device.disconnect().await;

            let error = match outcome {
                Ok(()) => {
                    info!(attempts, "SwitchBot acknowledged command");
                    return Ok(SendReceipt {
                        action,
                        frame,
                        attempts,
                    });
                }
                Err(error) => error,
            };

            if retries_remaining == 0 {
                error!(%error, attempts, "SwitchBot communication failed; stopping");
                return Err(SendError::ExhaustedRetries {
                    attempts,
                    last: error,
                });
            }

            warn!(%error, retries_remaining, "cannot reach SwitchBot; retrying");
            sleep(RETRY_BACKOFF).await;
            retries_remaining -= 1;
        }
    }

    async fn attempt(device: &mut Device, payload: &[u8]) -> Result<(), AttemptError> {
        device.connect().await?;
        StatusRefresher::refresh(device).await?;

        let acknowledged = device
            .session()?
            .write(EndpointId::CommandCharacteristic, payload, WriteMode::WithResponse)
            .await?;
        if !acknowledged {
            error!(
                payload = %format_hex(payload),
                "sent command but the SwitchBot did not confirm it"
            );
            return Err(AttemptError::AckFailure);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::TransportError;
    use crate::hw::{
        DeviceConfig, FakeEvent, FakeEventLog, FakeOperation, FakeTransportConfig, fake_transport,
    };

    fn device(retry_count: u32, password: Option<&str>, config: FakeTransportConfig) -> Device {
        Device::new(
            DeviceConfig::builder()
                .address("AA:BB:CC:DD:EE:FF")
                .retry_count(retry_count)
                .maybe_password(password)
                .build(),
            fake_transport(config),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn send_returns_receipt_on_first_success() {
        let mut device = device(3, None, FakeTransportConfig::builder().build());

        let receipt = device
            .send(Action::Press)
            .await
            .expect("send should succeed");

        assert_eq!(Action::Press, receipt.action());
        assert_eq!("570100", receipt.frame().as_hex());
        assert_eq!(1, receipt.attempts());
        assert_eq!(false, device.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_last_error() {
        let event_log = FakeEventLog::default();
        let mut device = device(
            2,
            None,
            FakeTransportConfig::builder()
                .failing_opens(usize::MAX)
                .event_log(event_log.clone())
                .build(),
        );

        let result = device.send(Action::On).await;

        assert_matches!(
            result,
            Err(SendError::ExhaustedRetries {
                attempts: 3,
                last: AttemptError::Transport(TransportError::Injected { .. }),
            })
        );
        assert_eq!(
            3,
            event_log.count(|event| matches!(event, FakeEvent::Open { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_write_is_retried() {
        let event_log = FakeEventLog::default();
        let mut device = device(
            1,
            None,
            FakeTransportConfig::builder()
                .status_notification("004B1E".parse().expect("valid hex"))
                .unacknowledged_writes(2)
                .event_log(event_log.clone())
                .build(),
        );

        let receipt = device
            .send(Action::Off)
            .await
            .expect("second attempt should succeed");

        assert_eq!(2, receipt.attempts());
        assert_eq!(
            vec![vec![0x57, 0x12], vec![0x57, 0x01, 0x02], vec![0x57, 0x01, 0x02]],
            event_log.writes_to(EndpointId::CommandCharacteristic)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ack_failure_without_retries_is_terminal() {
        let mut device = device(
            0,
            None,
            FakeTransportConfig::builder()
                .status_notification("004B1E".parse().expect("valid hex"))
                .unacknowledged_writes(2)
                .build(),
        );

        let result = device.send(Action::Press).await;

        assert_matches!(
            result,
            Err(SendError::ExhaustedRetries {
                attempts: 1,
                last: AttemptError::AckFailure,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notification_enable_aborts_attempt() {
        let event_log = FakeEventLog::default();
        let mut device = device(
            0,
            None,
            FakeTransportConfig::builder()
                .status_notification("004B1E".parse().expect("valid hex"))
                .failing_enables(1)
                .event_log(event_log.clone())
                .build(),
        );

        let result = device.send(Action::Press).await;

        assert_matches!(
            result,
            Err(SendError::ExhaustedRetries {
                attempts: 1,
                last: AttemptError::Transport(TransportError::Injected {
                    operation: FakeOperation::EnableNotifications,
                }),
            })
        );
        assert_eq!(
            Vec::<Vec<u8>>::new(),
            event_log.writes_to(EndpointId::CommandCharacteristic)
        );
        assert_eq!(1, event_log.count(|event| matches!(event, FakeEvent::Close)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notification_wait_aborts_attempt_and_retries() {
        let event_log = FakeEventLog::default();
        let mut device = device(
            1,
            None,
            FakeTransportConfig::builder()
                .status_notification("004B1E".parse().expect("valid hex"))
                .failing_waits(1)
                .event_log(event_log.clone())
                .build(),
        );

        let receipt = device
            .send(Action::On)
            .await
            .expect("second attempt should succeed");

        assert_eq!(2, receipt.attempts());
        assert_eq!(
            vec![vec![0x57, 0x12], vec![0x57, 0x12], vec![0x57, 0x01, 0x01]],
            event_log.writes_to(EndpointId::CommandCharacteristic)
        );
        assert_eq!(2, event_log.count(|event| matches!(event, FakeEvent::Close)));
    }

    #[tokio::test(start_paused = true)]
    async fn odd_width_digest_fails_before_connecting() {
        let event_log = FakeEventLog::default();
        let password = (0..)
            .map(|index| format!("pw{index}"))
            .find(|candidate| {
                (0x0100_0000..0x1000_0000).contains(&crc32fast::hash(candidate.as_bytes()))
            })
            .expect("some candidate has a seven-digit checksum");
        let mut device = device(
            3,
            Some(password.as_str()),
            FakeTransportConfig::builder()
                .event_log(event_log.clone())
                .build(),
        );

        let result = device.send(Action::Press).await;

        assert_matches!(result, Err(SendError::InvalidFrame(_)));
        assert_eq!(Vec::<FakeEvent>::new(), event_log.events());
    }
}
