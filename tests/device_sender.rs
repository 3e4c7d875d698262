use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;

const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

fn device(config: switchbot::DeviceConfig, fake: switchbot::FakeArgs) -> switchbot::Device {
    switchbot::Device::new(config, switchbot::fake_transport(fake))
}

fn default_config() -> switchbot::DeviceConfig {
    switchbot::DeviceConfig::builder().address(ADDRESS).build()
}

fn opens(event_log: &switchbot::FakeEventLog) -> usize {
    event_log.count(|event| matches!(event, switchbot::FakeEvent::Open { .. }))
}

fn closes(event_log: &switchbot::FakeEventLog) -> usize {
    event_log.count(|event| matches!(event, switchbot::FakeEvent::Close))
}

fn status_queries(event_log: &switchbot::FakeEventLog) -> usize {
    event_log.count(|event| matches!(event, switchbot::FakeEvent::EnableNotifications(_)))
}

#[tokio::test(start_paused = true)]
async fn press_runs_one_full_cycle_and_records_status() -> anyhow::Result<()> {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .status("00 4B 1E")?
        .event_log(event_log.clone())
        .build();
    let mut device = device(default_config(), fake);

    assert!(device.press().await);

    assert_eq!(
        vec![
            switchbot::FakeEvent::Open {
                address: ADDRESS.to_string(),
                mode: switchbot::AddressingMode::Random,
            },
            switchbot::FakeEvent::EnableNotifications(
                switchbot::EndpointId::StatusCharacteristic
            ),
            switchbot::FakeEvent::Write {
                endpoint: switchbot::EndpointId::CommandCharacteristic,
                payload: vec![0x57, 0x12],
            },
            switchbot::FakeEvent::WaitForNotification,
            switchbot::FakeEvent::Write {
                endpoint: switchbot::EndpointId::CommandCharacteristic,
                payload: vec![0x57, 0x01, 0x00],
            },
            switchbot::FakeEvent::Close,
        ],
        event_log.events()
    );
    assert_eq!(Some(75), device.battery_percent());
    assert_eq!(Some(3.0), device.firmware_version());
    assert!(!device.is_connected());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn password_digest_is_embedded_in_every_frame() -> anyhow::Result<()> {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .status("004B1E")?
        .event_log(event_log.clone())
        .build();
    let config = switchbot::DeviceConfig::builder()
        .address(ADDRESS)
        .password("123456789")
        .build();
    let mut device = device(config, fake);

    assert!(device.turn_on().await);
    assert!(device.turn_off().await);

    assert_eq!(
        vec![
            hex::decode("5712cbf43926")?,
            hex::decode("5711cbf4392601")?,
            hex::decode("5711cbf4392602")?,
        ],
        event_log.writes_to(switchbot::EndpointId::CommandCharacteristic)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unreachable_device_is_tried_retry_count_plus_one_times() {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .failing_opens(usize::MAX)
        .event_log(event_log.clone())
        .build();
    let config = switchbot::DeviceConfig::builder()
        .address(ADDRESS)
        .retry_count(4)
        .build();
    let mut device = device(config, fake);

    assert!(!device.turn_on().await);
    assert_eq!(5, opens(&event_log));
    assert_eq!(0, closes(&event_log));
}

#[tokio::test(start_paused = true)]
async fn every_attempt_ends_with_a_disconnect() -> anyhow::Result<()> {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .status("004B1E")?
        .failing_writes(2)
        .failing_closes(1)
        .event_log(event_log.clone())
        .build();
    let mut device = device(default_config(), fake);

    let receipt = device.send(switchbot::Action::Press).await?;

    assert_eq!(3, receipt.attempts());
    assert_eq!(3, opens(&event_log));
    assert_eq!(3, closes(&event_log));
    assert!(!device.is_connected());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retries_are_separated_by_backoff() {
    let fake = switchbot::FakeArgs::builder()
        .failing_opens(usize::MAX)
        .build();
    let config = switchbot::DeviceConfig::builder()
        .address(ADDRESS)
        .retry_count(2)
        .build();
    let mut device = device(config, fake);

    let started = Instant::now();
    let result = device.send(switchbot::Action::Off).await;

    assert_matches!(
        result,
        Err(switchbot::SendError::ExhaustedRetries { attempts: 3, .. })
    );
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn status_is_queried_at_most_hourly() -> anyhow::Result<()> {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .status("004B1E")?
        .event_log(event_log.clone())
        .build();
    let mut device = device(default_config(), fake);

    assert!(device.press().await);
    assert!(device.press().await);
    assert_eq!(1, status_queries(&event_log));

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(device.press().await);
    assert_eq!(2, status_queries(&event_log));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_device_is_queried_again_on_next_send() {
    let event_log = switchbot::FakeEventLog::default();
    let fake = switchbot::FakeArgs::builder()
        .event_log(event_log.clone())
        .build();
    let mut device = device(default_config(), fake);

    let started = Instant::now();
    assert!(device.press().await);
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(device.press().await);

    assert_eq!(2, status_queries(&event_log));
    assert_eq!(None, device.battery_percent());
}

#[tokio::test(start_paused = true)]
async fn short_status_payload_is_ignored() -> anyhow::Result<()> {
    let fake = switchbot::FakeArgs::builder().status("004B")?.build();
    let mut device = device(default_config(), fake);

    assert!(device.press().await);
    assert_eq!(None, device.status());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_command_without_retries_reports_failure() -> anyhow::Result<()> {
    let fake = switchbot::FakeArgs::builder()
        .status("004B1E")?
        .unacknowledged_writes(2)
        .build();
    let config = switchbot::DeviceConfig::builder()
        .address(ADDRESS)
        .retry_count(0)
        .build();
    let mut device = device(config, fake);

    let result = device.send(switchbot::Action::On).await;

    assert_matches!(
        result,
        Err(switchbot::SendError::ExhaustedRetries {
            attempts: 1,
            last: switchbot::AttemptError::AckFailure,
        })
    );
    Ok(())
}
