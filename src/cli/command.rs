use std::time::Duration;

use bon::Builder;
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::error::FixtureError;
use crate::handlers::Action;
use crate::hw::{DEFAULT_RETRY_COUNT, DeviceConfig, FakeEventLog, FakeTransportConfig, HexPayload};

/// Command-line options for the SwitchBot BLE tool.
#[derive(Debug, Parser)]
#[command(name = "switchbot", about = "Drive a SwitchBot button pusher over BLE.")]
pub struct Args {
    /// Hardware address of the SwitchBot (e.g. `AA:BB:CC:DD:EE:FF`).
    address: String,
    /// Action to send.
    #[arg(value_enum)]
    action: Action,
    /// Retries after the first failed attempt.
    #[arg(long, default_value_t = DEFAULT_RETRY_COUNT)]
    retry_count: u32,
    /// Password configured on the device, if any.
    #[arg(long)]
    password: Option<String>,
    /// Overrides `RUST_LOG` with a single level.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long = "output", value_enum)]
    output_format: Option<OutputFormat>,
    /// Uses the fake BLE backend instead of the platform stack.
    #[arg(long)]
    fake: bool,
    /// Fake status notification payload as hexadecimal bytes.
    #[arg(long, requires = "fake")]
    fake_status: Option<HexPayload>,
    /// Number of fake connection attempts that fail.
    #[arg(long, requires = "fake")]
    fake_failing_opens: Option<usize>,
    /// Number of fake writes that fail at the transport level.
    #[arg(long, requires = "fake")]
    fake_failing_writes: Option<usize>,
    /// Number of fake writes the device does not acknowledge.
    #[arg(long, requires = "fake")]
    fake_unacknowledged_writes: Option<usize>,
    /// Number of fake disconnects that fail.
    #[arg(long, requires = "fake")]
    fake_failing_closes: Option<usize>,
    /// Artificial fake connection delay (e.g. `250ms`, `2s`).
    #[arg(long, requires = "fake", value_parser = parse_duration)]
    fake_open_delay: Option<Duration>,
    #[arg(skip)]
    fake_event_log: FakeEventLog,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use switchbot::{Action, Args};
    ///
    /// let args = Args::new("AA:BB:CC:DD:EE:FF", Action::Press);
    /// assert_eq!(None, args.log_level());
    /// ```
    #[must_use]
    pub fn new(address: impl Into<String>, action: Action) -> Self {
        Self {
            address: address.into(),
            action,
            retry_count: DEFAULT_RETRY_COUNT,
            password: None,
            log_level: None,
            output_format: None,
            fake: false,
            fake_status: None,
            fake_failing_opens: None,
            fake_failing_writes: None,
            fake_unacknowledged_writes: None,
            fake_failing_closes: None,
            fake_open_delay: None,
            fake_event_log: FakeEventLog::default(),
        }
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the device password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            status,
            failing_opens,
            failing_writes,
            unacknowledged_writes,
            failing_closes,
            open_delay,
            event_log,
        } = fake;

        self.fake = true;
        self.fake_status = status;
        self.fake_failing_opens = Some(failing_opens);
        self.fake_failing_writes = Some(failing_writes);
        self.fake_unacknowledged_writes = Some(unacknowledged_writes);
        self.fake_failing_closes = Some(failing_closes);
        self.fake_open_delay = Some(open_delay);
        self.fake_event_log = event_log;
        self
    }

    /// Returns the explicit log level, if one was given.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicit output format, if one was given.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed CLI arguments into the control request and optional fake settings.
    #[must_use]
    pub fn into_request_and_fake_args(self) -> (ControlRequest, Option<FakeArgs>) {
        let Args {
            address,
            action,
            retry_count,
            password,
            log_level: _,
            output_format: _,
            fake,
            fake_status,
            fake_failing_opens,
            fake_failing_writes,
            fake_unacknowledged_writes,
            fake_failing_closes,
            fake_open_delay,
            fake_event_log,
        } = self;

        let config = DeviceConfig::builder()
            .address(address)
            .retry_count(retry_count)
            .maybe_password(password)
            .build();
        let fake_args = fake.then(|| FakeArgs {
            status: fake_status,
            failing_opens: fake_failing_opens.unwrap_or_default(),
            failing_writes: fake_failing_writes.unwrap_or_default(),
            unacknowledged_writes: fake_unacknowledged_writes.unwrap_or_default(),
            failing_closes: fake_failing_closes.unwrap_or_default(),
            open_delay: fake_open_delay.unwrap_or(Duration::ZERO),
            event_log: fake_event_log,
        });

        (ControlRequest { config, action }, fake_args)
    }
}

/// One action to send to one device.
#[derive(Debug, Clone)]
pub struct ControlRequest {
    config: DeviceConfig,
    action: Action,
}

impl ControlRequest {
    /// Creates a request from explicit device settings.
    #[must_use]
    pub fn new(config: DeviceConfig, action: Action) -> Self {
        Self { config, action }
    }

    pub(crate) fn into_parts(self) -> (DeviceConfig, Action) {
        (self.config, self.action)
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    status: Option<HexPayload>,
    #[builder(default)]
    failing_opens: usize,
    #[builder(default)]
    failing_writes: usize,
    #[builder(default)]
    unacknowledged_writes: usize,
    #[builder(default)]
    failing_closes: usize,
    #[builder(default)]
    open_delay: Duration,
    /// Shared log the fake transport records every interaction into.
    #[builder(default)]
    event_log: FakeEventLog,
}

impl FakeArgs {
    pub(crate) fn into_transport_config(self) -> FakeTransportConfig {
        let Self {
            status,
            failing_opens,
            failing_writes,
            unacknowledged_writes,
            failing_closes,
            open_delay,
            event_log,
        } = self;

        FakeTransportConfig::builder()
            .maybe_status_notification(status)
            .failing_opens(failing_opens)
            .failing_writes(failing_writes)
            .unacknowledged_writes(unacknowledged_writes)
            .failing_closes(failing_closes)
            .open_delay(open_delay)
            .event_log(event_log)
            .build()
    }
}

/// Log level accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output format accepted by `--output`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per run.
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
