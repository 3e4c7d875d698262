use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{ControlRequest, FakeArgs, LogLevel, OutputFormat};
use crate::hw::{
    BleTransport, fake_transport as build_fake_transport, real_transport as build_real_transport,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a transport backed by the platform BLE stack.
#[must_use]
pub fn real_transport() -> Box<dyn BleTransport> {
    build_real_transport()
}

/// Creates a transport backed by scripted fake behaviour.
#[must_use]
pub fn fake_transport(fake_args: FakeArgs) -> Box<dyn BleTransport> {
    build_fake_transport(fake_args.into_transport_config())
}

/// Sends one action using the real terminal for colour and logging decisions.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = switchbot::Args::try_parse_from([
///     "switchbot",
///     "--fake",
///     "--fake-status",
///     "004B1E",
///     "AA:BB:CC:DD:EE:FF",
///     "press",
/// ])?;
/// let (request, maybe_fake_args) = args.into_request_and_fake_args();
/// let transport = match maybe_fake_args {
///     Some(fake_args) => switchbot::fake_transport(fake_args),
///     None => switchbot::real_transport(),
/// };
/// let mut out = Vec::new();
/// switchbot::run(request, &mut out, transport, None, switchbot::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device never
/// acknowledges the action, or output writing fails.
pub async fn run<W>(
    request: ControlRequest,
    out: &mut W,
    transport: Box<dyn BleTransport>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients(
        request,
        out,
        &SystemTerminalClient,
        transport,
        log_level,
        output_format,
    )
    .await
}

/// Sends one action with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// struct FakeTerminal;
/// impl switchbot::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let fake = switchbot::FakeArgs::builder().status("004B1E")?.build();
/// let (request, _) = switchbot::Args::new("AA:BB:CC:DD:EE:FF", switchbot::Action::On)
///     .into_request_and_fake_args();
/// let mut out = Vec::new();
/// switchbot::run_with_clients(
///     request,
///     &mut out,
///     &FakeTerminal,
///     switchbot::fake_transport(fake),
///     Some(switchbot::LogLevel::Debug),
///     switchbot::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device never
/// acknowledges the action, or output writing fails.
#[instrument(
    skip(request, out, terminal_client, transport),
    level = "debug",
    fields(?log_level, ?output_format)
)]
pub async fn run_with_clients<W>(
    request: ControlRequest,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    transport: Box<dyn BleTransport>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "switchbot",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    crate::cli::control::run(
        transport,
        request,
        out,
        output_format,
        terminal_client.stdout_is_terminal(),
    )
    .await
}
