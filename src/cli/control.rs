use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt as _;

use crate::cli::command::{ControlRequest, OutputFormat};
use crate::cli::ui::Painter;
use crate::error::SendError;
use crate::handlers::{Action, CommandCodec, SendReceipt};
use crate::hw::{BleTransport, Device};
use crate::utils::format_optional;

/// JSON result emitted for one action.
#[derive(Debug, Serialize)]
struct ControlResult<'a> {
    action: Action,
    address: &'a str,
    acknowledged: bool,
    attempts: u32,
    frame: String,
    battery_percent: Option<u8>,
    firmware_version: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Sends one action and reports the outcome.
///
/// The report is written for failures too; the error is returned afterwards so
/// the caller can set the exit status.
pub(crate) async fn run<W>(
    transport: Box<dyn BleTransport>,
    request: ControlRequest,
    out: &mut W,
    output_format: OutputFormat,
    use_colour: bool,
) -> Result<()>
where
    W: io::Write,
{
    let (config, action) = request.into_parts();
    let mut device = Device::new(config, transport);

    let outcome = send_with_progress(&mut device, action).await;
    let (attempts, frame, error) = match &outcome {
        Ok(receipt) => (receipt.attempts(), receipt.frame().clone(), None),
        Err(error) => (
            error.attempts(),
            CommandCodec::encode(action, device.password_digest()),
            Some(error.to_string()),
        ),
    };
    let result = ControlResult {
        action,
        address: device.address(),
        acknowledged: outcome.is_ok(),
        attempts,
        frame: frame.as_hex().to_string(),
        battery_percent: device.battery_percent(),
        firmware_version: device.firmware_version(),
        error,
    };

    match output_format {
        OutputFormat::Pretty => write_pretty(out, &result, &Painter::new(use_colour))?,
        OutputFormat::Json => write_json_line(out, &result)?,
    }

    outcome?;
    Ok(())
}

#[instrument(
    skip(device),
    level = "info",
    fields(address = %device.address(), progress = true)
)]
async fn send_with_progress(
    device: &mut Device,
    action: Action,
) -> Result<SendReceipt, SendError> {
    let span = tracing::Span::current();
    span.pb_set_message(&format!("Sending {action} to SwitchBot"));

    let outcome = device.send(action).await;
    let finished = match &outcome {
        Ok(_receipt) => format!("{action} acknowledged"),
        Err(_error) => format!("{action} failed"),
    };
    span.pb_set_finish_message(&finished);
    outcome
}

fn write_pretty(
    out: &mut impl io::Write,
    result: &ControlResult<'_>,
    painter: &Painter,
) -> Result<()> {
    if result.acknowledged {
        writeln!(
            out,
            "{} {} acknowledged by {}",
            painter.success("✓"),
            painter.value(result.action.to_string()),
            result.address,
        )?;
    } else {
        writeln!(
            out,
            "{} {} failed for {}",
            painter.failure("✗"),
            painter.value(result.action.to_string()),
            result.address,
        )?;
    }

    writeln!(out, "{} {}", painter.muted("frame:"), result.frame)?;
    writeln!(out, "{} {}", painter.muted("attempts:"), result.attempts)?;
    writeln!(
        out,
        "{} {}",
        painter.muted("battery:"),
        format_optional(result.battery_percent.map(|percent| format!("{percent}%"))),
    )?;
    writeln!(
        out,
        "{} {}",
        painter.muted("firmware:"),
        format_optional(result.firmware_version.map(|version| format!("{version:.1}"))),
    )?;
    if let Some(error) = &result.error {
        writeln!(out, "{} {}", painter.muted("error:"), error)?;
    }
    Ok(())
}

fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
