use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument};

use super::CommandCodec;
use crate::error::AttemptError;
use crate::hw::{Device, WriteMode};
use crate::protocol::EndpointId;

/// Minimum spacing between successful status refreshes.
pub(crate) const STATUS_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
/// Upper bound on the wait for the status notification.
pub(crate) const NOTIFICATION_WAIT: Duration = Duration::from_secs(3);
/// Fixed delay after every refresh before the command write.
pub(crate) const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Result of one refresh call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum RefreshOutcome {
    /// The last refresh is recent enough; the transport was not touched.
    Skipped,
    /// A status notification arrived and was decoded.
    Received,
    /// No usable notification arrived within the wait bound.
    NoResponse,
}

/// Opportunistic, throttled battery/firmware refresh.
pub(crate) struct StatusRefresher;

impl StatusRefresher {
    /// Returns whether a refresh is due at `now`.
    pub(crate) fn is_due(last_refresh: Option<Instant>, now: Instant) -> bool {
        last_refresh
            .is_none_or(|last| now.saturating_duration_since(last) >= STATUS_REFRESH_INTERVAL)
    }

    /// Queries the connected device for its status if the throttle allows it.
    ///
    /// Only a decoded notification advances the refresh timestamp, so a missed
    /// notification is retried on the next call.
    #[instrument(skip(device), level = "debug", fields(address = %device.address()))]
    pub(crate) async fn refresh(device: &mut Device) -> Result<RefreshOutcome, AttemptError> {
        if !Self::is_due(device.status_cache().last_refresh(), Instant::now()) {
            debug!("status refreshed recently; skipping");
            return Ok(RefreshOutcome::Skipped);
        }

        let query = CommandCodec::status_query(device.password_digest()).to_bytes()?;
        let (session, status) = device.session_and_status()?;

        session
            .enable_notifications(EndpointId::StatusCharacteristic)
            .await?;
        let acknowledged = session
            .write(EndpointId::CommandCharacteristic, &query, WriteMode::WithResponse)
            .await?;
        if !acknowledged {
            error!("status query was not acknowledged by the device");
        }

        let updates_before = status.updates();
        let arrived = session
            .wait_for_notification(NOTIFICATION_WAIT, &mut *status)
            .await?;
        let outcome = if arrived && status.updates() > updates_before {
            status.mark_refreshed(Instant::now());
            info!("SwitchBot status refreshed");
            RefreshOutcome::Received
        } else {
            debug!("no status notification received");
            RefreshOutcome::NoResponse
        };

        sleep(SETTLE_DELAY).await;
        Ok(outcome)
    }
}
