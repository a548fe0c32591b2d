//! Background renew-and-refresh timer.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::{RefreshOutcome, SessionInner};
use crate::error::SessionError;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the recurring refresh task.
///
/// The first tick fires one full period after spawning. The task holds only
/// a weak reference, so it never keeps a dropped session alive, and it exits
/// once the session is logged out or closed.
pub(super) fn spawn_refresh_task(session: Weak<SessionInner>, period: Duration) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            let Some(session) = session.upgrade() else {
                break;
            };

            match session.renew_and_refresh().await {
                Ok(RefreshOutcome::Refreshed) => {
                    debug!(host = %session.host_id, "Scheduled refresh completed");
                }
                Ok(RefreshOutcome::AlreadyInFlight) => {
                    debug!(host = %session.host_id, "Renewal in flight, skipping tick");
                }
                Ok(RefreshOutcome::LoggedOut(_)) | Err(SessionError::Closed) => break,
                Err(e) => {
                    error!(host = %session.host_id, error = %e, "Scheduled refresh failed");
                }
            }
        }

        debug!("Refresh task stopped");
    })
}
