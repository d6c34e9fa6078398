//! Re-arm policy for the per-rig scheduling timer.

use crate::config::SchedulerSettings;
use crate::types::RigActivity;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Interval until the next fire. Never "disarm": a quiet rig still gets the
/// idle interval.
#[must_use]
pub fn next_interval(settings: &SchedulerSettings, activity: RigActivity) -> Duration {
    if activity.is_active() {
        settings.active_interval()
    } else {
        settings.idle_interval()
    }
}

/// Absolute fire time `delay` after `now`.
#[must_use]
pub fn fire_time(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether arming "soon" at `candidate` should replace `current`. Only moves
/// the alarm earlier.
#[must_use]
pub fn should_rearm(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> bool {
    current.map_or(true, |at| candidate < at)
}

/// Resolves when `alarm` is due; never resolves while disarmed.
pub(super) async fn alarm_due(alarm: Option<DateTime<Utc>>) {
    match alarm {
        Some(at) => {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
        }
        None => std::future::pending::<()>().await,
    }
}
