//! Timers — the daily reminder sweep and the optional nightly shutdown.
//!
//! Both are computed in the configured timezone and sleep straight to the
//! next instant rather than polling.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::onboarding::ReminderSweep;

pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr)
        .map_err(|e| ConfigError::invalid("ONBOARD_REMINDER_CRON", format!("invalid cron: {e}")))
}

/// Next time `schedule` fires after `after`, reading the schedule as local
/// time in `tz`.
pub fn next_fire(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|fire| fire.with_timezone(&Utc))
}

/// Next occurrence of wall-clock `at` in `tz` strictly after `now`. Days on
/// which `at` falls in a DST gap are skipped.
pub fn next_wall_clock(at: NaiveTime, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    (0..3u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(at)).earliest())
        .map(|local| local.with_timezone(&Utc))
        .find(|instant| *instant > now)
}

/// Run the reminder sweep every time `schedule` fires.
pub fn spawn_reminder_task(
    sweep: Arc<ReminderSweep>,
    schedule: Schedule,
    tz: Tz,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = next_fire(&schedule, tz, now) else {
                tracing::warn!("Reminder schedule has no upcoming fire time");
                return;
            };
            tracing::info!(at = %next.with_timezone(&tz), "Next onboarding reminder scheduled");
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let summary = sweep.run().await;
            tracing::debug!(?summary, "Scheduled sweep done");
        }
    })
}

/// Resolves at the next `at` in `tz`; never resolves when `at` is `None`.
pub async fn shutdown_at(at: Option<NaiveTime>, tz: Tz) {
    let now = Utc::now();
    let Some(when) = at.and_then(|at| next_wall_clock(at, tz, now)) else {
        return std::future::pending().await;
    };
    tracing::info!(at = %when.with_timezone(&tz), "Scheduled shutdown");
    tokio::time::sleep((when - now).to_std().unwrap_or_default()).await;
}
