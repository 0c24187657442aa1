//! Local recurring trigger for `watch`.
//!
//! Fires the run-once entry point on a cron schedule until interrupted or
//! until a run fails in a way that needs an operator.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{error, info, warn};

use crate::error::{ConfigError, Result};
use crate::pipeline::RunReport;

/// Every ten minutes.
pub const DEFAULT_SCHEDULE: &str = "*/10 * * * *";

/// Parse a cron expression. Standard 5-field expressions get a leading
/// seconds field of `0`; 6- and 7-field expressions are taken as is.
pub fn parse_schedule(expr: &str) -> std::result::Result<Schedule, ConfigError> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidValue {
        key: "schedule".into(),
        message: format!("invalid cron expression '{expr}': {e}"),
    })
}

/// Next fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Run `tick` at every fire time of `schedule`.
///
/// Returns `Ok(())` when `shutdown` resolves or the schedule has no further
/// fire times. A failed run is logged and the loop keeps going, unless the
/// error needs an operator, in which case it is returned.
pub async fn watch<F, Fut, S>(schedule: &Schedule, shutdown: S, mut tick: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        let Some(next) = next_fire(schedule, now) else {
            warn!("Schedule has no upcoming fire times, stopping");
            return Ok(());
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), "Waiting for next run");

        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping watch");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        match tick().await {
            Ok(report) => info!(%report, "Scheduled run finished"),
            Err(e) if e.needs_operator() => {
                error!(error = %e, "Scheduled run failed, stopping watch");
                return Err(e);
            }
            Err(e) => error!(error = %e, "Scheduled run failed, will retry at next tick"),
        }
    }
}
