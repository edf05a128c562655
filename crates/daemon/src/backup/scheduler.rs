use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use institute_core::backup::{BackupReason, MonthlySchedule};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::orchestrator::Orchestrator;

/// Longest single sleep; the next trigger is re-evaluated after each one so
/// wall-clock jumps and suspends are picked up.
const MAX_NAP: Duration = Duration::from_secs(15 * 60);

/// Startup due-check (optional) followed by one due-check per scheduled tick.
pub fn spawn_backup_scheduler(
    orchestrator: Arc<Orchestrator>,
    schedule: MonthlySchedule,
    run_on_startup: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if run_on_startup {
            orchestrator.run_if_due(BackupReason::Startup).await;
        }
        loop {
            let Some(next) = schedule.next_after(&Local::now()) else {
                warn!(?schedule, "backup schedule never fires; scheduler stopped");
                return;
            };
            info!(next = %next, "next scheduled backup");
            loop {
                let nap = nap_until(&Local::now(), &next);
                if nap.is_zero() {
                    break;
                }
                tokio::time::sleep(nap).await;
            }
            orchestrator.run_if_due(BackupReason::Scheduled).await;
        }
    })
}

fn nap_until<Tz: TimeZone>(now: &DateTime<Tz>, next: &DateTime<Tz>) -> Duration {
    next.clone()
        .signed_duration_since(now)
        .to_std()
        .unwrap_or_default()
        .min(MAX_NAP)
}
