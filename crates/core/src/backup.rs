//! Backup bookkeeping shared by the daemon and its tests: run reasons, the
//! persisted state record, artifact naming and the monthly schedule.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::util::iso_millis;

/// Fallback base name when the institute name is blank.
pub const DEFAULT_BASE_NAME: &str = "institute";

/// Why a backup run was attempted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupReason {
    /// Process start.
    Startup,
    /// Monthly tick.
    Scheduled,
    /// Operator request over the API.
    Manual,
}

impl BackupReason {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    /// Reason written to the state file; only `startup` and `scheduled`
    /// are ever persisted, so a manual run is recorded as `scheduled`.
    pub fn recorded(self) -> Self {
        match self {
            Self::Startup => Self::Startup,
            Self::Scheduled | Self::Manual => Self::Scheduled,
        }
    }
}

impl fmt::Display for BackupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last successful backup, persisted as one JSON object.
///
/// Fields are optional so that an empty or foreign file still decodes; an
/// empty state is never "done" for any month.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupState {
    /// ISO-8601 UTC instant of the last successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_at: Option<String>,
    /// `YYYY-MM` the last run covered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_month: Option<String>,
    /// Trigger of the last run, `startup` or `scheduled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BackupReason>,
}

impl BackupState {
    /// State recorded after a successful run.
    pub fn completed(at: DateTime<Utc>, month_key: String, reason: BackupReason) -> Self {
        Self {
            last_backup_at: Some(iso_millis(&at)),
            last_backup_month: Some(month_key),
            reason: Some(reason.recorded()),
        }
    }

    /// True when the recorded month equals `month_key`.
    pub fn is_done_for(&self, month_key: &str) -> bool {
        self.last_backup_month.as_deref() == Some(month_key)
    }
}

/// `YYYY-MM` of `at` in its own time zone.
pub fn month_key<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// `DD.MM.YYYY HH.MM` of `at` in its own time zone.
pub fn backup_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%d.%m.%Y %H.%M").to_string()
}

/// Makes an institute name safe to use as a file name prefix.
pub fn sanitize_file_name(value: &str) -> String {
    let trimmed = value.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_BASE_NAME
    } else {
        trimmed
    };
    base.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// File names of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// `{institute}_backup_{stamp}`.
    pub base: String,
    /// `{base}.xlsx`.
    pub workbook: String,
    /// `{base}.zip`.
    pub archive: String,
}

impl ArtifactNames {
    /// Names for `institute_name` at the given [`backup_stamp`].
    pub fn new(institute_name: &str, stamp: &str) -> Self {
        let base = format!("{}_backup_{stamp}", sanitize_file_name(institute_name));
        Self {
            workbook: format!("{base}.xlsx"),
            archive: format!("{base}.zip"),
            base,
        }
    }
}

/// Monthly trigger time, in local wall-clock terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySchedule {
    /// Day of month, 1-31.
    pub day: u32,
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute, 0-59.
    pub minute: u32,
}

impl Default for MonthlySchedule {
    fn default() -> Self {
        Self {
            day: 1,
            hour: 0,
            minute: 5,
        }
    }
}

impl MonthlySchedule {
    /// Months searched before giving up.
    const HORIZON_MONTHS: u32 = 48;

    /// First trigger strictly after `now`.
    ///
    /// Months where the day does not exist (day 31 in April) are skipped, as
    /// are local times that fall into a DST gap. Returns `None` only for an
    /// invalid schedule.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let (mut year, mut month) = (now.year(), now.month());
        for _ in 0..Self::HORIZON_MONTHS {
            if let Some(at) = tz
                .with_ymd_and_hms(year, month, self.day, self.hour, self.minute, 0)
                .earliest()
            {
                if at > *now {
                    return Some(at);
                }
            }
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        None
    }
}
