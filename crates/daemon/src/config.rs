use std::path::PathBuf;
use std::time::Duration;

use institute_core::backup::MonthlySchedule;

use crate::backup::ContentionPolicy;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: String,
    /// SurrealDB endpoint, e.g. `surrealkv://.institute/db` or `mem://`.
    pub db_url: String,

    pub backup: BackupConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Holds `backup_state.json`, the workbook (briefly) and every archive.
    pub dir: PathBuf,
    pub schedule: MonthlySchedule,
    /// Deadline applied to each external call of a run.
    pub step_timeout: Duration,
    pub contention: ContentionPolicy,
    pub run_on_startup: bool,
    /// Collections exported into the workbook, one sheet each.
    pub collections: Vec<String>,
}

impl BackupConfig {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            schedule: MonthlySchedule::default(),
            step_timeout: Duration::from_secs(120),
            contention: ContentionPolicy::default(),
            run_on_startup: true,
            collections: default_collections(),
        }
    }
}

pub fn default_collections() -> Vec<String> {
    vec!["student".to_string(), "fees".to_string()]
}

/// `<home>/Documents/student_backup`, or a relative fallback when the home
/// directory cannot be resolved.
pub fn default_backup_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("student_backup")
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Takes precedence over `expires_days` when positive.
    pub expires_minutes: i64,
    pub expires_days: i64,
}

impl AuthConfig {
    pub const DEFAULT_EXPIRES_DAYS: i64 = 14;

    pub fn token_ttl(&self) -> chrono::Duration {
        if self.expires_minutes > 0 {
            chrono::Duration::minutes(self.expires_minutes)
        } else if self.expires_days > 0 {
            chrono::Duration::days(self.expires_days)
        } else {
            chrono::Duration::days(Self::DEFAULT_EXPIRES_DAYS)
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("expires_minutes", &self.expires_minutes)
            .field("expires_days", &self.expires_days)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: Option<String>,
}

impl MailConfig {
    /// Sender address: `EMAIL_FROM`, falling back to the SMTP user.
    pub fn from_address(&self) -> Option<&str> {
        [self.from.as_deref(), self.user.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.pass.is_some() && self.from_address().is_some()
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_win_over_days() {
        let auth = AuthConfig {
            jwt_secret: "s".into(),
            expires_minutes: 30,
            expires_days: 14,
        };
        assert_eq!(auth.token_ttl(), chrono::Duration::minutes(30));
        let auth = AuthConfig {
            expires_minutes: 0,
            expires_days: 0,
            ..auth
        };
        assert_eq!(auth.token_ttl(), chrono::Duration::days(14));
    }

    #[test]
    fn from_falls_back_to_user() {
        let mail = MailConfig {
            user: Some("owner@example.com".into()),
            from: Some("  ".into()),
            ..MailConfig::default()
        };
        assert_eq!(mail.from_address(), Some("owner@example.com"));
        let mail = MailConfig {
            from: Some("backups@example.com".into()),
            ..mail
        };
        assert_eq!(mail.from_address(), Some("backups@example.com"));
    }
}
