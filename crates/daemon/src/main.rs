#![forbid(unsafe_code)]

//! Institute daemon: serves the `/api` router and runs the monthly backup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use institute_core::backup::MonthlySchedule;
use institute_daemon::api::{self, AppState};
use institute_daemon::backup::{spawn_backup_scheduler, ContentionPolicy, Orchestrator};
use institute_daemon::config::{
    default_backup_dir, default_collections, AuthConfig, BackupConfig, DaemonConfig, MailConfig,
};
use institute_daemon::db::Db;
use institute_daemon::mailer::{Mailer, SmtpMailer};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "institute-daemon", version, about = "Institute management backend")]
struct Cli {
    /// Where the HTTP API will listen.
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:3000")]
    listen: String,

    /// SurrealDB endpoint (`surrealkv://<dir>` on disk, `mem://` for a scratch run).
    #[arg(long, env = "DB_URL", default_value = "surrealkv://.institute/db")]
    db_url: String,

    /// Directory for the backup state file and archives.
    /// Defaults to `<home>/Documents/student_backup`.
    #[arg(long, env = "BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Day of month the scheduled backup fires; months without that day are skipped.
    #[arg(long, default_value_t = 1)]
    backup_day: u32,

    #[arg(long, default_value_t = 0)]
    backup_hour: u32,

    #[arg(long, default_value_t = 5)]
    backup_minute: u32,

    /// Deadline for each external step of a backup run.
    #[arg(long, default_value_t = 120)]
    backup_step_timeout_seconds: u64,

    /// What a trigger does while another backup is running.
    #[arg(long, value_enum, default_value_t = ContentionPolicy::Drop)]
    backup_contention: ContentionPolicy,

    /// Skip the due-check at startup.
    #[arg(long, default_value_t = false)]
    no_startup_backup: bool,

    /// Collections exported into the backup workbook.
    #[arg(long, value_delimiter = ',', default_values_t = default_collections())]
    backup_collections: Vec<String>,

    #[arg(long, env = "JWT_SECRET", default_value = "change_me", hide_env_values = true)]
    jwt_secret: String,

    /// Session lifetime in minutes; overrides `--jwt-expires-days` when positive.
    #[arg(long, env = "JWT_EXPIRES_MINUTES", default_value_t = 0)]
    jwt_expires_minutes: i64,

    #[arg(long, env = "JWT_EXPIRES_DAYS", default_value_t = AuthConfig::DEFAULT_EXPIRES_DAYS)]
    jwt_expires_days: i64,

    #[arg(long, env = "EMAIL_USER")]
    email_user: Option<String>,

    #[arg(long, env = "EMAIL_PASS", hide_env_values = true)]
    email_pass: Option<String>,

    /// Sender address; defaults to the SMTP user.
    #[arg(long, env = "EMAIL_FROM")]
    email_from: Option<String>,

    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    smtp_host: String,

    #[arg(long, env = "SMTP_PORT", default_value_t = 465)]
    smtp_port: u16,
}

impl Cli {
    fn into_config(self) -> DaemonConfig {
        let mut backup = BackupConfig::new(self.backup_dir.unwrap_or_else(default_backup_dir));
        backup.schedule = MonthlySchedule {
            day: self.backup_day,
            hour: self.backup_hour,
            minute: self.backup_minute,
        };
        backup.step_timeout = Duration::from_secs(self.backup_step_timeout_seconds);
        backup.contention = self.backup_contention;
        backup.run_on_startup = !self.no_startup_backup;
        backup.collections = self.backup_collections;

        DaemonConfig {
            listen: self.listen,
            db_url: self.db_url,
            backup,
            auth: AuthConfig {
                jwt_secret: self.jwt_secret,
                expires_minutes: self.jwt_expires_minutes,
                expires_days: self.jwt_expires_days,
            },
            mail: MailConfig {
                smtp_host: self.smtp_host,
                smtp_port: self.smtp_port,
                user: self.email_user,
                pass: self.email_pass,
                from: self.email_from,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Cli::parse().into_config();
    info!("starting daemon with config: {:?}", config);

    if config.auth.jwt_secret == "change_me" {
        warn!("JWT_SECRET is not set; sessions are signed with the default secret");
    }

    let db = Db::connect(&config.db_url).await?;
    db.bootstrap_schema().await?;

    let smtp = SmtpMailer::new(&config.mail)?;
    if !smtp.is_configured() {
        warn!("email is not configured; verification codes and backups cannot be sent");
    }
    let mailer: Arc<dyn Mailer> = Arc::new(smtp);

    let store = Arc::new(db.clone());
    let backup = Arc::new(
        Orchestrator::new(&config.backup, store.clone(), store, mailer.clone())
            .with_copy_to(config.mail.from_address().map(str::to_string)),
    );
    spawn_backup_scheduler(
        backup.clone(),
        config.backup.schedule,
        config.backup.run_on_startup,
    );

    let addr: SocketAddr = config.listen.parse()?;
    let state = AppState::new(db, config, mailer, backup);
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!("listening on http://{}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
