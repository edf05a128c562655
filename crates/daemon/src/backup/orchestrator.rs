use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use institute_core::backup::{backup_stamp, month_key, ArtifactNames, BackupReason, BackupState};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::archive::{self, ArchiveEntry};
use super::source::{snapshot_collections, CollectionSource, Owner, OwnerDirectory};
use super::state_store::StateStore;
use super::with_deadline;
use super::workbook::WorkbookPlan;
use crate::config::BackupConfig;
use crate::mailer::{backup_mail, Mailer};

/// Local wall-clock time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// What a due-check does when a run is already in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ContentionPolicy {
    /// Return immediately.
    #[default]
    Drop,
    /// Wait for the active run, then check again whether the month is due.
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// The current month is already recorded.
    AlreadyDone,
    /// Another run held the guard.
    Busy,
    /// No system user exists yet; nothing was recorded.
    NoOwner,
    Completed { archive: PathBuf },
    /// The run aborted; state is untouched so the next trigger retries.
    Failed { error: String },
}

/// Runs the monthly backup at most once per month, one run at a time.
pub struct Orchestrator {
    owners: Arc<dyn OwnerDirectory>,
    source: Arc<dyn CollectionSource>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    store: StateStore,
    collections: Vec<String>,
    copy_to: Option<String>,
    step_timeout: Duration,
    policy: ContentionPolicy,
    guard: Mutex<()>,
    queued: AtomicUsize,
    active: AtomicUsize,
}

/// Holds one unit of a counter for as long as it lives.
struct Counted<'a>(&'a AtomicUsize);

impl<'a> Counted<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Counted<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(
        config: &BackupConfig,
        owners: Arc<dyn OwnerDirectory>,
        source: Arc<dyn CollectionSource>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            owners,
            source,
            mailer,
            clock: Arc::new(SystemClock),
            store: StateStore::new(config.dir.clone()),
            collections: config.collections.clone(),
            copy_to: None,
            step_timeout: config.step_timeout,
            policy: config.contention,
            guard: Mutex::new(()),
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Extra recipient for every backup mail, skipped when it is the owner's
    /// own address.
    pub fn with_copy_to(mut self, address: Option<String>) -> Self {
        self.copy_to = address.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    /// True while a run holds the guard.
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Triggers waiting for the active run under [`ContentionPolicy::Queue`].
    pub fn queued_triggers(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Runs a backup unless the current month is already recorded. Never
    /// fails; the outcome says what happened.
    pub async fn run_if_due(&self, reason: BackupReason) -> BackupOutcome {
        if self.is_done().await {
            debug!(%reason, "backup already done this month");
            return BackupOutcome::AlreadyDone;
        }

        let _guard = match self.policy {
            ContentionPolicy::Drop => match self.guard.try_lock() {
                Ok(g) => g,
                Err(_) => {
                    debug!(%reason, "backup already running; dropping trigger");
                    return BackupOutcome::Busy;
                }
            },
            ContentionPolicy::Queue => {
                let _parked = Counted::new(&self.queued);
                self.guard.lock().await
            }
        };
        let _active = Counted::new(&self.active);

        // A run that finished while we waited may have recorded the month.
        if self.is_done().await {
            return BackupOutcome::AlreadyDone;
        }

        let now = self.clock.now();
        info!(%reason, month = %month_key(&now), "backup starting");
        match self.run(reason, now).await {
            Ok(None) => {
                warn!("backup skipped: no system user found");
                BackupOutcome::NoOwner
            }
            Ok(Some(archive)) => {
                info!(%reason, archive = %archive.display(), "backup completed");
                BackupOutcome::Completed { archive }
            }
            Err(e) => {
                error!(%reason, err = ?e, "backup failed");
                BackupOutcome::Failed {
                    error: format!("{e:#}"),
                }
            }
        }
    }

    async fn is_done(&self) -> bool {
        let month = month_key(&self.clock.now());
        self.store.read().await.is_done_for(&month)
    }

    async fn run(&self, reason: BackupReason, now: DateTime<FixedOffset>) -> Result<Option<PathBuf>> {
        let limit = self.step_timeout;
        let Some(owner) = with_deadline("owner lookup", limit, self.owners.find_owner()).await? else {
            return Ok(None);
        };

        let dir = self.store.dir().to_path_buf();
        with_deadline("creating backup directory", limit, async {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))
        })
        .await?;

        let stamp = backup_stamp(&now);
        let names = ArtifactNames::new(&owner.institute_name, &stamp);
        let workbook_path = dir.join(&names.workbook);

        let shipped = self
            .export_and_send(&owner, &stamp, &names, &workbook_path, &dir)
            .await;
        if let Err(e) = tokio::fs::remove_file(&workbook_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %workbook_path.display(), err = %e, "could not remove workbook");
            }
        }
        let archive = shipped?;

        let state = BackupState::completed(now.with_timezone(&Utc), month_key(&now), reason);
        with_deadline("writing backup state", limit, self.store.write(&state)).await?;
        Ok(Some(archive))
    }

    async fn export_and_send(
        &self,
        owner: &Owner,
        stamp: &str,
        names: &ArtifactNames,
        workbook_path: &Path,
        dir: &Path,
    ) -> Result<PathBuf> {
        let limit = self.step_timeout;

        let snapshots = snapshot_collections(self.source.as_ref(), &self.collections, limit).await?;
        let plan = WorkbookPlan::from_snapshots(&snapshots);
        let bytes = tokio::task::spawn_blocking(move || plan.to_xlsx())
            .await
            .context("workbook task panicked")??;

        with_deadline("writing workbook", limit, async {
            tokio::fs::write(workbook_path, bytes)
                .await
                .with_context(|| format!("writing {}", workbook_path.display()))
        })
        .await?;

        let entries = vec![ArchiveEntry {
            source: workbook_path.to_path_buf(),
            name: names.workbook.clone(),
        }];
        let archive = with_deadline(
            "packaging archive",
            limit,
            archive::package(entries, dir.join(&names.archive)),
        )
        .await?;

        for to in self.recipients(owner) {
            let mail = backup_mail(&to, owner, stamp, &names.archive, &archive, &self.collections);
            with_deadline("sending backup mail", limit, self.mailer.send(mail))
                .await
                .with_context(|| format!("mailing backup to {to}"))?;
        }
        Ok(archive)
    }

    fn recipients(&self, owner: &Owner) -> Vec<String> {
        let mut out = vec![owner.email.clone()];
        if let Some(copy) = &self.copy_to {
            if !copy.trim().eq_ignore_ascii_case(owner.email.trim()) {
                out.push(copy.trim().to_string());
            }
        }
        out
    }
}
