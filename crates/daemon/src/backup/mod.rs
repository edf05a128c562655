//! Monthly backup pipeline: snapshot the collections, build a workbook, zip
//! it, mail the archive to the owner and record the month as done.

pub mod archive;
pub mod orchestrator;
pub mod scheduler;
pub mod source;
pub mod state_store;
pub mod workbook;

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub use orchestrator::{BackupOutcome, Clock, ContentionPolicy, Orchestrator, SystemClock};
pub use scheduler::spawn_backup_scheduler;
pub use source::{CollectionSource, Owner, OwnerDirectory};
pub use state_store::StateStore;

/// Runs `fut` under `limit`; expiry becomes an error naming `what`.
pub async fn with_deadline<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(anyhow!("{what} timed out after {}ms", limit.as_millis())),
    }
}
