use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use institute_core::snapshot::{CollectionSnapshot, Document};
use tracing::debug;

use super::with_deadline;

/// Recipient of the backup mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub email: String,
    pub institute_name: String,
}

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn find_owner(&self) -> Result<Option<Owner>>;
}

/// Reads every non-deleted document of a collection.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    async fn list_active(&self, collection: &str) -> Result<Vec<Document>>;
}

/// Snapshots `collections` in order. Reads are independent, not transactional.
pub async fn snapshot_collections(
    source: &dyn CollectionSource,
    collections: &[String],
    deadline: Duration,
) -> Result<Vec<CollectionSnapshot>> {
    let mut out = Vec::with_capacity(collections.len());
    for name in collections {
        let docs = with_deadline(&format!("reading {name}"), deadline, source.list_active(name))
            .await
            .with_context(|| format!("snapshot of {name}"))?;
        debug!(collection = %name, rows = docs.len(), "collection read");
        out.push(CollectionSnapshot::from_documents(name.as_str(), &docs));
    }
    Ok(out)
}
