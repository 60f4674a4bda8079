//! High-level pipeline: orchestrates inventory → diff → upload → delete for one site.
//!
//! This module provides the top-level reconciliation run that mirrors the local site
//! directory into the remote bucket. It:
//!   - Builds the local and remote inventories (either failing aborts the run)
//!   - Diffs them into create/update/delete sets
//!   - Uploads new files, then changed files, through the retrying transport
//!   - Puts every remote-only file to the deletion session and removes the confirmed ones
//!   - Returns a report with one outcome per attempted file
//!
//! # Error Handling
//! Only inventory construction is fatal. Per-file upload and delete failures are reported
//! to the status sink and collected in the [`SyncReport`]; the remaining files are still
//! attempted.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Setup helper: [`ensure_bucket`]
//! - Supporting types: [`SyncReport`], [`FileOutcome`], [`SyncError`]

use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{DecisionSource, RemoteStore, StatusSink, StoreError};
use crate::deletion::DeletionSession;
use crate::diff::diff;
use crate::inventory::{local_inventory, remote_inventory, InventoryError, LocalScanOptions};
use crate::retry::RetryingTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "Upload New"),
            Operation::Update => write!(f, "Upload Changed"),
            Operation::Delete => write!(f, "Delete"),
        }
    }
}

/// Outcome of one attempted file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub key: String,
    pub operation: Operation,
    /// `Err` carries a human-readable reason.
    pub result: Result<(), String>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    fn status_line(&self) -> String {
        match &self.result {
            Ok(()) => format!("{} {}: Success!", self.operation, self.key),
            Err(reason) => format!("{} {}: FAILURE! ({reason})", self.operation, self.key),
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub uploads: Vec<FileOutcome>,
    pub deletions: Vec<FileOutcome>,
    /// Delete-candidates the deletion session chose to keep.
    pub kept: Vec<String>,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.uploads
            .iter()
            .chain(self.deletions.iter())
            .filter(|o| !o.succeeded())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    fn succeeded_count(outcomes: &[FileOutcome]) -> usize {
        outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Done! {} uploaded, {} deleted, {} unchanged, {} failed.",
            Self::succeeded_count(&self.uploads),
            Self::succeeded_count(&self.deletions),
            self.unchanged,
            self.failure_count()
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("could not build inventory: {0}")]
    Inventory(#[from] InventoryError),

    #[error("invalid sync configuration: {0}")]
    Config(String),

    #[error("local scan task failed: {0}")]
    ScanTask(#[source] tokio::task::JoinError),
}

async fn upload_one<S>(
    store: &S,
    transport: &RetryingTransport<'_>,
    site_dir: &Path,
    key: String,
    operation: Operation,
) -> FileOutcome
where
    S: RemoteStore + ?Sized,
{
    let path = site_dir.join(&key);
    debug!(key = %key, ?operation, "[SYNC][UPLOAD] Reading file");
    let result = match tokio::fs::read(&path).await {
        Ok(body) => transport
            .execute(&format!("upload {key}"), || store.store_object(&key, body.clone()))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => {
            error!(key = %key, path = %path.display(), error = ?e, "[SYNC][UPLOAD] Failed to read local file");
            Err(format!("could not read {}: {e}", path.display()))
        }
    };
    match &result {
        Ok(()) => info!(key = %key, ?operation, "[SYNC][UPLOAD] Stored object"),
        Err(reason) => error!(key = %key, ?operation, reason = %reason, "[SYNC][ERROR][UPLOAD] Upload failed"),
    }
    FileOutcome {
        key,
        operation,
        result,
    }
}

/// Mirror `config.site_dir` into the bucket behind `store`.
pub async fn synchronise<S, D, O>(
    config: &SyncConfig,
    store: &S,
    decisions: &D,
    sink: &O,
) -> Result<SyncReport, SyncError>
where
    S: RemoteStore + ?Sized,
    D: DecisionSource + ?Sized,
    O: StatusSink,
{
    if config.upload_concurrency == 0 {
        return Err(SyncError::Config(
            "upload_concurrency must be at least 1".to_string(),
        ));
    }

    let bucket = store.bucket();
    info!(bucket = %bucket, site_dir = %config.site_dir.display(), "[SYNC] Starting reconciliation");
    sink.line(&format!(
        "Deploying {}/* to {}",
        config.site_dir.display(),
        bucket
    ));

    let transport = RetryingTransport::new(config.retry.clone(), sink);

    // --- Step 1: Inventories ---
    // Walking and hashing is blocking file I/O; keep it off the async workers.
    let site_dir = config.site_dir.clone();
    let options = LocalScanOptions {
        include_hidden: config.include_hidden,
    };
    let local = tokio::task::spawn_blocking(move || local_inventory(&site_dir, options))
        .await
        .map_err(|e| {
            error!(error = %e, "[SYNC] Local scan task did not complete");
            SyncError::ScanTask(e)
        })??;
    let remote = remote_inventory(store, &transport).await?;

    // --- Step 2: Diff ---
    let plan = diff(&local, &remote);
    info!(
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        "[SYNC] Computed diff"
    );

    let mut report = SyncReport {
        unchanged: plan.unchanged.len(),
        ..SyncReport::default()
    };

    // --- Step 3: Uploads, creates before updates ---
    let work = plan
        .to_create
        .iter()
        .map(|key| (key.clone(), Operation::Create))
        .chain(
            plan.to_update
                .iter()
                .map(|key| (key.clone(), Operation::Update)),
        );
    let mut uploads = stream::iter(work)
        .map(|(key, operation)| upload_one(store, &transport, &config.site_dir, key, operation))
        .buffered(config.upload_concurrency);
    while let Some(outcome) = uploads.next().await {
        sink.line(&outcome.status_line());
        report.uploads.push(outcome);
    }
    drop(uploads);

    // --- Step 4: Deletions ---
    let mut session = DeletionSession::new(config.delete_policy);
    for key in &plan.to_delete {
        if !session.should_delete(key, decisions).await {
            debug!(key = %key, "[SYNC][DELETE] Keeping remote file");
            report.kept.push(key.clone());
            continue;
        }
        let result = transport
            .execute(&format!("delete {key}"), || store.delete_object(key))
            .await
            .map_err(|e: StoreError| e.to_string());
        match &result {
            Ok(()) => info!(key = %key, "[SYNC][DELETE] Deleted object"),
            Err(reason) => error!(key = %key, reason = %reason, "[SYNC][ERROR][DELETE] Delete failed"),
        }
        let outcome = FileOutcome {
            key: key.clone(),
            operation: Operation::Delete,
            result,
        };
        sink.line(&outcome.status_line());
        report.deletions.push(outcome);
    }

    // --- Step 5: Summary ---
    let summary = report.summary();
    if report.failure_count() > 0 {
        warn!(failures = report.failure_count(), "[SYNC] Completed with failures");
    } else {
        info!("[SYNC] Completed without failures");
    }
    sink.line(&summary);

    Ok(report)
}

/// Make sure the target bucket exists, creating it when missing. Public async API.
pub async fn ensure_bucket<S, O>(store: &S, sink: &O) -> Result<(), StoreError>
where
    S: RemoteStore + ?Sized,
    O: StatusSink + ?Sized,
{
    let bucket = store.bucket();
    if store.bucket_exists().await? {
        debug!(bucket = %bucket, "[SETUP] Bucket exists");
        return Ok(());
    }
    sink.line(&format!("Creating bucket {bucket}"));
    info!(bucket = %bucket, "[SETUP] Creating bucket");
    store.create_bucket().await
}
