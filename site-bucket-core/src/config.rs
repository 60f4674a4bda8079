use std::path::PathBuf;
use tracing::{debug, info};

use crate::deletion::DeletionDecision;
use crate::retry::RetryPolicy;

/// Fully resolved settings for one reconciliation run.
///
/// Credentials never reach this struct; the caller hands the core an already
/// connected [`crate::contract::RemoteStore`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the generated site; paths below it become object keys.
    pub site_dir: PathBuf,
    pub include_hidden: bool,
    pub upload_concurrency: usize,
    /// Decision the deletion session starts in.
    pub delete_policy: DeletionDecision,
    pub retry: RetryPolicy,
}

fn default_upload_concurrency() -> usize {
    1
}

impl SyncConfig {
    pub fn new(site_dir: impl Into<PathBuf>) -> Self {
        Self {
            site_dir: site_dir.into(),
            include_hidden: false,
            upload_concurrency: default_upload_concurrency(),
            delete_policy: DeletionDecision::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            site_dir = %self.site_dir.display(),
            include_hidden = self.include_hidden,
            upload_concurrency = self.upload_concurrency,
            delete_policy = ?self.delete_policy,
            retry_delay_secs = self.retry.delay_secs,
            max_retries = ?self.retry.max_retries,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
