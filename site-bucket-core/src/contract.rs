//! # contract: interfaces between the reconciliation engine and the outside world
//!
//! This module defines the three seams the core talks through:
//! - [`RemoteStore`]: the object store holding the published site (S3 or a test double)
//! - [`DecisionSource`]: whoever answers "delete this remote file?" prompts
//! - [`StatusSink`]: where per-file outcome lines go
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall` so consumers can generate deterministic mocks
//!   for unit/integration tests. Mocks are exported behind the `test-export-mocks` feature.
//!
//! ## Error classes
//! [`StoreError`] separates the transient timeout class from everything else; only the
//! former is retried by [`crate::retry::RetryingTransport`].

use async_trait::async_trait;
use mockall::automock;

/// A single object as reported by the store's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    /// Raw ETag as returned by the store, quotes included. `None` if the store omitted it.
    pub etag: Option<String>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_continuation: Option<String>,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("store rejected request: {0}")]
    Service(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

/// Operations the reconciliation engine needs from the remote bucket.
///
/// The implementor is bound to a single bucket for its whole lifetime and is
/// responsible for applying the public-read ACL on every stored object.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Name of the bucket this store writes to.
    fn bucket(&self) -> String;

    /// Fetch one page of the listing, starting after `continuation` if given.
    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage, StoreError>;

    /// Store `body` under `key`, publicly readable, replacing any existing object.
    async fn store_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Remove the object under `key`.
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    async fn bucket_exists(&self) -> Result<bool, StoreError>;

    async fn create_bucket(&self) -> Result<(), StoreError>;
}

/// Answer to a single delete prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionChoice {
    DeleteOne,
    DeleteAll,
    KeepOne,
    KeepAll,
}

impl DeletionChoice {
    /// Maps the single-character terminal answers `d`, `D`, `k`, `K`.
    pub fn from_input(input: &str) -> Option<Self> {
        match input.trim() {
            "d" => Some(DeletionChoice::DeleteOne),
            "D" => Some(DeletionChoice::DeleteAll),
            "k" => Some(DeletionChoice::KeepOne),
            "K" => Some(DeletionChoice::KeepAll),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("decision input closed")]
    Closed,

    #[error("failed to read decision: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of interactive deletion decisions (terminal prompt in the CLI, mocks in tests).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Block until a decision for `candidate` is available.
    async fn choose(&self, candidate: &str) -> Result<DeletionChoice, DecisionError>;
}

/// Receives human-readable status lines, one complete line per call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait StatusSink: Send + Sync {
    fn line(&self, message: &str);
}
