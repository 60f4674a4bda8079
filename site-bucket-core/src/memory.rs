use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use md5::{Digest, Md5};

use crate::contract::{ListPage, RemoteObject, RemoteStore, StatusSink, StoreError};

/// Internal state for InMemoryStore.
///
/// Groups all mutable state into a single struct for simplified locking.
#[derive(Default)]
struct MemoryState {
    /// key -> content
    objects: BTreeMap<String, Vec<u8>>,
    bucket_exists: bool,
    /// Objects per listing page (0 means everything in one page)
    page_size: usize,
    /// Keys whose store/delete fails permanently
    failing_keys: HashSet<String>,
    /// Remaining timeouts to raise per key before succeeding
    pending_timeouts: HashMap<String, u32>,
    /// Remaining timeouts to raise on listing calls
    pending_list_timeouts: u32,
    list_calls: usize,
    store_calls: Vec<String>,
    delete_calls: Vec<String>,
}

/// In-memory implementation of RemoteStore for testing.
///
/// This store allows you to:
/// - Seed remote objects and paginate their listing
/// - Inject permanent failures and a number of timeouts per key
/// - Verify which stores and deletes were attempted
#[derive(Clone)]
pub struct InMemoryStore {
    bucket: String,
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::new(Mutex::new(MemoryState {
                bucket_exists: true,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Seed an object that already exists in the bucket.
    pub fn put(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.state().objects.insert(key.into(), content.into());
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state().page_size = page_size;
    }

    pub fn set_bucket_exists(&self, exists: bool) {
        self.state().bucket_exists = exists;
    }

    /// Make store and delete fail permanently for `key`.
    pub fn fail_for(&self, key: impl Into<String>) {
        self.state().failing_keys.insert(key.into());
    }

    /// Raise `count` timeouts for `key` before its next store or delete succeeds.
    pub fn time_out_for(&self, key: impl Into<String>, count: u32) {
        self.state().pending_timeouts.insert(key.into(), count);
    }

    pub fn time_out_listing(&self, count: u32) {
        self.state().pending_list_timeouts = count;
    }

    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.state().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    /// Keys passed to store_object, in call order, including failed attempts.
    pub fn store_calls(&self) -> Vec<String> {
        self.state().store_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state().delete_calls.clone()
    }

    fn check_faults(state: &mut MemoryState, key: &str) -> Result<(), StoreError> {
        if let Some(remaining) = state.pending_timeouts.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Timeout(format!("simulated timeout for {key}")));
            }
        }
        if state.failing_keys.contains(key) {
            return Err(StoreError::Service(format!("simulated failure for {key}")));
        }
        Ok(())
    }
}

fn etag_of(content: &[u8]) -> String {
    format!("\"{:x}\"", Md5::digest(content))
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    async fn list_page(&self, continuation: Option<String>) -> Result<ListPage, StoreError> {
        let mut state = self.state();
        state.list_calls += 1;
        if state.pending_list_timeouts > 0 {
            state.pending_list_timeouts -= 1;
            return Err(StoreError::Timeout("simulated listing timeout".into()));
        }

        let remaining = state
            .objects
            .iter()
            .filter(|(key, _)| continuation.as_deref().map_or(true, |after| key.as_str() > after));
        let take = if state.page_size == 0 {
            usize::MAX
        } else {
            state.page_size
        };
        let objects: Vec<RemoteObject> = remaining
            .take(take)
            .map(|(key, content)| RemoteObject {
                key: key.clone(),
                etag: Some(etag_of(content)),
            })
            .collect();

        let last = objects.last().map(|o| o.key.clone());
        let more = match &last {
            Some(last) => state.objects.keys().any(|k| k > last),
            None => false,
        };
        Ok(ListPage {
            objects,
            next_continuation: if more { last } else { None },
        })
    }

    async fn store_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let mut state = self.state();
        state.store_calls.push(key.to_string());
        Self::check_faults(&mut state, key)?;
        state.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.delete_calls.push(key.to_string());
        Self::check_faults(&mut state, key)?;
        state.objects.remove(key);
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        Ok(self.state().bucket_exists)
    }

    async fn create_bucket(&self) -> Result<(), StoreError> {
        self.state().bucket_exists = true;
        Ok(())
    }
}

/// StatusSink that records every line, for asserting on user-visible output.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl StatusSink for RecordingSink {
    fn line(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}
