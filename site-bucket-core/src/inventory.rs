//! # inventory: comparable snapshots of local and remote content
//!
//! Both sides of a reconciliation are reduced to an [`Inventory`], a sorted map
//! from object key to content digest:
//! - [`local_inventory`] walks the site directory and hashes every regular file with MD5
//! - [`remote_inventory`] drains the bucket listing and takes each object's ETag
//!
//! The two digests only agree when the store's ETag is the plain MD5 of the body.
//! That holds for single-part uploads without server-side transformation; objects
//! uploaded in multiple parts carry a composite ETag and will always look changed.

use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::{DirEntry, WalkDir};

use crate::contract::{RemoteStore, StoreError};
use crate::retry::RetryingTransport;

/// One entry of an inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Forward-slash path relative to the site root; doubles as the object key.
    pub path: String,
    pub digest: String,
}

/// Immutable snapshot of one side of the comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<String, String>,
}

impl Inventory {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in ascending order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = FileRecord> + '_ {
        self.entries.iter().map(|(path, digest)| FileRecord {
            path: path.clone(),
            digest: digest.clone(),
        })
    }
}

impl FromIterator<FileRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|r| (r.path, r.digest)).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("site directory {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("failed to read {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path {0} is not valid UTF-8 and cannot be used as an object key")]
    NonUtf8Path(PathBuf),

    #[error("remote listing could not be completed: {0}")]
    RemoteUnavailable(#[source] StoreError),
}

/// Options for walking the local tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScanOptions {
    /// Include dot-files and the contents of dot-directories.
    pub include_hidden: bool,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Hex-encoded MD5 of the file's content, streamed from disk.
pub fn file_digest(path: &Path) -> Result<String, InventoryError> {
    let to_error = |source| InventoryError::Filesystem {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(to_error)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher).map_err(to_error)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Object key for `path` below `root`, with forward-slash separators.
fn object_key(root: &Path, path: &Path) -> Result<String, InventoryError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| InventoryError::NonUtf8Path(path.to_path_buf()))?;
    let mut segments = Vec::new();
    for component in relative.components() {
        let segment = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| InventoryError::NonUtf8Path(path.to_path_buf()))?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// Build the local inventory of every regular file below `root`.
pub fn local_inventory(root: &Path, options: LocalScanOptions) -> Result<Inventory, InventoryError> {
    if !root.is_dir() {
        error!(root = %root.display(), "[INVENTORY] Site directory missing");
        return Err(InventoryError::MissingRoot(root.to_path_buf()));
    }
    info!(root = %root.display(), "[INVENTORY] Scanning local site directory");

    let mut entries = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| options.include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            error!(path = %path.display(), error = %e, "[INVENTORY] Failed to read directory entry");
            InventoryError::Filesystem {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = object_key(root, entry.path())?;
        let digest = file_digest(entry.path())?;
        debug!(key = %key, digest = %digest, "[INVENTORY] Hashed local file");
        entries.insert(key, digest);
    }

    info!(count = entries.len(), "[INVENTORY] Local inventory complete");
    Ok(Inventory { entries })
}

/// Strip the quotes S3 wraps around ETags.
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Build the remote inventory from the full, paginated bucket listing.
///
/// Every page request goes through `transport`; a page that still fails after
/// retrying invalidates the whole listing.
pub async fn remote_inventory<S>(
    store: &S,
    transport: &RetryingTransport<'_>,
) -> Result<Inventory, InventoryError>
where
    S: RemoteStore + ?Sized,
{
    info!(bucket = %store.bucket(), "[INVENTORY] Listing remote objects");
    let mut entries = BTreeMap::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let token = continuation.clone();
        let page = transport
            .execute("list objects", || store.list_page(token.clone()))
            .await
            .map_err(|e| {
                error!(error = %e, pages, "[INVENTORY] Remote listing failed");
                InventoryError::RemoteUnavailable(e)
            })?;
        pages += 1;

        for object in page.objects {
            let digest = object
                .etag
                .as_deref()
                .map(normalize_etag)
                .unwrap_or_default()
                .to_string();
            entries.insert(object.key, digest);
        }

        match page.next_continuation {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    info!(count = entries.len(), pages, "[INVENTORY] Remote inventory complete");
    Ok(Inventory { entries })
}
