use std::collections::BTreeSet;

use crate::inventory::Inventory;

/// Partition of every key in either inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Present locally only.
    pub to_create: BTreeSet<String>,
    /// Present on both sides with differing digests.
    pub to_update: BTreeSet<String>,
    /// Present remotely only.
    pub to_delete: BTreeSet<String>,
    /// Present on both sides with equal digests; no operation is emitted.
    pub unchanged: BTreeSet<String>,
}

impl DiffResult {
    /// True when no create, update or delete is needed.
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

pub fn diff(local: &Inventory, remote: &Inventory) -> DiffResult {
    let mut result = DiffResult::default();

    for path in local.paths() {
        match remote.get(path) {
            None => {
                result.to_create.insert(path.to_string());
            }
            Some(remote_digest) if local.get(path) != Some(remote_digest) => {
                result.to_update.insert(path.to_string());
            }
            Some(_) => {
                result.unchanged.insert(path.to_string());
            }
        }
    }

    result.to_delete = remote
        .paths()
        .filter(|path| !local.contains(path))
        .map(str::to_string)
        .collect();

    result
}
