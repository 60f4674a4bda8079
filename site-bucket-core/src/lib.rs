#![doc = "site-bucket-core: reconciliation engine for site-bucket."]

//! This crate contains the logic that mirrors a local static-site directory into an
//! object-storage bucket: inventories, diffing, retrying transport, the deletion policy
//! and the orchestrating [`synchronise::synchronise`] run.
//! Store clients, configuration files and terminal I/O live in the `site-bucket` binary crate.
//!
//! # Usage
//! Implement [`contract::RemoteStore`], [`contract::DecisionSource`] and
//! [`contract::StatusSink`], build a [`config::SyncConfig`] and call
//! [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod deletion;
pub mod diff;
pub mod inventory;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod memory;
pub mod retry;
pub mod synchronise;
