//! Collaborator interfaces the core consumes (spec.md §6). Persistence
//! itself — the relational store, the admin CRUD surface, settings cache —
//! is explicitly out of scope; these traits are the seam the core is built
//! against, grounded on the `Storage`/`StateSink` trait split in
//! `gproxy-storage` and `gproxy-provider-core::state`.

use relay_common::GroupDefaults;
use relay_provider_core::Group;

use crate::record::RequestLogRecord;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("group {0} not found")]
    GroupNotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Group snapshot provider (spec.md §6: `GetGroupByName`).
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_group_by_name(&self, name: &str) -> Result<Group, StorageError>;
}

/// Log sink (spec.md §6: `Record(Record) -> error`). Delivery failure is
/// reported but never propagated to the client response (spec.md §4.G).
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, record: RequestLogRecord) -> Result<(), StorageError>;
}

/// Settings source (spec.md §6): read-only access to system-wide defaults
/// merged into a Group's effective config.
pub trait SettingsSource: Send + Sync {
    fn defaults(&self) -> GroupDefaults;
}
