//! Collaborator interfaces the core consumes (spec.md §6): a read-only
//! `GroupStore`, a `LogSink`, and a `SettingsSource`. The relational store,
//! the admin CRUD surface, and the key-import task runner that would
//! implement these in a full deployment are out of scope (spec.md §1) —
//! this crate is the trait boundary plus an in-memory reference
//! implementation used by `apps/relay` and by the core's own tests.
//! Grounded on `gproxy-storage::{snapshot,sinks,traffic}`'s split between
//! a storage trait and a concrete backend.

pub mod inmem;
pub mod record;
pub mod traits;

pub use inmem::InMemoryStore;
pub use record::{RecordType, RequestLogRecord};
pub use traits::{GroupStore, LogSink, SettingsSource, StorageError};
