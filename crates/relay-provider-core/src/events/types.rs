use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::model::CredentialId;

/// Operational events emitted by the Key Provider (spec.md §4.C) for
/// observability. These are distinct from the per-request `Request Log
/// Record` (§3), which is assembled by `relay-core::RequestLogger` and
/// delivered through the `relay-storage::LogSink` collaborator instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Operational(OperationalEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationalEvent {
    /// A credential's consecutive-failure counter reached the group's
    /// blacklist threshold and it was transitioned out of rotation.
    Blacklisted(BlacklistedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistedEvent {
    pub at: SystemTime,
    pub credential_id: CredentialId,
    pub consecutive_failures: u32,
}
