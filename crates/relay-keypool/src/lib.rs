//! Key Pool and Key Provider (spec.md §4.C / "Key Pool" in §3).
//!
//! Per-group credential stores supporting fair rotation, direct-id
//! selection, status tracking, and blacklisting. Grounded on
//! `gproxy-provider-core::credential_pool`/`credential::pool`, replaced with
//! a cursor-based rotation (instead of random weighted sampling) so that
//! every active credential is visited at least once per `k` consecutive
//! `select` calls (spec.md §8 Testable Property #8).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use tokio::sync::RwLock;

use relay_provider_core::{
    BlacklistedEvent, Credential, CredentialId, CredentialStatus, Event, EventHub, GroupId,
    OperationalEvent,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyPoolError {
    #[error("no active credentials available for group")]
    NoKeysAvailable,
    #[error("credential {0} not found")]
    KeyNotFound(CredentialId),
    #[error("credential {0} is not active")]
    KeyInactive(CredentialId),
}

struct GroupState {
    credentials: HashMap<CredentialId, Credential>,
    /// Stable visitation order for the rotation cursor. Rebuilt (not
    /// merely filtered) on every status transition so the cursor never
    /// walks past a stale index.
    active_order: Vec<CredentialId>,
    cursor: AtomicUsize,
}

impl GroupState {
    fn empty() -> Self {
        Self {
            credentials: HashMap::new(),
            active_order: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    fn rebuild_active_order(&mut self) {
        self.active_order = self
            .credentials
            .values()
            .filter(|c| c.is_active())
            .map(|c| c.id)
            .collect();
        self.active_order.sort_unstable();
    }
}

/// The rotation store for a single `Group`.
pub struct GroupKeyPool {
    group_id: GroupId,
    state: RwLock<GroupState>,
    events: EventHub,
}

impl GroupKeyPool {
    fn new(group_id: GroupId, events: EventHub) -> Self {
        Self {
            group_id,
            state: RwLock::new(GroupState::empty()),
            events,
        }
    }

    pub async fn insert(&self, credential: Credential) {
        let mut state = self.state.write().await;
        state.credentials.insert(credential.id, credential);
        state.rebuild_active_order();
    }

    /// Select the next credential in rotation order. Advances the cursor
    /// atomically so concurrent callers observe distinct, sequential slots
    /// (spec.md §8 #8 "fair rotation").
    pub async fn select(&self) -> Result<Credential, KeyPoolError> {
        let state = self.state.read().await;
        if state.active_order.is_empty() {
            return Err(KeyPoolError::NoKeysAvailable);
        }
        let index = state.cursor.fetch_add(1, Ordering::Relaxed) % state.active_order.len();
        let id = state.active_order[index];
        state
            .credentials
            .get(&id)
            .cloned()
            .ok_or(KeyPoolError::NoKeysAvailable)
    }

    /// Select a specific credential by id, used for `/id_<n>` single-
    /// credential addressing (spec.md §6). Disables retry for the caller.
    pub async fn select_by_id(&self, id: CredentialId) -> Result<Credential, KeyPoolError> {
        let state = self.state.read().await;
        let credential = state
            .credentials
            .get(&id)
            .ok_or(KeyPoolError::KeyNotFound(id))?;
        if !credential.is_active() {
            return Err(KeyPoolError::KeyInactive(id));
        }
        Ok(credential.clone())
    }

    /// Record the outcome of an attempt (spec.md §4.C). On success, reset
    /// the failure counter; on failure, increment it and blacklist once the
    /// group's threshold is reached.
    pub async fn update_status(&self, id: CredentialId, success: bool, blacklist_threshold: u32) {
        let mut state = self.state.write().await;
        let Some(credential) = state.credentials.get_mut(&id) else {
            return;
        };

        if success {
            credential.consecutive_failures = 0;
            credential.request_count += 1;
            credential.last_used_at = Some(SystemTime::now());
            return;
        }

        credential.consecutive_failures += 1;
        let should_blacklist =
            blacklist_threshold > 0 && credential.consecutive_failures >= blacklist_threshold;
        if should_blacklist {
            credential.status = CredentialStatus::Invalid;
            let consecutive_failures = credential.consecutive_failures;
            state.rebuild_active_order();
            drop(state);
            self.events
                .emit(Event::Operational(OperationalEvent::Blacklisted(
                    BlacklistedEvent {
                        at: SystemTime::now(),
                        credential_id: id,
                        consecutive_failures,
                    },
                )))
                .await;
        }
    }

    /// Invalidate cached rotation entries when credentials are deleted
    /// upstream (admin path collaborator, spec.md §4.C).
    pub async fn remove_keys(&self, ids: &[CredentialId]) {
        let mut state = self.state.write().await;
        for id in ids {
            state.credentials.remove(id);
        }
        state.rebuild_active_order();
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }
}

/// Process-wide index of per-group key pools (spec.md §9 "Global state").
#[derive(Clone)]
pub struct KeyPoolIndex {
    pools: Arc<RwLock<HashMap<GroupId, Arc<GroupKeyPool>>>>,
    events: EventHub,
}

impl KeyPoolIndex {
    pub fn new(events: EventHub) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub async fn pool_for(&self, group_id: GroupId) -> Arc<GroupKeyPool> {
        if let Some(pool) = self.pools.read().await.get(&group_id) {
            return pool.clone();
        }
        let mut pools = self.pools.write().await;
        pools
            .entry(group_id)
            .or_insert_with(|| Arc::new(GroupKeyPool::new(group_id, self.events.clone())))
            .clone()
    }
}
