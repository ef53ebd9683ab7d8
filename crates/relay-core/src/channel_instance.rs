//! Per-group "channel instance": the adapter, the two HTTP clients, and the
//! upstream router a group's requests dispatch through (spec.md §4.A,
//! §4.B, §5 "Group snapshot"). Rebuilt only when the Group snapshot's
//! channel-identity fields change, per the staleness check in §5 —
//! grounded on `CredentialPool::replace_snapshot`'s `ArcSwap`-backed
//! config reload, generalized from one process-wide swap to a per-group
//! map behind a single `ArcSwap`.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use relay_channels::{ChannelAdapter, ChannelClients, adapter_for};
use relay_provider_core::{Group, GroupId};
use relay_router::UpstreamRouter;
use tokio::sync::Mutex;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelInstanceError {
    #[error(transparent)]
    Channel(#[from] relay_channels::ChannelError),
    #[error(transparent)]
    Router(#[from] relay_router::RouterError),
}

pub struct ChannelInstance {
    pub adapter: &'static dyn ChannelAdapter,
    pub clients: ChannelClients,
    pub router: UpstreamRouter,
    /// The snapshot this instance was built from; used only to evaluate
    /// `Group::channel_identity_eq` on the next request.
    identity: Group,
}

/// Process-wide index of per-group channel instances (spec.md §9 "Global
/// state": "the only process-wide state the core requires is the Key Pool
/// index and the per-channel HTTP clients").
pub struct ChannelInstanceCache {
    instances: ArcSwap<HashMap<GroupId, Arc<ChannelInstance>>>,
    /// Serializes concurrent rebuilds of the same group so a burst of
    /// requests against a just-changed Group doesn't build N redundant
    /// client pools.
    build_lock: Mutex<()>,
}

impl ChannelInstanceCache {
    pub fn new() -> Self {
        Self {
            instances: ArcSwap::from_pointee(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    pub async fn get_or_build(
        &self,
        group: &Group,
    ) -> Result<Arc<ChannelInstance>, ChannelInstanceError> {
        if let Some(fresh) = self.fresh_entry(group) {
            return Ok(fresh);
        }

        let _guard = self.build_lock.lock().await;
        if let Some(fresh) = self.fresh_entry(group) {
            return Ok(fresh);
        }

        let built = Arc::new(ChannelInstance {
            adapter: adapter_for(group.channel),
            clients: ChannelClients::build(&group.config, group.force_http11, group.upstreams.len())?,
            router: UpstreamRouter::new(&group.upstreams)?,
            identity: group.clone(),
        });

        self.instances.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(group.id, built.clone());
            next
        });

        Ok(built)
    }

    fn fresh_entry(&self, group: &Group) -> Option<Arc<ChannelInstance>> {
        let existing = self.instances.load().get(&group.id).cloned()?;
        if existing.identity.channel_identity_eq(group) {
            Some(existing)
        } else {
            None
        }
    }
}

impl Default for ChannelInstanceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_provider_core::{ChannelKind, Upstream};

    fn group(id: GroupId, weight: u32) -> Group {
        Group {
            id,
            name: "g".to_string(),
            channel: ChannelKind::OpenAi,
            upstreams: vec![Upstream {
                base_url: "https://api.openai.com".to_string(),
                weight,
            }],
            validation_path: "/v1/models".to_string(),
            config: relay_common::GroupDefaults::default().into(),
            header_rules: vec![],
            param_overrides: None,
            force_http11: false,
        }
    }

    #[tokio::test]
    async fn reuses_instance_when_identity_is_unchanged() {
        let cache = ChannelInstanceCache::new();
        let g = group(1, 1);
        let a = cache.get_or_build(&g).await.unwrap();
        let b = cache.get_or_build(&g).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn rebuilds_when_upstreams_change() {
        let cache = ChannelInstanceCache::new();
        let mut g = group(1, 1);
        let a = cache.get_or_build(&g).await.unwrap();
        g.upstreams[0].weight = 5;
        let b = cache.get_or_build(&g).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn rebuilds_when_force_http11_changes() {
        let cache = ChannelInstanceCache::new();
        let mut g = group(1, 1);
        let a = cache.get_or_build(&g).await.unwrap();
        g.force_http11 = true;
        let b = cache.get_or_build(&g).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
