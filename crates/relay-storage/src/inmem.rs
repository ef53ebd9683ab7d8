//! In-memory reference implementation of the collaborator traits. Good
//! enough for the standalone binary and for exercising the core in tests;
//! a real deployment swaps this for the out-of-scope relational store
//! (spec.md §1).

use std::collections::HashMap;
use std::sync::Arc;

use relay_common::GroupDefaults;
use relay_provider_core::Group;
use tokio::sync::RwLock;

use crate::record::RequestLogRecord;
use crate::traits::{GroupStore, LogSink, SettingsSource, StorageError};

/// Caps the in-memory record buffer so a long-running demo process doesn't
/// grow unbounded; a real `LogSink` would flush to a database instead.
const MAX_BUFFERED_RECORDS: usize = 10_000;

pub struct InMemoryStore {
    groups: RwLock<HashMap<String, Group>>,
    records: RwLock<Vec<RequestLogRecord>>,
    defaults: GroupDefaults,
}

impl InMemoryStore {
    pub fn new(defaults: GroupDefaults) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
            defaults,
        }
    }

    pub async fn upsert_group(&self, group: Group) {
        self.groups.write().await.insert(group.name.clone(), group);
    }

    pub async fn records(&self) -> Vec<RequestLogRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl GroupStore for InMemoryStore {
    async fn get_group_by_name(&self, name: &str) -> Result<Group, StorageError> {
        self.groups
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::GroupNotFound(name.to_string()))
    }
}

#[async_trait::async_trait]
impl LogSink for InMemoryStore {
    async fn record(&self, record: RequestLogRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        if records.len() >= MAX_BUFFERED_RECORDS {
            records.remove(0);
        }
        records.push(record);
        Ok(())
    }
}

impl SettingsSource for InMemoryStore {
    fn defaults(&self) -> GroupDefaults {
        self.defaults.clone()
    }
}

pub fn shared(defaults: GroupDefaults) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_provider_core::{ChannelKind, EffectiveConfig, Upstream};

    fn effective_config(defaults: &GroupDefaults) -> EffectiveConfig {
        EffectiveConfig {
            request_timeout_secs: defaults.request_timeout_secs,
            connect_timeout_secs: defaults.connect_timeout_secs,
            idle_conn_timeout_secs: defaults.idle_conn_timeout_secs,
            response_header_timeout_secs: defaults.response_header_timeout_secs,
            max_idle_conns: defaults.max_idle_conns,
            max_idle_conns_per_host: defaults.max_idle_conns_per_host,
            max_retries: defaults.max_retries,
            blacklist_threshold: defaults.blacklist_threshold,
            retry_interval_ms: defaults.retry_interval_ms,
            max_request_body_log_size: defaults.max_request_body_log_size,
            max_response_body_log_size: defaults.max_response_body_log_size,
            proxy_url: None,
        }
    }

    #[tokio::test]
    async fn group_not_found_is_reported_distinctly() {
        let store = InMemoryStore::new(GroupDefaults::default());
        let err = store.get_group_by_name("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::GroupNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn upserted_group_is_retrievable_by_name() {
        let defaults = GroupDefaults::default();
        let store = InMemoryStore::new(defaults.clone());
        store
            .upsert_group(Group {
                id: 1,
                name: "prod".to_string(),
                channel: ChannelKind::OpenAi,
                upstreams: vec![Upstream {
                    base_url: "https://api.openai.com".to_string(),
                    weight: 1,
                }],
                validation_path: "/v1/models".to_string(),
                config: effective_config(&defaults),
                header_rules: vec![],
                param_overrides: None,
                force_http11: false,
            })
            .await;

        let group = store.get_group_by_name("prod").await.unwrap();
        assert_eq!(group.id, 1);
    }
}
