//! The data model shared by every core component (spec.md §3): `Group`,
//! `Credential`, and the pieces of effective config the core reads per
//! request. These types are owned by the persistence layer (out of scope,
//! see `relay-storage`); the core only ever holds read-only snapshots.

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One of the three supported vendor wire protocols (spec.md §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::OpenAi => "openai",
            ChannelKind::Anthropic => "anthropic",
            ChannelKind::Gemini => "gemini",
        }
    }
}

/// A single upstream base URL with its routing weight (spec.md §4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub base_url: String,
    /// Must be positive; a `Group` with any non-positive weight is invalid.
    pub weight: u32,
}

/// Header rule action (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRuleAction {
    Set,
    Remove,
}

/// One `(canonical-header-name, value-template, action)` rule. A `Group`'s
/// rule list contains at most one rule per canonical name — enforced by the
/// admin surface (out of scope), not re-validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    pub name: String,
    pub value_template: String,
    pub action: HeaderRuleAction,
}

/// Effective numeric configuration for a `Group`, merged with system
/// defaults by the Settings source collaborator (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub idle_conn_timeout_secs: u64,
    pub response_header_timeout_secs: u64,
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    pub max_retries: u32,
    pub blacklist_threshold: u32,
    pub retry_interval_ms: u64,
    pub max_request_body_log_size: usize,
    pub max_response_body_log_size: usize,
    pub proxy_url: Option<String>,
}

impl From<relay_common::GroupDefaults> for EffectiveConfig {
    fn from(defaults: relay_common::GroupDefaults) -> Self {
        Self {
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
            proxy_url: defaults.proxy_url,
        }
    }
}

pub type GroupId = i64;

/// A named tenant configuration unit (spec.md §3 "Group").
///
/// Owned by the persistence layer; the core only ever sees an immutable
/// snapshot fetched once per request (§5 "Group snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub channel: ChannelKind,
    pub upstreams: Vec<Upstream>,
    pub validation_path: String,
    pub config: EffectiveConfig,
    pub header_rules: Vec<HeaderRule>,
    pub param_overrides: Option<HashMap<String, serde_json::Value>>,
    pub force_http11: bool,
}

impl Group {
    /// A cheap identity check used for the staleness test in §5: two
    /// snapshots are equivalent iff every field that participates in
    /// channel-instance construction is deep-equal.
    pub fn channel_identity_eq(&self, other: &Group) -> bool {
        self.channel == other.channel
            && self.validation_path == other.validation_path
            && self.upstreams == other.upstreams
            && self.config == other.config
            && self.force_http11 == other.force_http11
    }
}

pub type CredentialId = i64;

/// Credential status (spec.md §3 "Credential"). Only `Active` credentials
/// are eligible for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Invalid,
    ManuallyDisabled,
}

/// An opaque secret bound to exactly one `Group` (spec.md §3 "Credential").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub group_id: GroupId,
    pub value: String,
    pub status: CredentialStatus,
    pub consecutive_failures: u32,
    pub request_count: u64,
    pub last_used_at: Option<SystemTime>,
}

impl Credential {
    pub fn is_active(&self) -> bool {
        matches!(self.status, CredentialStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> Group {
        Group {
            id: 1,
            name: "g".into(),
            channel: ChannelKind::OpenAi,
            upstreams: vec![Upstream {
                base_url: "https://api.openai.com".into(),
                weight: 1,
            }],
            validation_path: "/v1/models".into(),
            config: relay_common::GroupDefaults::default().into(),
            header_rules: vec![],
            param_overrides: None,
            force_http11: false,
        }
    }

    #[test]
    fn channel_identity_eq_ignores_name() {
        let a = sample_group();
        let mut b = sample_group();
        b.name = "different-name".into();
        assert!(a.channel_identity_eq(&b));
    }

    #[test]
    fn channel_identity_eq_detects_upstream_change() {
        let a = sample_group();
        let mut b = sample_group();
        b.upstreams[0].weight = 5;
        assert!(!a.channel_identity_eq(&b));
    }
}
