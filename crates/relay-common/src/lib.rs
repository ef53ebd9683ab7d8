//! Shared primitives used across the relay workspace: process-wide config,
//! id generation, and small text helpers. Intentionally dependency-light —
//! no HTTP types, no storage types.

pub mod ids;
pub mod truncate;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged process-wide configuration.
///
/// Merge order: CLI > ENV > defaults (`GlobalConfigPatch::overlay`), applied
/// once at startup in `relay-core::bootstrap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Outbound proxy used for upstream egress, if any.
    pub proxy: Option<String>,
    /// Default effective-config knobs merged into a `Group` that omits them.
    pub defaults: GroupDefaults,
}

/// System-wide defaults merged into each Group's effective config, per
/// spec.md §6 "Settings source".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefaults {
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
    /// Falls back to the process-wide `--proxy`/`RELAY_PROXY_URL` setting
    /// for any group whose own config doesn't set one.
    pub proxy_url: Option<String>,
}

impl Default for GroupDefaults {
    fn default() -> Self {
        Self {
            request_timeout_secs: 600,
            connect_timeout_secs: 10,
            idle_conn_timeout_secs: 90,
            response_header_timeout_secs: 30,
            max_idle_conns: 100,
            max_idle_conns_per_host: 20,
            max_retries: 3,
            blacklist_threshold: 3,
            retry_interval_ms: 250,
            max_request_body_log_size: 64 * 1024,
            max_response_body_log_size: 256 * 1024,
            proxy_url: None,
        }
    }
}

/// Optional overlay layer used for merging global config from CLI/env.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(8787),
            proxy: self.proxy.clone(),
            defaults: GroupDefaults {
                proxy_url: self.proxy,
                ..GroupDefaults::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_prefers_later_values() {
        let mut base = GlobalConfigPatch {
            host: Some("0.0.0.0".into()),
            port: Some(8787),
            proxy: None,
        };
        base.overlay(GlobalConfigPatch {
            host: None,
            port: Some(9000),
            proxy: Some("http://proxy:3128".into()),
        });
        assert_eq!(base.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(base.port, Some(9000));
        assert_eq!(base.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn into_config_fills_defaults() {
        let config = GlobalConfigPatch::default().into_config().unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8787);
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.proxy_url, None);
    }

    #[test]
    fn into_config_threads_proxy_into_defaults() {
        let patch = GlobalConfigPatch {
            proxy: Some("http://proxy:3128".into()),
            ..GlobalConfigPatch::default()
        };
        let config = patch.into_config().unwrap();
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.defaults.proxy_url.as_deref(), Some("http://proxy:3128"));
    }
}
