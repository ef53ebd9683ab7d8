//! Per-channel-instance HTTP clients (spec.md §4.A, §5): one tuned for
//! unary requests with a hard whole-response timeout, one for streams with
//! only connect/response-header timeouts so a slow-trickling body is never
//! cut off mid-stream. Grounded on `gproxy-core::upstream_client`'s
//! `WreqUpstreamClient` (timeout/proxy/pool wiring), rebuilt here on plain
//! `reqwest` — nothing in this crate needs wreq's TLS-fingerprint
//! impersonation, which existed solely for `gproxy`'s browser-session
//! OAuth providers (out of scope, see DESIGN.md).

use std::time::Duration;

use relay_provider_core::EffectiveConfig;

use crate::ChannelError;

#[derive(Clone)]
pub struct ChannelClients {
    pub unary: reqwest::Client,
    pub stream: reqwest::Client,
    /// Applied by the caller around the initial `send()` await only; the
    /// stream client itself carries no whole-response timeout.
    pub response_header_timeout: Duration,
}

impl ChannelClients {
    /// `upstream_count` is the group's number of configured upstreams
    /// (spec.md §4.B) — reqwest only exposes a per-host idle cap, not a
    /// global one, so `config.max_idle_conns` is honored by splitting it
    /// evenly across the group's upstream hosts and using whichever of that
    /// split or `max_idle_conns_per_host` is tighter.
    pub fn build(
        config: &EffectiveConfig,
        force_http11: bool,
        upstream_count: usize,
    ) -> Result<Self, ChannelError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let pool_idle_timeout = Duration::from_secs(config.idle_conn_timeout_secs);
        let per_host_idle = Self::per_host_idle_cap(config, upstream_count);

        let mut unary_builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(per_host_idle);

        let mut stream_builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(per_host_idle);

        if force_http11 {
            unary_builder = unary_builder.http1_only();
            stream_builder = stream_builder.http1_only();
        }

        if let Some(proxy) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|err| ChannelError::InvalidProxy(err.to_string()))?;
            unary_builder = unary_builder.proxy(proxy.clone());
            stream_builder = stream_builder.proxy(proxy);
        }

        let unary = unary_builder
            .build()
            .map_err(|err| ChannelError::ClientBuild(err.to_string()))?;
        let stream = stream_builder
            .build()
            .map_err(|err| ChannelError::ClientBuild(err.to_string()))?;

        Ok(Self {
            unary,
            stream,
            response_header_timeout: Duration::from_secs(config.response_header_timeout_secs),
        })
    }

    fn per_host_idle_cap(config: &EffectiveConfig, upstream_count: usize) -> usize {
        let even_split = config.max_idle_conns / upstream_count.max(1);
        even_split.min(config.max_idle_conns_per_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EffectiveConfig {
        relay_common::GroupDefaults::default().into()
    }

    #[test]
    fn builds_both_clients_from_defaults() {
        let clients = ChannelClients::build(&config(), false, 1).unwrap();
        assert!(clients.response_header_timeout.as_secs() > 0);
    }

    #[test]
    fn rejects_malformed_proxy_url() {
        let mut cfg = config();
        cfg.proxy_url = Some("not a url".to_string());
        assert!(matches!(
            ChannelClients::build(&cfg, false, 1),
            Err(ChannelError::InvalidProxy(_))
        ));
    }

    #[test]
    fn force_http11_builds_without_error() {
        assert!(ChannelClients::build(&config(), true, 1).is_ok());
    }

    #[test]
    fn per_host_cap_matches_per_host_setting_for_a_single_upstream() {
        let cfg = config();
        assert_eq!(ChannelClients::per_host_idle_cap(&cfg, 1), cfg.max_idle_conns_per_host);
    }

    #[test]
    fn per_host_cap_splits_the_global_budget_across_upstreams() {
        let mut cfg = config();
        cfg.max_idle_conns = 100;
        cfg.max_idle_conns_per_host = 20;
        assert_eq!(ChannelClients::per_host_idle_cap(&cfg, 10), 10);
    }

    #[test]
    fn per_host_cap_never_exceeds_the_per_host_setting() {
        let mut cfg = config();
        cfg.max_idle_conns = 1000;
        cfg.max_idle_conns_per_host = 20;
        assert_eq!(ChannelClients::per_host_idle_cap(&cfg, 1), 20);
    }
}
