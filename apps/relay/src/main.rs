use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use relay_provider_core::{ChannelKind, Credential, CredentialStatus, Group, TerminalEventSink, Upstream};
use relay_storage::InMemoryStore;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // CLI > ENV > built-in defaults (relay_common::GlobalConfigPatch::overlay).
    let mut config = cli::env_patch();
    config.overlay(cli.as_patch());
    let config = config.into_config()?;

    let group_store = relay_storage::inmem::shared(config.defaults.clone());
    let log_sink = group_store.clone();
    let bundle = relay_core::build_core(group_store.clone(), log_sink);
    bundle.events.add_sink(Arc::new(TerminalEventSink::new())).await;

    if cli.seed_demo_group {
        seed_demo_group(&group_store, &bundle.key_pools, config.defaults.clone()).await;
    }

    let app = bundle.core.router();

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Seeds a single `demo` group against the OpenAI channel, with one
/// credential read from `$OPENAI_API_KEY` (falls back to a placeholder so
/// the server still starts without one set, purely for routing smoke-tests).
async fn seed_demo_group(
    group_store: &std::sync::Arc<InMemoryStore>,
    key_pools: &relay_keypool::KeyPoolIndex,
    defaults: relay_common::GroupDefaults,
) {
    let group = Group {
        id: 1,
        name: "demo".to_string(),
        channel: ChannelKind::OpenAi,
        upstreams: vec![Upstream {
            base_url: "https://api.openai.com".to_string(),
            weight: 1,
        }],
        validation_path: "/v1/models".to_string(),
        config: defaults.into(),
        header_rules: vec![],
        param_overrides: None,
        force_http11: false,
    };
    group_store.upsert_group(group.clone()).await;

    let credential = Credential {
        id: 1,
        group_id: group.id,
        value: std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| "sk-demo-placeholder".to_string()),
        status: CredentialStatus::Active,
        consecutive_failures: 0,
        request_count: 0,
        last_used_at: None,
    };
    key_pools.pool_for(group.id).await.insert(credential).await;
    tracing::info!("seeded demo group with one credential");
}
