//! Process entry-point configuration (spec.md §9 "Global state": host/port,
//! nothing else — the DSN/data-dir/admin-key knobs `gproxy`'s binary
//! exposes belong to the out-of-scope relational store and admin surface).
//! CLI flags are left unset by default so `relay_common::GlobalConfigPatch`
//! can tell "not given" apart from "given, matches default" when it overlays
//! ENV and built-in defaults underneath (SPEC_FULL.md §1 "Configuration").

use clap::Parser;

use relay_common::GlobalConfigPatch;

#[derive(Parser)]
#[command(name = "relay")]
pub(crate) struct Cli {
    #[arg(long)]
    pub(crate) host: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Outbound proxy used for upstream egress, if any.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
    /// Seed a single demo group (`demo`, OpenAI channel) with one
    /// credential read from `$OPENAI_API_KEY`, for local smoke-testing.
    #[arg(long)]
    pub(crate) seed_demo_group: bool,
}

impl Cli {
    pub(crate) fn as_patch(&self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            proxy: self.proxy.clone(),
        }
    }
}

/// Reads the `RELAY_HOST`/`RELAY_PORT`/`RELAY_PROXY_URL` env vars into a
/// patch layer, sitting between CLI flags and built-in defaults.
pub(crate) fn env_patch() -> GlobalConfigPatch {
    GlobalConfigPatch {
        host: std::env::var("RELAY_HOST").ok(),
        port: std::env::var("RELAY_PORT")
            .ok()
            .and_then(|value| value.parse().ok()),
        proxy: std::env::var("RELAY_PROXY_URL").ok(),
    }
}
