//! Channel Adapter (spec.md §4.A): per-vendor URL construction, auth header
//! injection, stream/model detection, and the two HTTP clients (unary,
//! stream) every group's channel instance keeps around. Grounded on
//! `gproxy-provider-impl`'s per-provider `mod.rs` files (URL building via a
//! shared `build_url` helper, auth injection via `auth_extractor::set_*`)
//! and on `gproxy-core::upstream_client` for the dual-client split — with
//! `wreq` swapped for plain `reqwest` since nothing in this crate needs
//! TLS-fingerprint impersonation.

mod adapters;
mod client;
mod url;

pub use adapters::{AnthropicAdapter, ChannelAdapter, GeminiAdapter, OpenAiAdapter};
pub use client::ChannelClients;
pub use url::build_upstream_url;

use relay_provider_core::ChannelKind;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("no upstream configured for group")]
    NoUpstreamConfigured,
    #[error("invalid proxy url: {0}")]
    InvalidProxy(String),
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
}

/// Returns the adapter for a channel kind. Adapters are stateless; callers
/// hold a `'static` reference since there is exactly one instance per kind.
pub fn adapter_for(kind: ChannelKind) -> &'static dyn ChannelAdapter {
    match kind {
        ChannelKind::OpenAi => &OpenAiAdapter,
        ChannelKind::Anthropic => &AnthropicAdapter,
        ChannelKind::Gemini => &GeminiAdapter,
    }
}
