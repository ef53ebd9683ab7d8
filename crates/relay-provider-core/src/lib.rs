//! Data model and ambient abstractions shared by every core component
//! (spec.md §3): `Group`, `Credential`, header rules, and the operational
//! event hub. Intentionally does not depend on axum or any concrete HTTP
//! client — those live in `relay-channels` / `relay-core`.

pub mod events;
pub mod headers;
pub mod model;

pub use events::{BlacklistedEvent, Event, EventHub, EventSink, OperationalEvent, TerminalEventSink};
pub use headers::{Headers, header_remove, header_set};
pub use model::{
    ChannelKind, Credential, CredentialId, CredentialStatus, EffectiveConfig, Group, GroupId,
    HeaderRule, HeaderRuleAction, Upstream,
};
