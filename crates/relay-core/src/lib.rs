//! Core wiring for the multi-tenant reverse proxy (spec.md §4): the Channel
//! Instance cache, Retry Executor state machine, Request Logger, inbound
//! routing, and the axum `Router`/`CoreState` assembly. Grounded on the
//! teacher's `gproxy-core` crate layout.

pub mod bootstrap;
pub mod channel_instance;
pub mod core;
pub mod error;
pub mod executor;
pub mod handler;
pub mod logger;

pub use bootstrap::build_core;
pub use core::{Core, CoreState};
pub use error::ProxyError;
pub use executor::{IncomingRequest, ProxyOutcome, RetryExecutor};
