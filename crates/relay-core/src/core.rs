//! Wires the collaborators into an axum `Router` (spec.md §6 "Inbound
//! routing"). Grounded on `gproxy-core::core`'s `Core`/`CoreState` split —
//! state is still a single `Arc`-shared struct handed to every handler
//! invocation via axum's `State` extractor, but the `ProviderLookup`
//! closure and auth/traffic fields are replaced with the narrower
//! `GroupStore` + `RetryExecutor` collaborator pair spec.md §6 names.

use std::sync::Arc;

use axum::Router;
use axum::routing::any;

use relay_storage::GroupStore;

use crate::executor::RetryExecutor;

pub struct CoreState {
    pub group_store: Arc<dyn GroupStore>,
    pub executor: RetryExecutor,
}

pub struct Core {
    state: Arc<CoreState>,
}

impl Core {
    pub fn new(group_store: Arc<dyn GroupStore>, executor: RetryExecutor) -> Self {
        Self {
            state: Arc::new(CoreState {
                group_store,
                executor,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/proxy/{group}/{*rest}", any(crate::handler::proxy_handler))
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<CoreState> {
        self.state.clone()
    }
}
