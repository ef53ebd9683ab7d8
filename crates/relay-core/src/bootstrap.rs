//! Assembles a [`Core`] from its collaborators (spec.md §6: `GroupStore`,
//! `LogSink`). Grounded on `apps/gproxy/src/main.rs`'s binary wiring,
//! trimmed to this crate's narrower seam — no admin UI, no OAuth, no
//! DSN-backed storage.

use std::sync::Arc;

use relay_provider_core::EventHub;
use relay_storage::{GroupStore, LogSink};

use crate::channel_instance::ChannelInstanceCache;
use crate::core::Core;
use crate::executor::RetryExecutor;
use crate::logger::RequestLogger;
use relay_keypool::KeyPoolIndex;

/// Default capacity of the operational event channel (spec.md §9 "Global
/// state"); matches `relay_provider_core::EventHub::new`'s buffering
/// contract of "never block a request on a slow event subscriber".
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a binary needs to run the proxy and to seed/administer
/// credentials out-of-band (admin CRUD itself is out of scope, spec.md §1).
pub struct CoreBundle {
    pub core: Core,
    pub key_pools: KeyPoolIndex,
    pub events: EventHub,
}

pub fn build_core(group_store: Arc<dyn GroupStore>, log_sink: Arc<dyn LogSink>) -> CoreBundle {
    let events = EventHub::new(EVENT_CHANNEL_CAPACITY);
    let key_pools = KeyPoolIndex::new(events.clone());
    let channel_cache = ChannelInstanceCache::new();
    let logger = RequestLogger::new(log_sink);
    let executor = RetryExecutor::new(key_pools.clone(), channel_cache, logger);
    let core = Core::new(group_store, executor);

    CoreBundle {
        core,
        key_pools,
        events,
    }
}
