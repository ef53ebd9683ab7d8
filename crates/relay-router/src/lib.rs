//! Upstream Router (spec.md §4.B): smooth weighted round-robin across a
//! group's configured upstream base URLs. Grounded on
//! `gproxy-provider-core::credential_pool`'s `pick_weighted_index`, but
//! replaced with the deterministic running-weight algorithm spec.md §4.B
//! mandates in place of random weighted sampling — a per-pick random draw
//! cannot satisfy the bounded-burst fairness property (spec.md §8 #9).

use tokio::sync::Mutex;

use relay_provider_core::Upstream;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    #[error("no upstream configured for group")]
    NoUpstreamConfigured,
}

struct Entry {
    base_url: String,
    weight: i64,
    running_weight: i64,
}

struct RouterState {
    entries: Vec<Entry>,
    total_weight: i64,
}

/// Per-group router state. Picks are serialized by an internal mutex
/// (spec.md §4.B, §5 "Upstream Router state").
pub struct UpstreamRouter {
    state: Mutex<RouterState>,
}

impl UpstreamRouter {
    pub fn new(upstreams: &[Upstream]) -> Result<Self, RouterError> {
        if upstreams.is_empty() {
            return Err(RouterError::NoUpstreamConfigured);
        }
        let entries: Vec<Entry> = upstreams
            .iter()
            .map(|u| Entry {
                base_url: u.base_url.clone(),
                weight: u.weight as i64,
                running_weight: 0,
            })
            .collect();
        let total_weight = entries.iter().map(|e| e.weight).sum();
        Ok(Self {
            state: Mutex::new(RouterState {
                entries,
                total_weight,
            }),
        })
    }

    /// Smooth weighted round-robin: add each entry's configured weight to
    /// its running weight, pick the largest running weight, subtract the
    /// total from the winner. Deterministic; long-run frequency matches the
    /// weight ratio and short-run bursts are minimal (spec.md §4.B).
    pub async fn pick(&self) -> Result<String, RouterError> {
        let mut state = self.state.lock().await;
        if state.entries.is_empty() {
            return Err(RouterError::NoUpstreamConfigured);
        }

        for entry in state.entries.iter_mut() {
            entry.running_weight += entry.weight;
        }

        let total_weight = state.total_weight;
        let winner = state
            .entries
            .iter_mut()
            .max_by_key(|e| e.running_weight)
            .expect("entries is non-empty");
        winner.running_weight -= total_weight;

        Ok(winner.base_url.clone())
    }
}
