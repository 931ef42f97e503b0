// src/load_balancer/sticky.rs
use crate::load_balancer::round_robin::Rotation;
use crate::load_balancer::{RoutingAlgorithm, RoutingError};
use crate::proxy::{Backend, Request};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct StickyState {
    rotation: Rotation,
    /// client id -> assigned backend. Every value is a member of the pool.
    affinity: HashMap<String, Arc<Backend>>,
}

/// Round robin with per-client affinity.
///
/// A client keeps its backend until that backend leaves the pool. Requests
/// without a client id are plain round robin and never touch the affinity
/// table. Stale entries are purged in `set_backends`, so `select` trusts
/// whatever it finds in the table.
#[derive(Debug, Default)]
pub struct StickyRoundRobin {
    state: Mutex<StickyState>,
}

impl StickyRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend currently bound to `client_id`, if any.
    pub fn affinity(&self, client_id: &str) -> Option<Arc<Backend>> {
        self.state().affinity.get(client_id).cloned()
    }

    pub fn affinity_len(&self) -> usize {
        self.state().affinity.len()
    }

    fn state(&self) -> MutexGuard<'_, StickyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoutingAlgorithm for StickyRoundRobin {
    fn set_backends(&self, backends: Vec<Arc<Backend>>) {
        let mut state = self.state();
        let StickyState { rotation, affinity } = &mut *state;

        rotation.reset(backends);
        let before = affinity.len();
        if rotation.pool().is_empty() {
            affinity.clear();
        } else {
            affinity.retain(|_, backend| rotation.contains(&**backend));
        }

        info!(
            pool_size = rotation.pool().len(),
            evicted = before - affinity.len(),
            retained = affinity.len(),
            "sticky pool updated"
        );
    }

    fn select(&self, request: &Request) -> Result<Arc<Backend>, RoutingError> {
        let mut state = self.state();
        let key = request.affinity_key();

        if let Some(backend) = key.and_then(|k| state.affinity.get(k)) {
            debug!(request_id = %request.id(), client_id = key, backend = %backend.name, "sticky hit");
            return Ok(backend.clone());
        }

        let backend = state.rotation.next()?;
        match key {
            Some(client_id) => {
                state.affinity.insert(client_id.to_string(), backend.clone());
                debug!(request_id = %request.id(), client_id, backend = %backend.name, "sticky assignment");
            }
            None => {
                debug!(request_id = %request.id(), backend = %backend.name, "anonymous request routed");
            }
        }
        Ok(backend)
    }

    fn backends(&self) -> Vec<Arc<Backend>> {
        self.state().rotation.pool().to_vec()
    }

    fn name(&self) -> &'static str {
        "sticky_round_robin"
    }
}
