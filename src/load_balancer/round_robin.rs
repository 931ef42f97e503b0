// src/load_balancer/round_robin.rs
use crate::load_balancer::{RoutingAlgorithm, RoutingError};
use crate::proxy::{Backend, Request};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Pool plus cursor. Shared by both round-robin flavours.
///
/// The cursor is always `< pool.len()`, or zero when the pool is empty.
#[derive(Debug, Default)]
pub(crate) struct Rotation {
    pool: Vec<Arc<Backend>>,
    cursor: usize,
}

impl Rotation {
    pub(crate) fn reset(&mut self, backends: Vec<Arc<Backend>>) {
        let distinct: HashSet<&Backend> = backends.iter().map(|b| &**b).collect();
        if distinct.len() != backends.len() {
            warn!(
                "Backend pool contains {} duplicate entries; duplicates get extra turns",
                backends.len() - distinct.len()
            );
        }

        self.pool = backends;
        self.cursor = 0;
    }

    pub(crate) fn next(&mut self) -> Result<Arc<Backend>, RoutingError> {
        if self.pool.is_empty() {
            return Err(RoutingError::NoBackendsAvailable);
        }

        let backend = self.pool[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.pool.len();
        Ok(backend)
    }

    pub(crate) fn contains(&self, backend: &Backend) -> bool {
        self.pool.iter().any(|b| **b == *backend)
    }

    pub(crate) fn pool(&self) -> &[Arc<Backend>] {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Plain round robin: hands out the pool in order, ignoring the request.
#[derive(Debug, Default)]
pub struct RoundRobin {
    rotation: Mutex<Rotation>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn rotation(&self) -> MutexGuard<'_, Rotation> {
        // Every mutation completes before the guard drops, so a poisoned
        // lock still holds a consistent pool and cursor.
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoutingAlgorithm for RoundRobin {
    fn set_backends(&self, backends: Vec<Arc<Backend>>) {
        let mut rotation = self.rotation();
        rotation.reset(backends);
        info!(pool_size = rotation.pool().len(), "round robin pool updated");
    }

    fn select(&self, request: &Request) -> Result<Arc<Backend>, RoutingError> {
        let backend = self.rotation().next()?;
        debug!(request_id = %request.id(), backend = %backend.name, "round robin selected backend");
        Ok(backend)
    }

    fn backends(&self) -> Vec<Arc<Backend>> {
        self.rotation().pool().to_vec()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
