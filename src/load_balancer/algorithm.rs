// src/load_balancer/algorithm.rs
use crate::proxy::{Backend, Request};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("No backends available")]
    NoBackendsAvailable,
}

/// A stateful routing strategy over the current backend pool.
///
/// Implementations keep the pool, the rotation cursor and any affinity state
/// behind a single lock, so `set_backends` is observed atomically by
/// concurrent `select` calls.
pub trait RoutingAlgorithm: Send + Sync {
    /// Replace the pool and reset rotation. An empty pool is valid here;
    /// only `select` fails on it.
    fn set_backends(&self, backends: Vec<Arc<Backend>>);

    /// Pick the backend for `request`. Never returns a backend outside the
    /// current pool.
    fn select(&self, request: &Request) -> Result<Arc<Backend>, RoutingError>;

    /// Current pool, in rotation order.
    fn backends(&self) -> Vec<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
