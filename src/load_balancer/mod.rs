// src/load_balancer/mod.rs
mod algorithm;
mod balancer;
mod round_robin;
mod sticky;

pub use algorithm::{RoutingAlgorithm, RoutingError};
pub use balancer::{LoadBalancer, LoadBalancerError};
pub use round_robin::RoundRobin;
pub use sticky::StickyRoundRobin;
pub use crate::config::LoadBalancerAlgorithm;

use std::sync::Arc;

pub fn create_algorithm(algorithm: LoadBalancerAlgorithm) -> Arc<dyn RoutingAlgorithm> {
    match algorithm {
        LoadBalancerAlgorithm::RoundRobin => Arc::new(RoundRobin::new()),
        LoadBalancerAlgorithm::StickyRoundRobin => Arc::new(StickyRoundRobin::new()),
    }
}
