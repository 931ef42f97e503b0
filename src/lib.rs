// src/lib.rs
pub mod config;
pub mod proxy;
pub mod load_balancer;
pub mod metrics;
