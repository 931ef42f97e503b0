// src/config/models.rs
use crate::proxy::Backend;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub algorithm: LoadBalancerAlgorithm,

    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub name: String,
    pub url: Url,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    #[default]
    RoundRobin,
    StickyRoundRobin,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Applied when a request carries no timeout of its own.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("At least one backend must be configured");
        }

        let mut names = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                bail!("Backend name must not be empty ({})", backend.url);
            }
            if !names.insert(backend.name.as_str()) {
                bail!("Duplicate backend name: {}", backend.name);
            }
            if !matches!(backend.url.scheme(), "http" | "https") {
                bail!(
                    "Backend {} must use http or https, got {}",
                    backend.name,
                    backend.url.scheme()
                );
            }
        }

        if self.transport.timeout_secs == 0 {
            bail!("transport.timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// The configured pool, in file order.
    pub fn backend_pool(&self) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .map(|b| Arc::new(Backend::from(b)))
            .collect()
    }
}

impl From<&BackendConfig> for Backend {
    fn from(config: &BackendConfig) -> Self {
        Backend::new(config.name.clone(), config.url.clone())
    }
}
