// src/proxy/backend.rs
use url::Url;

/// A routable destination. Immutable once built; pools share it as `Arc<Backend>`.
///
/// Equality and hashing cover both fields, and the same relation decides
/// pool membership when affinities are filtered on reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    pub name: String,
    pub base_url: Url,
}

impl Backend {
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self {
            name: name.into(),
            base_url,
        }
    }

    /// Parse `base_url` and build the backend.
    pub fn parse(name: impl Into<String>, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(name, Url::parse(base_url)?))
    }
}
