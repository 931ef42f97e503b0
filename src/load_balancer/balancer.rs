// src/load_balancer/balancer.rs
use crate::load_balancer::{RoutingAlgorithm, RoutingError};
use crate::metrics::{MetricsCollector, Timer};
use crate::proxy::{Backend, Request, RequestOptions, Response, Transport};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum LoadBalancerError<E> {
    Routing(RoutingError),

    /// The transport's own error, untouched.
    Transport(E),
}

impl<E> From<RoutingError> for LoadBalancerError<E> {
    fn from(err: RoutingError) -> Self {
        LoadBalancerError::Routing(err)
    }
}

// Both variants display and chain exactly like the error they carry.
impl<E: fmt::Display> fmt::Display for LoadBalancerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancerError::Routing(e) => fmt::Display::fmt(e, f),
            LoadBalancerError::Transport(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for LoadBalancerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadBalancerError::Routing(e) => std::error::Error::source(e),
            LoadBalancerError::Transport(e) => std::error::Error::source(e),
        }
    }
}

impl<E> LoadBalancerError<E> {
    pub fn is_no_backends(&self) -> bool {
        matches!(self, LoadBalancerError::Routing(RoutingError::NoBackendsAvailable))
    }

    /// Recover the original transport error, if that is what failed.
    pub fn into_transport(self) -> Option<E> {
        match self {
            LoadBalancerError::Transport(e) => Some(e),
            LoadBalancerError::Routing(_) => None,
        }
    }
}

/// Composition point: one routing algorithm, one transport.
///
/// No retries or fallbacks happen here. An empty pool or a transport failure
/// comes straight back to the caller.
pub struct LoadBalancer<T: Transport> {
    algorithm: Arc<dyn RoutingAlgorithm>,
    transport: T,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<T: Transport> LoadBalancer<T> {
    pub fn new(backends: Vec<Arc<Backend>>, algorithm: Arc<dyn RoutingAlgorithm>, transport: T) -> Self {
        algorithm.set_backends(backends);
        Self {
            algorithm,
            transport,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        metrics.update_pool_size(self.algorithm.backends().len());
        self.metrics = Some(metrics);
        self
    }

    /// Swap the pool without rebuilding the balancer.
    pub fn set_backends(&self, backends: Vec<Arc<Backend>>) {
        let size = backends.len();
        self.algorithm.set_backends(backends);
        if let Some(metrics) = &self.metrics {
            metrics.update_pool_size(size);
        }
    }

    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.algorithm.backends()
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn handle_request(
        &self,
        method: impl Into<String>,
        path: impl Into<String>,
        options: RequestOptions,
    ) -> Result<Response, LoadBalancerError<T::Error>> {
        self.dispatch(Request::new(method, path, options)).await
    }

    /// Route an already built request.
    pub async fn dispatch(&self, request: Request) -> Result<Response, LoadBalancerError<T::Error>> {
        let backend = match self.algorithm.select(&request) {
            Ok(backend) => backend,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure("no_backends");
                }
                return Err(e.into());
            }
        };

        let timer = Timer::new();
        match self.transport.send(&backend, &request).await {
            Ok(response) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_request(
                        request.method(),
                        response.status_code,
                        &backend.name,
                        timer.elapsed(),
                    );
                }
                Ok(response)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure("transport");
                }
                Err(LoadBalancerError::Transport(e))
            }
        }
    }
}
