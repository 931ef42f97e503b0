// ────────────────────────────────
// src/proxy/transport.rs
// Delivers a routed request to its backend
// ────────────────────────────────

use super::backend::Backend;
use super::request::{Request, Response};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::convert::Infallible;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Sends a request to the backend the algorithm picked.
///
/// Failures are returned as-is; the load balancer neither retries nor wraps
/// their meaning.
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send(&self, backend: &Backend, request: &Request) -> Result<Response, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Request path must be an absolute path without scheme or authority: {0}")]
    InvalidPath(String),

    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_timeout())
    }
}

/// Append `path` to the backend's own path. The scheme, host and port always
/// come from `base_url`.
fn backend_url(base_url: &Url, path: &str) -> Result<Url, TransportError> {
    let invalid = || TransportError::InvalidPath(path.to_string());
    if !path.starts_with('/') || path.starts_with("//") || path.contains(&['?', '#', '\\'][..]) {
        return Err(invalid());
    }

    let prefix = base_url.path().trim_end_matches('/');
    let mut url = base_url.clone();
    url.set_path(&format!("{}{}", prefix, path));

    // Dot segments are normalized by `set_path`; they must not climb out of the prefix.
    let joined = url.path();
    if !prefix.is_empty() && joined != prefix && !joined.starts_with(&format!("{}/", prefix)) {
        return Err(invalid());
    }
    Ok(url)
}

/// HTTP transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    default_timeout: Option<Duration>,
}

impl HttpTransport {
    /// `default_timeout` applies to requests that carry no timeout of their own.
    pub fn new(default_timeout: Option<Duration>) -> Result<Self, TransportError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            default_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Error = TransportError;

    async fn send(&self, backend: &Backend, request: &Request) -> Result<Response, TransportError> {
        let method = Method::from_bytes(request.method().as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method().to_string()))?;
        let url = backend_url(&backend.base_url, request.path())?;

        let mut builder = self.client.request(method, url).query(request.params());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }
        if let Some(timeout) = request.timeout().or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status_code = response.status().as_u16();
        // Non-UTF-8 header values are dropped.
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status_code,
            body,
            headers,
        })
    }
}

/// In-memory transport that answers every request with the same response.
///
/// Each call is recorded so tests can check where requests were routed.
#[derive(Debug, Default)]
pub struct StubTransport {
    response: Response,
    calls: Mutex<Vec<(Backend, Request)>>,
}

impl StubTransport {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Backend, Request)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the backends hit so far, in call order.
    pub fn routed_to(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(backend, _)| backend.name.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for StubTransport {
    type Error = Infallible;

    async fn send(&self, backend: &Backend, request: &Request) -> Result<Response, Infallible> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((backend.clone(), request.clone()));
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::RequestOptions;

    #[tokio::test]
    async fn test_stub_returns_canned_response() {
        let canned = Response::new(201).with_body("ok").with_header("x-stub", "1");
        let stub = StubTransport::new(canned.clone());
        let backend = Backend::parse("a", "http://127.0.0.1:9001").unwrap();

        let request = Request::new("GET", "/x", RequestOptions::default());
        let response = stub.send(&backend, &request).await.unwrap();

        assert_eq!(response, canned);
        assert_eq!(stub.routed_to(), vec!["a".to_string()]);
        assert_eq!(stub.calls()[0].1.id(), request.id());
    }

    #[tokio::test]
    async fn test_default_stub_answers_200() {
        let stub = StubTransport::default();
        let backend = Backend::parse("a", "http://127.0.0.1:9001").unwrap();
        let response = stub
            .send(&backend, &Request::new("DELETE", "/", RequestOptions::default()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert!(response.body.is_empty());
        assert!(response.headers.is_empty());
    }

    #[tokio::test]
    async fn test_http_transport_rejects_bad_method() {
        let transport = HttpTransport::new(None).unwrap();
        let backend = Backend::parse("a", "http://127.0.0.1:9001").unwrap();
        let request = Request::new("NOT A METHOD", "/", RequestOptions::default());

        let err = transport.send(&backend, &request).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn test_http_transport_forwards_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/items")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .match_header("x-client", "abc")
            .match_body("payload")
            .with_status(201)
            .with_header("x-backend", "a")
            .with_body("created")
            .create_async()
            .await;

        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let backend = Backend::parse("a", &server.url()).unwrap();
        let request = Request::new(
            "POST",
            "/items",
            RequestOptions::new()
                .header("x-client", "abc")
                .param("page", "2")
                .body("payload"),
        );

        let response = transport.send(&backend, &request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, b"created".to_vec());
        assert_eq!(response.headers.get("x-backend").map(String::as_str), Some("a"));
    }

    #[tokio::test]
    async fn test_http_transport_unreachable_backend() {
        let transport = HttpTransport::new(Some(Duration::from_millis(500))).unwrap();
        // Port 1 on localhost is not expected to accept connections.
        let backend = Backend::parse("down", "http://127.0.0.1:1").unwrap();
        let request = Request::new("GET", "/", RequestOptions::default());

        let err = transport.send(&backend, &request).await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[test]
    fn test_backend_url_keeps_base_path_prefix() {
        let base = Url::parse("http://backend.internal:8080/api").unwrap();
        assert_eq!(
            backend_url(&base, "/items/1").unwrap().as_str(),
            "http://backend.internal:8080/api/items/1"
        );

        let slashed = Url::parse("http://backend.internal:8080/api/").unwrap();
        assert_eq!(
            backend_url(&slashed, "/items").unwrap().as_str(),
            "http://backend.internal:8080/api/items"
        );

        let root = Url::parse("http://backend.internal:8080").unwrap();
        assert_eq!(backend_url(&root, "/").unwrap().as_str(), "http://backend.internal:8080/");
    }

    #[test]
    fn test_backend_url_never_changes_authority() {
        let base = Url::parse("http://backend.internal:8080/api").unwrap();

        for path in [
            "//other.internal:9000/x",
            "http://other.internal/x",
            "other.internal/x",
            "",
            "/x?debug=1",
            "/x#frag",
            "/\\other.internal/x",
            "/../x",
            "/%2e%2e/x",
        ] {
            assert!(
                matches!(backend_url(&base, path), Err(TransportError::InvalidPath(_))),
                "{:?} was accepted",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_request_stays_on_selected_backend() {
        let mut selected = mockito::Server::new_async().await;
        let mut other = mockito::Server::new_async().await;
        let selected_mock = selected.mock("GET", mockito::Matcher::Any).expect(0).create_async().await;
        let other_mock = other
            .mock("GET", mockito::Matcher::Any)
            .with_body("other host")
            .expect(0)
            .create_async()
            .await;

        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let backend = Backend::parse("a", &selected.url()).unwrap();

        for path in [
            format!("//{}/x", other.host_with_port()),
            format!("{}/x", other.url()),
        ] {
            let request = Request::new("GET", path, RequestOptions::default());
            let err = transport.send(&backend, &request).await.unwrap_err();
            assert!(matches!(err, TransportError::InvalidPath(_)));
        }

        selected_mock.assert_async().await;
        other_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_transport_sends_under_base_path() {
        let mut server = mockito::Server::new_async().await;
        let prefixed = server
            .mock("GET", "/api/items")
            .with_body("prefixed")
            .create_async()
            .await;
        let bare = server.mock("GET", "/items").expect(0).create_async().await;

        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let backend = Backend::parse("a", &format!("{}/api", server.url())).unwrap();
        let request = Request::new("GET", "/items", RequestOptions::default());

        let response = transport.send(&backend, &request).await.unwrap();

        assert_eq!(response.body, b"prefixed".to_vec());
        prefixed.assert_async().await;
        bare.assert_async().await;
    }

    /// Accepts connections and never answers.
    async fn silent_backend() -> Backend {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        Backend::parse("silent", &format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_request_timeout_overrides_default() {
        let backend = silent_backend().await;
        let transport = HttpTransport::new(Some(Duration::from_secs(60))).unwrap();
        let request = Request::new(
            "GET",
            "/",
            RequestOptions::new().timeout(Duration::from_millis(200)),
        );

        let started = std::time::Instant::now();
        let err = transport.send(&backend, &request).await.unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {}", err);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_default_timeout_bounds_call() {
        let backend = silent_backend().await;
        let transport = HttpTransport::new(Some(Duration::from_millis(200))).unwrap();
        let request = Request::new("GET", "/", RequestOptions::default());

        let err = transport.send(&backend, &request).await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_connection_failure_is_not_a_timeout() {
        let transport = HttpTransport::new(Some(Duration::from_secs(5))).unwrap();
        let backend = Backend::parse("down", "http://127.0.0.1:1").unwrap();
        let request = Request::new("GET", "/", RequestOptions::default());

        let err = transport.send(&backend, &request).await.unwrap_err();
        assert!(!err.is_timeout());
        assert!(!TransportError::InvalidPath("x".into()).is_timeout());
    }
}
