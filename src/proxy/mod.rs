// src/proxy/mod.rs
mod backend;
mod request;
mod transport;

pub use backend::Backend;
pub use request::{Request, RequestOptions, Response};
pub use transport::{HttpTransport, StubTransport, Transport, TransportError};
