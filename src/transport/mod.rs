//! HTTP transport to the governance service.

mod http;

pub use http::{HttpTransport, TransportError, TransportErrorKind};
