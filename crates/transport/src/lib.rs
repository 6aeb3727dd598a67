//! Network transport primitive for chunk uploads.
//!
//! One [`Request`] is one network exchange with optional upload/download
//! progress callbacks, a per-request timeout and a shared cancellation token.
//! [`HttpTransport`] implements [`Transport`] on top of `reqwest`; the
//! orchestrator only sees the trait, so tests can swap in a mock.

pub mod error;
pub mod http;
pub mod multipart;
pub mod request;

#[cfg(test)]
mod test_server;

use std::future::Future;
use std::pin::Pin;

pub use error::TransportError;
pub use http::HttpTransport;
pub use multipart::{Field, MultipartPayload};
pub use request::{Method, Progress, ProgressCallback, Request, RequestBody, Response};

/// Abstract network exchange.
///
/// Implementations must honour `request.cancel` (fail with
/// [`TransportError::Cancelled`] before sending if already triggered, abort
/// if triggered mid-flight) and `request.timeout`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + '_>>;
}
