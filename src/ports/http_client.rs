use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

use crate::ports::dispatcher::DispatchError;

/// Custom error type for upstream HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<HttpClientError> for DispatchError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::ConnectionError(msg) => DispatchError::Unavailable(msg),
            HttpClientError::Timeout(secs) => DispatchError::Timeout(secs),
            HttpClientError::InvalidRequest(msg) => DispatchError::Internal(msg),
        }
    }
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to upstreams
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to an upstream service
    ///
    /// # Arguments
    /// * `req` - The fully rewritten request, with an absolute URI
    ///
    /// # Returns
    /// A future that resolves to the upstream's response or an error
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
