use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, StatusCode};
use thiserror::Error;

use crate::core::context::RequestContext;

/// Why a request that passed every gate could not be answered.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// No upstream route matches the request path
    #[error("No route configured for path: {0}")]
    NoRoute(String),

    /// The upstream could not be reached or returned an unusable response
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream did not answer in time
    #[error("Upstream timed out after {0} seconds")]
    Timeout(u64),

    /// The request could not be forwarded at all
    #[error("Internal dispatch error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Status code returned to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NoRoute(_) => StatusCode::NOT_FOUND,
            DispatchError::Unavailable(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatcher defines the port for whatever ultimately answers an admitted
/// request: an upstream service or a locally served endpoint
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Forward an admitted request
    ///
    /// # Arguments
    /// * `req` - The request as received from the client
    /// * `ctx` - Correlation id, route class and identity of the caller
    ///
    /// # Returns
    /// The response to relay to the client, or why none could be produced
    async fn forward(
        &self,
        req: Request<AxumBody>,
        ctx: &RequestContext,
    ) -> DispatchResult<Response<AxumBody>>;
}
