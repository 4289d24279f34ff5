use http::StatusCode;
use thiserror::Error;

use crate::{core::auth::AuthRejection, ports::dispatcher::DispatchError};

/// Everything that can stop a request short of a normal upstream response.
///
/// Only [`GatewayError::PipelineFault`] is a failure of the gateway itself;
/// the other variants are expected outcomes that become ordinary responses.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthRejection),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Dispatch failed: {0}")]
    Dispatch(DispatchError),

    #[error("Pipeline fault: {0}")]
    PipelineFault(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Dispatch(err) => err.status_code(),
            GatewayError::PipelineFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the request failed because of the gateway rather than the
    /// caller or an upstream.
    pub fn is_fault(&self) -> bool {
        matches!(self, GatewayError::PipelineFault(_))
    }
}

impl From<DispatchError> for GatewayError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Internal(msg) => GatewayError::PipelineFault(msg),
            other => GatewayError::Dispatch(other),
        }
    }
}
