pub mod auth;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod rate_limiter;
pub mod request_logger;
pub mod route_class;
pub mod router;

pub use auth::{AuthFilter, AuthRejection};
pub use context::{Identity, RequestContext};
pub use error::GatewayError;
pub use pipeline::GatewayPipeline;
pub use rate_limiter::TokenBucketLimiter;
pub use route_class::{RouteClass, RouteClassifier};
pub use router::UpstreamRouter;
