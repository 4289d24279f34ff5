pub mod http_client;
pub mod middleware;
pub mod proxy;
pub mod server;
pub mod status;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use middleware::cors_middleware;
pub use proxy::ProxyDispatcher;
pub use server::{build_pipeline, build_router, serve};
pub use status::{GatewayDispatcher, StatusEndpoints};
