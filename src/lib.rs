//! Edge gateway - the request pipeline in front of a set of backend services.
//!
//! Every inbound request passes through an ordered chain of cross-cutting
//! stages before it is proxied to an upstream:
//!
//! 1. **Request logging**: correlation id, start / end / error events, and an
//!    `X-Request-Id` on every response.
//! 2. **Route classification**: `public`, `auth_exempt` or `protected`, a pure
//!    function of the path prefix.
//! 3. **Bearer authentication** for protected routes: the JWT claim set is
//!    decoded (not verified) to derive the caller's identity.
//! 4. **Admission control**: one process-wide token bucket with a bounded
//!    oldest-first wait queue. Limiter faults fail open.
//! 5. **Dispatch**: built-in status endpoints, otherwise a longest-prefix
//!    reverse proxy.
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping request semantics inside `core`. Configuration lives in
//! `config`; `tracing_setup` and `metrics` hold the observability plumbing.
//!
//! # Quick Example
//! ```no_run
//! use edge_gateway::{adapters, config::loader::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config("config.toml").await?;
//! let pipeline = adapters::build_pipeline(&config)?;
//! let app = adapters::build_router(pipeline);
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Fallible setup APIs return `eyre::Result<T>` with `WrapErr` context; request
//! stages use the domain error enums in `core` and `ports`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, ProxyDispatcher},
    core::{GatewayPipeline, TokenBucketLimiter},
    ports::{admission::AdmissionController, dispatcher::Dispatcher, http_client::HttpClient},
    utils::GracefulShutdown,
};
