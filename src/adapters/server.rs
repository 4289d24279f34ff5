//! Wiring of the pipeline into an Axum application.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{ConnectInfo, Request, State},
    middleware,
    response::Response,
};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::{
    adapters::{
        http_client::HttpClientAdapter,
        middleware::cors_middleware,
        proxy::ProxyDispatcher,
        status::{GatewayDispatcher, StatusEndpoints},
    },
    config::models::ServerConfig,
    core::{pipeline::GatewayPipeline, rate_limiter::TokenBucketLimiter, router::UpstreamRouter},
    ports::{admission::AdmissionController, dispatcher::Dispatcher, http_client::HttpClient},
    utils::graceful_shutdown::GracefulShutdown,
};

/// Build the full pipeline (limiter, upstream client, dispatchers) from a
/// validated configuration. Must run inside a Tokio runtime.
pub fn build_pipeline(config: &ServerConfig) -> Result<Arc<GatewayPipeline>> {
    let limiter: Arc<dyn AdmissionController> = TokenBucketLimiter::from_config(&config.rate_limit)
        .wrap_err("Failed to create rate limiter")?;
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(Duration::from_secs(config.dispatch.timeout_secs))
            .wrap_err("Failed to create HTTP client adapter")?,
    );
    Ok(Arc::new(build_pipeline_with(config, limiter, http_client)))
}

/// Same as [`build_pipeline`] with the limiter and upstream client supplied.
pub fn build_pipeline_with(
    config: &ServerConfig,
    limiter: Arc<dyn AdmissionController>,
    http_client: Arc<dyn HttpClient>,
) -> GatewayPipeline {
    let router = UpstreamRouter::from_config(&config.routes);
    for route in router.routes() {
        tracing::info!(
            prefix = %route.prefix,
            target = %route.target,
            path_rewrite = route.path_rewrite.as_deref().unwrap_or(""),
            "Configured upstream route"
        );
    }

    let status = StatusEndpoints::new(config, limiter.clone(), router.routes().to_vec());
    let proxy: Arc<dyn Dispatcher> = Arc::new(ProxyDispatcher::new(router, http_client));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(GatewayDispatcher::new(status, proxy));

    GatewayPipeline::from_config(config, limiter, dispatcher)
}

/// Axum router sending every request through the pipeline.
pub fn build_router(pipeline: Arc<GatewayPipeline>) -> Router {
    Router::new()
        .fallback(gateway_handler)
        .layer(middleware::from_fn(cors_middleware))
        .layer(CompressionLayer::new())
        .with_state(pipeline)
}

async fn gateway_handler(State(pipeline): State<Arc<GatewayPipeline>>, req: Request) -> Response {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    pipeline.handle(req, remote_addr).await
}

/// Serve until shutdown is signalled, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: Arc<GracefulShutdown>,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .wrap_err("Failed to get local address")?;
    tracing::info!("Edge gateway listening on {}", local_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown.wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
    })
    .await
    .wrap_err("Server error")
}
