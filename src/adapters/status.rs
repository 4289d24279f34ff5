//! Built-in read-only endpoints answered by the gateway itself.
use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use axum::{
    Json,
    body::Body as AxumBody,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use http::{Method, Request, StatusCode};
use serde_json::json;

use crate::{
    config::models::{AuthConfig, ServerConfig},
    core::{
        context::RequestContext,
        route_class::{HEALTH_PATH, RouteClass},
        router::UpstreamRoute,
    },
    ports::{
        admission::AdmissionController,
        dispatcher::{DispatchResult, Dispatcher},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalEndpoint {
    Root,
    Health,
    Status,
    StatusHealth,
    StatusRoutes,
}

impl LocalEndpoint {
    fn resolve(method: &Method, path: &str) -> Option<Self> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        [
            ("/", LocalEndpoint::Root),
            (HEALTH_PATH, LocalEndpoint::Health),
            ("/status", LocalEndpoint::Status),
            ("/status/health", LocalEndpoint::StatusHealth),
            ("/status/routes", LocalEndpoint::StatusRoutes),
        ]
        .into_iter()
        .find(|(p, _)| p.eq_ignore_ascii_case(path))
        .map(|(_, endpoint)| endpoint)
    }
}

/// Service identity, uptime, auth summary, limiter state and route map.
pub struct StatusEndpoints {
    service_name: String,
    environment: String,
    started_at: DateTime<Utc>,
    started: Instant,
    auth: AuthConfig,
    limiter: Arc<dyn AdmissionController>,
    routes: Vec<UpstreamRoute>,
    classification: Vec<(String, RouteClass)>,
}

impl StatusEndpoints {
    pub fn new(
        config: &ServerConfig,
        limiter: Arc<dyn AdmissionController>,
        routes: Vec<UpstreamRoute>,
    ) -> Self {
        Self {
            service_name: config.service_name.clone(),
            environment: config.environment.clone(),
            started_at: Utc::now(),
            started: Instant::now(),
            auth: config.auth.clone(),
            limiter,
            routes,
            classification: config.classification.rules(),
        }
    }

    /// Answer `req` if it targets one of the built-in endpoints.
    pub fn respond(&self, method: &Method, path: &str) -> Option<Response> {
        let endpoint = LocalEndpoint::resolve(method, path)?;
        tracing::debug!(?endpoint, "Serving local endpoint");
        Some(match endpoint {
            LocalEndpoint::Root => Json(json!({
                "service": self.service_name,
                "version": env!("CARGO_PKG_VERSION"),
                "status": "Running",
                "environment": self.environment,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .into_response(),
            LocalEndpoint::Health => (StatusCode::OK, "Healthy").into_response(),
            LocalEndpoint::Status => self.status(),
            LocalEndpoint::StatusHealth => Json(json!({
                "status": "Healthy",
                "timestamp": Utc::now().to_rfc3339(),
                "checks": {
                    "rate_limiter": self.limiter.snapshot(),
                    "upstream_routes": self.routes.len(),
                },
            }))
            .into_response(),
            LocalEndpoint::StatusRoutes => self.route_map(),
        })
    }

    fn status(&self) -> Response {
        let uptime = self.started.elapsed();
        tracing::info!(
            service = %self.service_name,
            version = env!("CARGO_PKG_VERSION"),
            "Status requested"
        );
        Json(json!({
            "service": self.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "status": "Running",
            "environment": self.environment,
            "timestamp": Utc::now().to_rfc3339(),
            "started_at": self.started_at.to_rfc3339(),
            "uptime_secs": uptime.as_secs(),
            "uptime": humantime::format_duration(std::time::Duration::from_secs(uptime.as_secs())).to_string(),
            "machine_name": std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            "process_id": std::process::id(),
            "configuration": {
                "jwt_issuer": self.auth.issuer,
                "jwt_audience": self.auth.audience,
                "has_jwt_key": self.auth.signing_key.as_deref().is_some_and(|k| !k.is_empty()),
            },
            "rate_limiter": self.limiter.snapshot(),
        }))
        .into_response()
    }

    fn route_map(&self) -> Response {
        let classification: Vec<_> = self
            .classification
            .iter()
            .map(|(prefix, class)| json!({ "prefix": prefix, "class": class }))
            .collect();
        Json(json!({
            "gateway": {
                "root": "/",
                "health": HEALTH_PATH,
                "status": "/status",
                "status_health": "/status/health",
                "routes": "/status/routes",
            },
            "upstreams": self.routes,
            "classification": classification,
        }))
        .into_response()
    }
}

/// Serves the built-in endpoints locally and sends everything else upstream.
pub struct GatewayDispatcher {
    status: StatusEndpoints,
    upstream: Arc<dyn Dispatcher>,
}

impl GatewayDispatcher {
    pub fn new(status: StatusEndpoints, upstream: Arc<dyn Dispatcher>) -> Self {
        Self { status, upstream }
    }
}

#[async_trait]
impl Dispatcher for GatewayDispatcher {
    async fn forward(
        &self,
        req: Request<AxumBody>,
        ctx: &RequestContext,
    ) -> DispatchResult<Response<AxumBody>> {
        if let Some(response) = self.status.respond(req.method(), ctx.path()) {
            return Ok(response);
        }
        self.upstream.forward(req, ctx).await
    }
}
