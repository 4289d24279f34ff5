//! The ordered request pipeline.
//!
//! ```text
//! RequestLogger -> classify -> AuthFilter -> RateLimiter -> Dispatcher
//! ```
//!
//! A rejected credential short-circuits before the limiter is consulted, and a
//! denied lease short-circuits before the dispatcher. The logger always sees
//! the outcome, including panics raised further in.
use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use http::{HeaderValue, Request, StatusCode, header};
use tracing::Instrument;

use crate::{
    config::models::ServerConfig,
    core::{
        auth::AuthFilter,
        context::RequestContext,
        error::GatewayError,
        request_logger::RequestLogger,
        route_class::{RouteClass, RouteClassifier, is_health_path},
    },
    metrics,
    ports::{admission::AdmissionController, dispatcher::Dispatcher},
};

pub const RATE_LIMITED_BODY: &str = "Rate limit exceeded. Please try again later.";

/// Log target for requests admitted because the limiter failed.
pub const FAIL_OPEN_TARGET: &str = "gateway::fail_open";

pub struct GatewayPipeline {
    classifier: RouteClassifier,
    auth: AuthFilter,
    limiter: Arc<dyn AdmissionController>,
    dispatcher: Arc<dyn Dispatcher>,
    retry_after_secs: u64,
}

impl GatewayPipeline {
    pub fn new(
        classifier: RouteClassifier,
        auth: AuthFilter,
        limiter: Arc<dyn AdmissionController>,
        dispatcher: Arc<dyn Dispatcher>,
        retry_after_secs: u64,
    ) -> Self {
        Self {
            classifier,
            auth,
            limiter,
            dispatcher,
            retry_after_secs,
        }
    }

    /// Assemble the pipeline from a validated configuration.
    pub fn from_config(
        config: &ServerConfig,
        limiter: Arc<dyn AdmissionController>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let retry_after_secs = config.rate_limit.retry_after_secs.unwrap_or_else(|| {
            config
                .rate_limit
                .period()
                .map(retry_hint_secs)
                .unwrap_or(60)
        });
        Self::new(
            RouteClassifier::from_config(&config.classification),
            AuthFilter::new(config.auth.detailed_errors),
            limiter,
            dispatcher,
            retry_after_secs,
        )
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs
    }

    /// Run one request through every stage. Never fails: every outcome,
    /// including internal faults, becomes a response carrying `X-Request-Id`.
    pub async fn handle(&self, req: Request<Body>, remote_addr: Option<SocketAddr>) -> Response {
        let mut ctx = RequestContext::new(&req, remote_addr);
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let logger = RequestLogger::start(&ctx, user_agent.as_deref());
        let span = logger.span().clone();

        let outcome = AssertUnwindSafe(self.process(req, &mut ctx))
            .catch_unwind()
            .instrument(span)
            .await;

        match outcome {
            Ok(Ok(response)) => logger.finish(&ctx, response),
            Ok(Err(err)) if err.is_fault() => logger.fail(&ctx, &err),
            Ok(Err(err)) => {
                let response = self.rejection_response(err);
                logger.finish(&ctx, response)
            }
            Err(panic) => {
                let err = GatewayError::PipelineFault(panic_message(panic.as_ref()));
                logger.fail(&ctx, &err)
            }
        }
    }

    async fn process(
        &self,
        req: Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Response, GatewayError> {
        let class = self.classifier.classify(ctx.path());
        ctx.set_route_class(class);

        if let Err(rejection) = self.auth.authorize(class, req.headers(), ctx) {
            metrics::increment_auth_rejection(rejection.code());
            return Err(rejection.into());
        }

        if class.is_rate_limited() && !is_health_path(ctx.path()) {
            self.admit(class, ctx).await?;
        }

        self.dispatcher
            .forward(req, ctx)
            .await
            .map_err(GatewayError::from)
    }

    async fn admit(&self, class: RouteClass, ctx: &RequestContext) -> Result<(), GatewayError> {
        match self.limiter.try_acquire().await {
            Ok(lease) if lease.acquired => Ok(()),
            Ok(_) => {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id(),
                    path = %ctx.path(),
                    client_ip = ctx.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
                    "Rate limit exceeded"
                );
                metrics::increment_rate_limited(class.as_str());
                Err(GatewayError::RateLimitExceeded {
                    retry_after_secs: self.retry_after_secs,
                })
            }
            Err(e) => {
                tracing::error!(
                    target: FAIL_OPEN_TARGET,
                    correlation_id = %ctx.correlation_id(),
                    path = %ctx.path(),
                    error = %e,
                    "Rate limiter failed, admitting request"
                );
                metrics::increment_rate_limiter_fail_open();
                Ok(())
            }
        }
    }

    fn rejection_response(&self, err: GatewayError) -> Response {
        match err {
            GatewayError::Unauthorized(rejection) => {
                rejection.to_response(self.auth.detailed_errors())
            }
            GatewayError::RateLimitExceeded { retry_after_secs } => {
                rate_limited_response(retry_after_secs)
            }
            GatewayError::Dispatch(err) => {
                let status = err.status_code();
                tracing::warn!(status = status.as_u16(), "Dispatch failed: {}", err);
                (
                    status,
                    Body::from(status.canonical_reason().unwrap_or("Upstream Error")),
                )
                    .into_response()
            }
            GatewayError::PipelineFault(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// 429 with the retry hint.
pub fn rate_limited_response(retry_after_secs: u64) -> Response {
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Body::from(RATE_LIMITED_BODY)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

/// Replenishment period rounded up to whole seconds, at least one.
pub fn retry_hint_secs(period: Duration) -> u64 {
    let secs = period.as_secs() + u64::from(period.subsec_nanos() > 0);
    secs.max(1)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
