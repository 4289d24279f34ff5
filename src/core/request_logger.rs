//! Start / end / error / cancellation events for every request.
//!
//! A [`RequestLogger`] is created as soon as the request enters the pipeline
//! and must be consumed with [`RequestLogger::finish`] or
//! [`RequestLogger::fail`]. If it is dropped instead (the client went away and
//! the request future was cancelled) a single "Request cancelled" event is
//! emitted, so every request produces exactly one terminal event.
use std::time::Instant;

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use tracing::Span;

use crate::{
    core::{
        context::{REQUEST_ID_HEADER, RequestContext},
        error::GatewayError,
    },
    metrics,
    tracing_setup::create_request_span,
};

/// Status recorded for requests abandoned by the client.
const CLIENT_CLOSED_REQUEST: u16 = 499;

pub struct RequestLogger {
    span: Span,
    correlation_id: String,
    method: Method,
    path: String,
    started: Instant,
    completed: bool,
}

impl RequestLogger {
    /// Open the request span and emit the start event.
    pub fn start(ctx: &RequestContext, user_agent: Option<&str>) -> Self {
        let span = create_request_span(ctx.method().as_str(), ctx.path(), ctx.correlation_id());
        span.in_scope(|| {
            tracing::info!(
                correlation_id = %ctx.correlation_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                remote_addr = ctx.remote_addr().map(|a| a.to_string()).unwrap_or_default(),
                user_agent = user_agent.unwrap_or(""),
                "Request started"
            );
        });

        Self {
            span,
            correlation_id: ctx.correlation_id().to_string(),
            method: ctx.method().clone(),
            path: ctx.path().to_string(),
            started: ctx.started(),
            completed: false,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Stamp the correlation id on a completed response and emit the end event.
    pub fn finish(mut self, ctx: &RequestContext, mut response: Response) -> Response {
        self.completed = true;
        let elapsed = ctx.elapsed();
        let status = response.status();
        let route_class = ctx.route_class().map(|c| c.as_str()).unwrap_or("unclassified");
        stamp_request_id(&mut response, &self.correlation_id);

        self.span.record("http.status_code", status.as_u16());
        self.span.record("route.class", route_class);
        self.span.record("duration_ms", elapsed.as_millis() as u64);
        self.span.in_scope(|| {
            tracing::info!(
                correlation_id = %self.correlation_id,
                path = %self.path,
                status = status.as_u16(),
                route_class,
                duration_ms = elapsed.as_millis() as u64,
                "Request completed"
            );
        });

        metrics::record_request(self.method.as_str(), status.as_u16(), route_class, elapsed);
        response
    }

    /// Emit the error event for a gateway fault and produce the generic 500.
    pub fn fail(mut self, ctx: &RequestContext, error: &GatewayError) -> Response {
        self.completed = true;
        let elapsed = ctx.elapsed();
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let route_class = ctx.route_class().map(|c| c.as_str()).unwrap_or("unclassified");

        self.span.record("http.status_code", status.as_u16());
        self.span.record("duration_ms", elapsed.as_millis() as u64);
        self.span.in_scope(|| {
            tracing::error!(
                correlation_id = %self.correlation_id,
                path = %self.path,
                duration_ms = elapsed.as_millis() as u64,
                error = %error,
                "Request failed"
            );
        });

        let mut response = (status, Body::from("Internal Server Error")).into_response();
        stamp_request_id(&mut response, &self.correlation_id);
        metrics::record_request(self.method.as_str(), status.as_u16(), route_class, elapsed);
        response
    }
}

impl Drop for RequestLogger {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let elapsed = self.started.elapsed();
        self.span.in_scope(|| {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                path = %self.path,
                duration_ms = elapsed.as_millis() as u64,
                "Request cancelled"
            );
        });
        metrics::record_request(
            self.method.as_str(),
            CLIENT_CLOSED_REQUEST,
            "unclassified",
            elapsed,
        );
    }
}

fn stamp_request_id(response: &mut Response, correlation_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}
