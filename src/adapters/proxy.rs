use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{HeaderMap, HeaderName, HeaderValue, Uri, header};
use hyper::{Request, Response};
use tracing::Instrument;

use crate::{
    core::{
        context::{REQUEST_ID_HEADER, RequestContext},
        router::UpstreamRouter,
    },
    ports::{
        dispatcher::{DispatchError, DispatchResult, Dispatcher},
        http_client::HttpClient,
    },
    tracing_setup::create_upstream_span,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const FORWARDED_FOR: &str = "x-forwarded-for";
const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// Connection-scoped headers that must not travel past this hop.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Forwards admitted requests to the upstream owning the longest matching
/// route prefix.
pub struct ProxyDispatcher {
    router: UpstreamRouter,
    client: Arc<dyn HttpClient>,
}

impl ProxyDispatcher {
    pub fn new(router: UpstreamRouter, client: Arc<dyn HttpClient>) -> Self {
        Self { router, client }
    }

    pub fn router(&self) -> &UpstreamRouter {
        &self.router
    }
}

#[async_trait]
impl Dispatcher for ProxyDispatcher {
    async fn forward(
        &self,
        mut req: Request<AxumBody>,
        ctx: &RequestContext,
    ) -> DispatchResult<Response<AxumBody>> {
        let path = req.uri().path().to_string();
        let route = self
            .router
            .find_matching_route(&path)
            .ok_or_else(|| DispatchError::NoRoute(path.clone()))?;

        let upstream = route.upstream_uri(&path, req.uri().query());
        let uri: Uri = upstream
            .parse()
            .map_err(|e| DispatchError::Internal(format!("Invalid upstream URI {upstream}: {e}")))?;

        let original_host = req
            .headers()
            .get(header::HOST)
            .cloned()
            .or_else(|| req.uri().authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()));
        *req.uri_mut() = uri;
        prepare_upstream_headers(req.headers_mut(), ctx, original_host)?;

        let span = create_upstream_span(&route.target, req.method().as_str(), &path);
        span.in_scope(|| {
            tracing::debug!(
                correlation_id = %ctx.correlation_id(),
                route = %route.prefix,
                upstream_host = route.target_host().as_deref().unwrap_or(""),
                upstream_uri = %req.uri(),
                "Forwarding request upstream"
            );
        });
        let started = std::time::Instant::now();
        let result = self.client.send_request(req).instrument(span.clone()).await;

        span.record("duration_ms", started.elapsed().as_millis() as u64);
        match result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());
                Ok(response)
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                Err(e.into())
            }
        }
    }
}

/// Rewrite inbound headers for the upstream hop.
fn prepare_upstream_headers(
    headers: &mut HeaderMap,
    ctx: &RequestContext,
    original_host: Option<HeaderValue>,
) -> DispatchResult<()> {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    // Identity headers are only ever set by the gateway.
    for name in [USER_ID_HEADER, USER_EMAIL_HEADER, USER_ROLE_HEADER] {
        headers.remove(name);
    }

    if let Some(ip) = ctx.remote_addr().map(|a| a.ip().to_string()) {
        let chain = match headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
            _ => ip,
        };
        headers.insert(FORWARDED_FOR, header_value(&chain)?);
    }
    if !headers.contains_key(FORWARDED_PROTO) {
        headers.insert(FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if let Some(host) = original_host {
        headers.insert(FORWARDED_HOST, host);
    }
    headers.insert(REQUEST_ID_HEADER, header_value(ctx.correlation_id())?);

    if let Some(identity) = ctx.identity() {
        headers.insert(USER_ID_HEADER, header_value(&identity.subject_id)?);
        if let Some(email) = &identity.email {
            headers.insert(USER_EMAIL_HEADER, header_value(email)?);
        }
        if let Some(role) = &identity.role {
            headers.insert(USER_ROLE_HEADER, header_value(role)?);
        }
    }
    Ok(())
}

fn header_value(value: &str) -> DispatchResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| DispatchError::Internal(format!("Invalid header value {value:?}: {e}")))
}
