//! Per-request correlation state.
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use http::{Method, Request};

use crate::core::route_class::RouteClass;

/// Response / upstream header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticated principal derived from bearer token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// State owned by a single request for its whole lifetime.
///
/// `identity` can only be attached from within `core` (by the auth filter);
/// everything else is fixed at construction or set once by the pipeline.
#[derive(Debug)]
pub struct RequestContext {
    correlation_id: String,
    method: Method,
    path: String,
    remote_addr: Option<SocketAddr>,
    started: Instant,
    route_class: Option<RouteClass>,
    identity: Option<Identity>,
}

impl RequestContext {
    pub fn new<B>(req: &Request<B>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            correlation_id: new_correlation_id(),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            remote_addr,
            started: Instant::now(),
            route_class: None,
            identity: None,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn route_class(&self) -> Option<RouteClass> {
        self.route_class
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub(in crate::core) fn set_route_class(&mut self, class: RouteClass) {
        self.route_class = Some(class);
    }

    pub(in crate::core) fn attach_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }
}

/// 128 random bits rendered as 32 hex characters.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
