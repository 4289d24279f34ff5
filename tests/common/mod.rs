// Shared fixtures for the integration suites
#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{body::Body, response::Response};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use edge_gateway::{
    core::{AuthFilter, GatewayPipeline, Identity, RequestContext, RouteClass, RouteClassifier},
    ports::{
        admission::{AdmissionController, AdmissionSnapshot, RateLimitLease, RateLimiterError},
        dispatcher::{DispatchError, DispatchResult, Dispatcher},
        http_client::{HttpClient, HttpClientResult},
    },
};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

/// Unsigned compact JWT carrying `claims`.
pub fn token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterMode {
    Grant,
    Deny,
    Fault,
    Hang,
}

/// Admission controller with a fixed answer that counts its calls.
pub struct ScriptedLimiter {
    mode: LimiterMode,
    calls: AtomicUsize,
}

impl ScriptedLimiter {
    pub fn new(mode: LimiterMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdmissionController for ScriptedLimiter {
    async fn try_acquire(&self) -> Result<RateLimitLease, RateLimiterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            LimiterMode::Grant => Ok(RateLimitLease::granted()),
            LimiterMode::Deny => Ok(RateLimitLease::denied()),
            LimiterMode::Fault => Err(RateLimiterError::Poisoned),
            LimiterMode::Hang => std::future::pending().await,
        }
    }

    fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            available_tokens: 0,
            queued: 0,
            token_limit: 100,
            tokens_per_period: 100,
            replenishment_period_secs: 60,
            queue_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchBehavior {
    Respond,
    NoRoute,
    Unavailable,
    Timeout,
    Internal,
    Panic,
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub correlation_id: String,
    pub route_class: Option<RouteClass>,
    pub identity: Option<Identity>,
}

/// Dispatcher stub recording what reached it.
pub struct RecordingDispatcher {
    behavior: DispatchBehavior,
    seen: Mutex<Vec<SeenRequest>>,
}

impl RecordingDispatcher {
    pub fn new(behavior: DispatchBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn forward(&self, req: Request<Body>, ctx: &RequestContext) -> DispatchResult<Response> {
        self.seen.lock().unwrap().push(SeenRequest {
            path: req.uri().path().to_string(),
            correlation_id: ctx.correlation_id().to_string(),
            route_class: ctx.route_class(),
            identity: ctx.identity().cloned(),
        });
        match self.behavior {
            DispatchBehavior::Respond => Ok(Response::new(Body::from("upstream"))),
            DispatchBehavior::NoRoute => Err(DispatchError::NoRoute(ctx.path().to_string())),
            DispatchBehavior::Unavailable => {
                Err(DispatchError::Unavailable("connection refused".into()))
            }
            DispatchBehavior::Timeout => Err(DispatchError::Timeout(30)),
            DispatchBehavior::Internal => Err(DispatchError::Internal("bad upstream uri".into())),
            DispatchBehavior::Panic => panic!("dispatcher exploded"),
        }
    }
}

pub fn pipeline(
    limiter: Arc<dyn AdmissionController>,
    dispatcher: Arc<dyn Dispatcher>,
) -> GatewayPipeline {
    GatewayPipeline::new(
        RouteClassifier::default(),
        AuthFilter::default(),
        limiter,
        dispatcher,
        60,
    )
}

/// Upstream HTTP client stub capturing the outgoing requests.
#[derive(Default)]
pub struct CapturingClient {
    seen: Mutex<Vec<Request<()>>>,
}

impl CapturingClient {
    pub fn seen(&self) -> Vec<Request<()>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|req| {
                let mut copy = Request::builder()
                    .method(req.method().clone())
                    .uri(req.uri().clone())
                    .body(())
                    .unwrap();
                *copy.headers_mut() = req.headers().clone();
                copy
            })
            .collect()
    }
}

#[async_trait]
impl HttpClient for CapturingClient {
    async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response> {
        let (parts, _) = req.into_parts();
        self.seen.lock().unwrap().push(Request::from_parts(parts, ()));
        let mut response = Response::new(Body::from("from upstream"));
        *response.status_mut() = StatusCode::OK;
        Ok(response)
    }
}

/// In-memory sink for JSON log lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Events whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["fields"]["message"] == message)
            .collect()
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
