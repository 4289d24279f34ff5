//! Gateway metrics on top of the OpenTelemetry metrics API.
//!
//! Instruments are created lazily from the global meter, so [`init_metrics`]
//! must run before the first request is recorded if an exporter is wanted.
//! Without an OTLP endpoint the global no-op provider stays in place and every
//! recording call is effectively free.
//!
//! Provided metrics:
//! * `gateway_requests_total` (counter; method, status, route_class)
//! * `gateway_request_duration_seconds` (histogram; method, route_class)
//! * `gateway_auth_rejections_total` (counter; reason)
//! * `gateway_rate_limited_total` (counter; route_class)
//! * `gateway_rate_limiter_fail_open_total` (counter)
use std::time::Duration;

use eyre::{Result, WrapErr};
use once_cell::sync::Lazy;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider};

use crate::config::models::TelemetryConfig;

pub const METER_NAME: &str = "edge-gateway";

pub const GATEWAY_REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const GATEWAY_REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const GATEWAY_AUTH_REJECTIONS_TOTAL: &str = "gateway_auth_rejections_total";
pub const GATEWAY_RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
pub const GATEWAY_RATE_LIMITER_FAIL_OPEN_TOTAL: &str = "gateway_rate_limiter_fail_open_total";

struct GatewayInstruments {
    requests_total: Counter<u64>,
    request_duration: Histogram<f64>,
    auth_rejections: Counter<u64>,
    rate_limited: Counter<u64>,
    rate_limiter_fail_open: Counter<u64>,
}

static INSTRUMENTS: Lazy<GatewayInstruments> = Lazy::new(|| {
    let meter = global::meter(METER_NAME);
    GatewayInstruments {
        requests_total: meter
            .u64_counter(GATEWAY_REQUESTS_TOTAL)
            .with_description("Total number of HTTP requests processed by the gateway.")
            .build(),
        request_duration: meter
            .f64_histogram(GATEWAY_REQUEST_DURATION_SECONDS)
            .with_description("Latency of HTTP requests processed by the gateway.")
            .with_unit("s")
            .build(),
        auth_rejections: meter
            .u64_counter(GATEWAY_AUTH_REJECTIONS_TOTAL)
            .with_description("Requests rejected by the bearer token filter.")
            .build(),
        rate_limited: meter
            .u64_counter(GATEWAY_RATE_LIMITED_TOTAL)
            .with_description("Requests denied by the global rate limiter.")
            .build(),
        rate_limiter_fail_open: meter
            .u64_counter(GATEWAY_RATE_LIMITER_FAIL_OPEN_TOTAL)
            .with_description("Requests admitted because the rate limiter itself failed.")
            .build(),
    }
});

/// Keeps the SDK meter provider alive; flushes pending metrics on shutdown.
#[derive(Default)]
pub struct MetricsHandle {
    provider: Option<SdkMeterProvider>,
}

impl MetricsHandle {
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Failed to shut down metrics provider: {}", e);
            } else {
                tracing::info!("Metrics provider shut down");
            }
        }
    }
}

/// Install the OTLP exporter when an endpoint is configured.
pub fn init_metrics(config: &TelemetryConfig, service_name: &str) -> Result<MetricsHandle> {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        tracing::info!("No OTLP endpoint configured, metrics export disabled");
        return Ok(MetricsHandle::default());
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .wrap_err_with(|| format!("Failed to build OTLP metric exporter for {endpoint}"))?;

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();
    global::set_meter_provider(provider.clone());

    tracing::info!(endpoint, "OTLP metrics export enabled");
    Ok(MetricsHandle {
        provider: Some(provider),
    })
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route_class: &str, duration: Duration) {
    let instruments = &*INSTRUMENTS;
    instruments.requests_total.add(
        1,
        &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", i64::from(status)),
            KeyValue::new("route_class", route_class.to_string()),
        ],
    );
    instruments.request_duration.record(
        duration.as_secs_f64(),
        &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("route_class", route_class.to_string()),
        ],
    );
}

pub fn increment_auth_rejection(reason: &'static str) {
    INSTRUMENTS
        .auth_rejections
        .add(1, &[KeyValue::new("reason", reason)]);
}

pub fn increment_rate_limited(route_class: &'static str) {
    INSTRUMENTS
        .rate_limited
        .add(1, &[KeyValue::new("route_class", route_class)]);
}

pub fn increment_rate_limiter_fail_open() {
    INSTRUMENTS.rate_limiter_fail_open.add(1, &[]);
}
