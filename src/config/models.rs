//! Configuration data structures for the edge gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde-friendly and carry defaults so that a minimal config only needs the upstream
//! routes. Environment overrides are layered on top by [`crate::config::loader`].
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::route_class::RouteClass;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_service_name() -> String {
    "Edge API Gateway".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

/// Top level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Human readable service identity reported by the `/status` endpoints.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Upstream routes keyed by path prefix.
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            service_name: default_service_name(),
            environment: default_environment(),
            routes: HashMap::new(),
            classification: ClassificationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    service_name: Option<String>,
    routes: HashMap<String, RouteConfig>,
    classification: Option<ClassificationConfig>,
    rate_limit: Option<RateLimitConfig>,
    auth: Option<AuthConfig>,
    dispatch: Option<DispatchConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Add an upstream route for the given path prefix
    pub fn route(mut self, path_prefix: impl Into<String>, target: impl Into<String>) -> Self {
        self.routes
            .insert(path_prefix.into(), RouteConfig::new(target));
        self
    }

    pub fn classification(mut self, config: ClassificationConfig) -> Self {
        self.classification = Some(config);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn auth(mut self, config: AuthConfig) -> Self {
        self.auth = Some(config);
        self
    }

    pub fn dispatch(mut self, config: DispatchConfig) -> Self {
        self.dispatch = Some(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        if self.routes.is_empty() {
            return Err("At least one upstream route must be configured".to_string());
        }

        Ok(ServerConfig {
            listen_addr,
            service_name: self.service_name.unwrap_or_else(default_service_name),
            routes: self.routes,
            classification: self.classification.unwrap_or_default(),
            rate_limit: self.rate_limit.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            dispatch: self.dispatch.unwrap_or_default(),
            ..ServerConfig::default()
        })
    }
}

/// A single upstream service reachable behind a path prefix.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Base URL of the upstream, e.g. `http://users-api:8080`.
    #[serde(default)]
    pub target: String,
    /// Environment variable that, when set and non-empty, overrides `target`.
    #[serde(default)]
    pub target_env: Option<String>,
    /// Replacement for the matched prefix when forwarding.
    #[serde(default)]
    pub path_rewrite: Option<String>,
}

impl RouteConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_env: None,
            path_rewrite: None,
        }
    }
}

fn default_public_prefixes() -> Vec<String> {
    ["/health", "/status", "/"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_auth_exempt_prefixes() -> Vec<String> {
    ["/api/auth/login", "/api/auth/register", "/api/auth/refresh"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Path prefix table driving [`RouteClass`] assignment. Anything not listed is
/// [`RouteClass::Protected`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClassificationConfig {
    #[serde(default = "default_public_prefixes")]
    pub public: Vec<String>,
    #[serde(default = "default_auth_exempt_prefixes")]
    pub auth_exempt: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            public: default_public_prefixes(),
            auth_exempt: default_auth_exempt_prefixes(),
        }
    }
}

impl ClassificationConfig {
    /// Flatten into `(prefix, class)` rules.
    pub fn rules(&self) -> Vec<(String, RouteClass)> {
        self.public
            .iter()
            .map(|p| (p.clone(), RouteClass::Public))
            .chain(
                self.auth_exempt
                    .iter()
                    .map(|p| (p.clone(), RouteClass::AuthExempt)),
            )
            .collect()
    }
}

/// Process-wide token bucket parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity.
    pub token_limit: u32,
    /// Tokens added every replenishment period.
    pub tokens_per_period: u32,
    /// Parsed by humantime, e.g. "1s", "1m".
    pub replenishment_period: String,
    /// Maximum number of requests waiting for a token.
    pub queue_limit: usize,
    /// Fixed `Retry-After` value; derived from the period when absent.
    pub retry_after_secs: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            token_limit: 100,
            tokens_per_period: 100,
            replenishment_period: "1m".to_string(),
            queue_limit: 10,
            retry_after_secs: None,
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.replenishment_period)
    }
}

fn default_detailed_errors() -> bool {
    true
}

/// Bearer token settings. Signature material is never used by the gateway
/// itself; it is only reported (as presence) on the status endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub signing_key: Option<String>,
    /// Include the rejection reason in 401 bodies.
    #[serde(default = "default_detailed_errors")]
    pub detailed_errors: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            signing_key: None,
            detailed_errors: default_detailed_errors(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    /// OTLP/gRPC collector endpoint; metrics stay in-process when unset.
    pub otlp_endpoint: Option<String>,
}
