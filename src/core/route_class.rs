//! Route classification: which cross-cutting checks apply to a request path.
//!
//! Classification is a total, pure function over an explicit prefix table.
//! A prefix matches when the path equals it or continues with `/` right after
//! it (segment boundary), compared ASCII case-insensitively. Among matching
//! prefixes the longest wins, so table order never matters. Paths matching no
//! prefix are [`RouteClass::Protected`].
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::models::ClassificationConfig;

/// Path used by liveness probes; exempt from admission control regardless of
/// how the classification table is configured.
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// No authentication, no rate limiting (health / status).
    Public,
    /// No authentication, rate limited (login / register / refresh).
    AuthExempt,
    /// Authentication and rate limiting both apply.
    Protected,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Public => "public",
            RouteClass::AuthExempt => "auth_exempt",
            RouteClass::Protected => "protected",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, RouteClass::Protected)
    }

    pub fn is_rate_limited(&self) -> bool {
        !matches!(self, RouteClass::Public)
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable prefix table mapping paths to a [`RouteClass`].
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    rules: Vec<(String, RouteClass)>,
}

impl RouteClassifier {
    pub fn new(rules: impl IntoIterator<Item = (String, RouteClass)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(config.rules())
    }

    /// Classify a request path.
    pub fn classify(&self, path: &str) -> RouteClass {
        self.rules
            .iter()
            .filter(|(prefix, _)| starts_with_segments(path, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, class)| *class)
            .unwrap_or(RouteClass::Protected)
    }

    pub fn rules(&self) -> &[(String, RouteClass)] {
        &self.rules
    }
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::from_config(&ClassificationConfig::default())
    }
}

/// Segment-aware, ASCII case-insensitive prefix test.
pub fn starts_with_segments(path: &str, prefix: &str) -> bool {
    let (path, prefix) = (path.as_bytes(), prefix.as_bytes());
    if path.len() < prefix.len() || !path[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return false;
    }
    path.len() == prefix.len() || path[prefix.len()] == b'/'
}

/// True for the health probe path and anything beneath it.
pub fn is_health_path(path: &str) -> bool {
    starts_with_segments(path, HEALTH_PATH)
}
