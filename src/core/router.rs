//! Upstream route table.
//!
//! Immutable after construction: a list of `(prefix, upstream)` pairs searched
//! by longest matching prefix. Prefixes ending in `/` match any path that
//! starts with them; other prefixes match on a segment boundary, so `/api/users`
//! matches `/api/users` and `/api/users/7` but not `/api/usersettings`.
use std::collections::HashMap;

use serde::Serialize;
use url::Url;

use crate::{config::models::RouteConfig, core::route_class::starts_with_segments};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamRoute {
    pub prefix: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_rewrite: Option<String>,
}

impl UpstreamRoute {
    fn matches(&self, path: &str) -> bool {
        if self.prefix.ends_with('/') {
            path.len() >= self.prefix.len()
                && path.as_bytes()[..self.prefix.len()]
                    .eq_ignore_ascii_case(self.prefix.as_bytes())
        } else {
            starts_with_segments(path, &self.prefix)
        }
    }

    /// Path to request upstream: the matched prefix swapped for
    /// `path_rewrite` when one is configured.
    pub fn rewrite_path(&self, path: &str) -> String {
        let Some(replacement) = &self.path_rewrite else {
            return path.to_string();
        };
        let remainder = path.get(self.prefix.len()..).unwrap_or("");
        match (replacement.ends_with('/'), remainder.starts_with('/')) {
            (true, true) => format!("{replacement}{}", &remainder[1..]),
            (false, false) if !remainder.is_empty() => format!("{replacement}/{remainder}"),
            _ => format!("{replacement}{remainder}"),
        }
    }

    /// Absolute upstream URI for a request path and optional query string.
    pub fn upstream_uri(&self, path: &str, query: Option<&str>) -> String {
        let base = self.target.trim_end_matches('/');
        let path = self.rewrite_path(path);
        match query {
            Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
            _ => format!("{base}{path}"),
        }
    }

    /// Host part of the target, for logging.
    pub fn target_host(&self) -> Option<String> {
        Url::parse(&self.target)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamRouter {
    routes: Vec<UpstreamRoute>,
}

impl UpstreamRouter {
    pub fn new(routes: impl IntoIterator<Item = UpstreamRoute>) -> Self {
        let mut routes: Vec<_> = routes.into_iter().collect();
        // Deterministic listing order; lookup does not depend on it.
        routes.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        Self { routes }
    }

    /// Build from resolved configuration. Targets must already have gone
    /// through environment resolution.
    pub fn from_config(routes: &HashMap<String, RouteConfig>) -> Self {
        Self::new(routes.iter().map(|(prefix, route)| UpstreamRoute {
            prefix: prefix.clone(),
            target: route.target.clone(),
            path_rewrite: route.path_rewrite.clone(),
        }))
    }

    /// Longest-prefix match for an incoming path.
    pub fn find_matching_route(&self, path: &str) -> Option<&UpstreamRoute> {
        self.routes
            .iter()
            .filter(|route| route.matches(path))
            .max_by_key(|route| route.prefix.len())
    }

    pub fn routes(&self) -> &[UpstreamRoute] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(prefix: &str, target: &str, rewrite: Option<&str>) -> UpstreamRoute {
        UpstreamRoute {
            prefix: prefix.to_string(),
            target: target.to_string(),
            path_rewrite: rewrite.map(str::to_string),
        }
    }

    fn router() -> UpstreamRouter {
        UpstreamRouter::new([
            route("/api/users", "http://users:8080", None),
            route("/api/users/admin", "http://admin:8080", None),
            route("/api/games", "http://games:8080/", Some("/games")),
            route("/", "http://frontend:3000", None),
        ])
    }

    #[test]
    fn test_longest_prefix_match() {
        let router = router();
        assert_eq!(
            router.find_matching_route("/api/users/42").unwrap().target,
            "http://users:8080"
        );
        assert_eq!(
            router.find_matching_route("/api/users/admin/roles").unwrap().target,
            "http://admin:8080"
        );
        assert_eq!(
            router.find_matching_route("/API/Users").unwrap().target,
            "http://users:8080"
        );
    }

    #[test]
    fn test_segment_boundary_and_catch_all() {
        let router = router();
        assert_eq!(
            router.find_matching_route("/api/usersettings").unwrap().prefix,
            "/"
        );
        assert_eq!(router.find_matching_route("/about").unwrap().prefix, "/");

        let no_catch_all = UpstreamRouter::new([route("/api/users", "http://users:8080", None)]);
        assert!(no_catch_all.find_matching_route("/api/orders").is_none());
    }

    #[test]
    fn test_path_rewrite() {
        let router = router();
        let games = router.find_matching_route("/api/games/7").unwrap();
        assert_eq!(games.rewrite_path("/api/games/7"), "/games/7");
        assert_eq!(games.rewrite_path("/api/games"), "/games");
        assert_eq!(
            games.upstream_uri("/api/games/7", Some("page=2")),
            "http://games:8080/games/7?page=2"
        );

        let users = router.find_matching_route("/api/users/1").unwrap();
        assert_eq!(
            users.upstream_uri("/api/users/1", None),
            "http://users:8080/api/users/1"
        );

        let trailing = route("/svc", "http://svc", Some("/v2/"));
        assert_eq!(trailing.rewrite_path("/svc/items"), "/v2/items");
    }

    #[test]
    fn test_from_config() {
        let mut routes = HashMap::new();
        routes.insert("/api/users".to_string(), RouteConfig::new("http://users:8080"));
        let router = UpstreamRouter::from_config(&routes);
        assert_eq!(router.routes().len(), 1);
        assert_eq!(
            router.routes()[0].target_host().as_deref(),
            Some("users")
        );
    }
}
