// End-to-end behaviour of the request pipeline with stubbed limiter and dispatcher
mod common;

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use axum::body::Body;
    use edge_gateway::core::{
        AuthFilter, AuthRejection, GatewayPipeline, Identity, RouteClass, RouteClassifier,
    };
    use http::{Method, Request, StatusCode, header};
    use serde_json::json;

    use crate::common::{
        CapturedLogs, DispatchBehavior, LimiterMode, RecordingDispatcher, ScriptedLimiter,
        body_string, pipeline, token,
    };

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap()
    }

    fn request_id(response: &axum::response::Response) -> String {
        response
            .headers()
            .get("x-request-id")
            .expect("X-Request-Id must be set")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth_and_no_token() {
        let limiter = ScriptedLimiter::new(LimiterMode::Deny);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let response = pipeline.handle(get("/health"), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!request_id(&response).is_empty());
        assert_eq!(limiter.calls(), 0);
        assert_eq!(dispatcher.seen()[0].route_class, Some(RouteClass::Public));
        assert!(dispatcher.seen()[0].identity.is_none());
    }

    #[tokio::test]
    async fn test_public_paths_never_consult_limiter() {
        let limiter = ScriptedLimiter::new(LimiterMode::Deny);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        for path in ["/", "/status", "/status/routes", "/health/ready"] {
            let response = pipeline.handle(get(path), None).await;
            assert_eq!(response.status(), StatusCode::OK, "path {path}");
        }
        assert_eq!(limiter.calls(), 0);
        assert_eq!(dispatcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let limiter = ScriptedLimiter::new(LimiterMode::Grant);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let response = pipeline.handle(get("/api/users"), None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.extensions().get::<AuthRejection>(),
            Some(&AuthRejection::MissingCredential)
        );
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
        assert!(!request_id(&response).is_empty());
        assert_eq!(
            body_string(response).await,
            "Unauthorized: Missing Authorization header"
        );
        // Auth rejection short-circuits before admission and dispatch
        assert_eq!(limiter.calls(), 0);
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_bearer_token() {
        let limiter = ScriptedLimiter::new(LimiterMode::Grant);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let response = pipeline
            .handle(get_with_auth("/api/games", "Bearer "), None)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.extensions().get::<AuthRejection>(),
            Some(&AuthRejection::EmptyCredential)
        );
        assert_eq!(limiter.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_without_subject() {
        let limiter = ScriptedLimiter::new(LimiterMode::Grant);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());
        let bearer = format!("Bearer {}", token(json!({"email": "a@b.com"})));

        let response = pipeline
            .handle(get_with_auth("/api/users", &bearer), None)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.extensions().get::<AuthRejection>(),
            Some(&AuthRejection::MissingSubject)
        );
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let limiter = ScriptedLimiter::new(LimiterMode::Grant);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());
        let bearer = format!(
            "Bearer {}",
            token(json!({"sub": "u1", "email": "a@b.com", "role": "Admin"}))
        );

        let response = pipeline
            .handle(get_with_auth("/api/users/u1", &bearer), None)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.calls(), 1);
        let seen = dispatcher.seen();
        assert_eq!(seen[0].route_class, Some(RouteClass::Protected));
        assert_eq!(
            seen[0].identity,
            Some(Identity {
                subject_id: "u1".to_string(),
                email: Some("a@b.com".to_string()),
                role: Some("Admin".to_string()),
            })
        );
        assert_eq!(seen[0].correlation_id, request_id(&response));
    }

    #[tokio::test]
    async fn test_login_skips_auth_but_is_rate_limited() {
        let limiter = ScriptedLimiter::new(LimiterMode::Grant);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .body(Body::from(r#"{"email":"a@b.com","password":"x"}"#))
            .unwrap();
        let response = pipeline.handle(req, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.calls(), 1);
        assert_eq!(dispatcher.seen()[0].route_class, Some(RouteClass::AuthExempt));
        assert!(dispatcher.seen()[0].identity.is_none());
    }

    #[tokio::test]
    async fn test_denied_lease_returns_429() {
        let limiter = ScriptedLimiter::new(LimiterMode::Deny);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let response = pipeline
            .handle(get("/api/auth/register"), Some("10.0.0.1:5555".parse().unwrap()))
            .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
        assert!(!request_id(&response).is_empty());
        assert_eq!(
            body_string(response).await,
            "Rate limit exceeded. Please try again later."
        );
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_limiter_fault_fails_open() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let limiter = ScriptedLimiter::new(LimiterMode::Fault);
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = pipeline(limiter.clone(), dispatcher.clone());

        let response = pipeline.handle(get("/api/auth/login"), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(dispatcher.calls(), 1);
        let fail_open: Vec<_> = logs
            .events()
            .into_iter()
            .filter(|e| e["target"] == "gateway::fail_open")
            .collect();
        assert_eq!(fail_open.len(), 1);
        assert_eq!(fail_open[0]["level"], "ERROR");
    }

    #[tokio::test]
    async fn test_dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchBehavior::NoRoute, StatusCode::NOT_FOUND),
            (DispatchBehavior::Unavailable, StatusCode::BAD_GATEWAY),
            (DispatchBehavior::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (DispatchBehavior::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (behavior, expected) in cases {
            let pipeline = pipeline(
                ScriptedLimiter::new(LimiterMode::Grant),
                RecordingDispatcher::new(behavior),
            );
            let response = pipeline.handle(get("/api/auth/refresh"), None).await;
            assert_eq!(response.status(), expected, "{behavior:?}");
            assert!(!request_id(&response).is_empty());
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_500() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let pipeline = pipeline(
            ScriptedLimiter::new(LimiterMode::Grant),
            RecordingDispatcher::new(DispatchBehavior::Panic),
        );
        let response = pipeline.handle(get("/status"), None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let id = request_id(&response);
        assert_eq!(body_string(response).await, "Internal Server Error");

        let failed = logs.with_message("Request failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["fields"]["correlation_id"], id.as_str());
        assert!(logs.with_message("Request completed").is_empty());
    }

    #[tokio::test]
    async fn test_logged_id_matches_response_header() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let pipeline = pipeline(
            ScriptedLimiter::new(LimiterMode::Grant),
            RecordingDispatcher::new(DispatchBehavior::Respond),
        );
        let response = pipeline.handle(get("/api/auth/login"), None).await;
        let id = request_id(&response);

        let started = logs.with_message("Request started");
        let completed = logs.with_message("Request completed");
        assert_eq!(started.len(), 1);
        assert_eq!(completed.len(), 1);
        assert_eq!(started[0]["fields"]["correlation_id"], id.as_str());
        assert_eq!(completed[0]["fields"]["correlation_id"], id.as_str());
        assert_eq!(completed[0]["fields"]["status"], 200);
    }

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let pipeline = pipeline(
            ScriptedLimiter::new(LimiterMode::Grant),
            RecordingDispatcher::new(DispatchBehavior::Respond),
        );
        let a = pipeline.handle(get("/health"), None).await;
        let b = pipeline.handle(get("/health"), None).await;
        assert_ne!(request_id(&a), request_id(&b));
    }

    #[tokio::test]
    async fn test_cancelled_request_logs_once() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let pipeline = pipeline(
            ScriptedLimiter::new(LimiterMode::Hang),
            RecordingDispatcher::new(DispatchBehavior::Respond),
        );
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.handle(get("/api/auth/login"), None),
        )
        .await;
        assert!(outcome.is_err());

        assert_eq!(logs.with_message("Request cancelled").len(), 1);
        assert!(logs.with_message("Request completed").is_empty());
        assert!(logs.with_message("Request failed").is_empty());
    }

    #[tokio::test]
    async fn test_terse_auth_errors() {
        let pipeline = GatewayPipeline::new(
            RouteClassifier::default(),
            AuthFilter::new(false),
            ScriptedLimiter::new(LimiterMode::Grant),
            RecordingDispatcher::new(DispatchBehavior::Respond),
            60,
        );
        let response = pipeline
            .handle(get_with_auth("/api/users", "Token abc"), None)
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.extensions().get::<AuthRejection>(),
            Some(&AuthRejection::MalformedCredential)
        );
        assert_eq!(body_string(response).await, "Unauthorized");
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_their_own_context() {
        let dispatcher = RecordingDispatcher::new(DispatchBehavior::Respond);
        let pipeline = Arc::new(pipeline(
            ScriptedLimiter::new(LimiterMode::Grant),
            dispatcher.clone(),
        ));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let bearer = format!("Bearer {}", token(json!({ "sub": format!("user-{i}") })));
                    let response = pipeline
                        .handle(get_with_auth(&format!("/api/users/{i}"), &bearer), None)
                        .await;
                    (i, request_id(&response))
                })
            })
            .collect();

        for handle in handles {
            let (i, id) = handle.await.unwrap();
            let seen = dispatcher
                .seen()
                .into_iter()
                .find(|s| s.correlation_id == id)
                .unwrap();
            assert_eq!(seen.path, format!("/api/users/{i}"));
            assert_eq!(seen.identity.unwrap().subject_id, format!("user-{i}"));
        }
    }
}
