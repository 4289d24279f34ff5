//! Bearer-token admission for protected routes.
//!
//! The filter only decodes the JWT claim set so the caller's identity can be
//! propagated; signature, issuer and expiry checks belong to the authority that
//! minted the token and to the backend services. No external calls are made.
use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::{
    context::{Identity, RequestContext},
    route_class::RouteClass,
};

const BEARER_SCHEME: &str = "Bearer";
const BEARER_PREFIX: &str = "Bearer ";

/// Why a protected request was turned away. Every kind maps to 401.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("Missing Authorization header")]
    MissingCredential,
    #[error("Invalid Authorization header format")]
    MalformedCredential,
    #[error("Empty token")]
    EmptyCredential,
    #[error("Invalid token")]
    UnparseableCredential,
    #[error("Token has no subject")]
    MissingSubject,
}

impl AuthRejection {
    /// Stable reason code used in logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::MissingCredential => "missing_credential",
            AuthRejection::MalformedCredential => "malformed_credential",
            AuthRejection::EmptyCredential => "empty_credential",
            AuthRejection::UnparseableCredential => "unparseable_credential",
            AuthRejection::MissingSubject => "missing_subject",
        }
    }

    /// Build the 401 response. The rejection itself rides along in the
    /// response extensions so outer layers can log the precise reason.
    pub fn to_response(self, detailed: bool) -> Response {
        let body = if detailed {
            format!("Unauthorized: {self}")
        } else {
            "Unauthorized".to_string()
        };
        let mut response = (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
            Body::from(body),
        )
            .into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Decides whether a request may proceed and attaches its [`Identity`].
#[derive(Debug, Clone)]
pub struct AuthFilter {
    detailed_errors: bool,
}

impl AuthFilter {
    pub fn new(detailed_errors: bool) -> Self {
        Self { detailed_errors }
    }

    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
    }

    /// Apply the filter for an already classified request.
    pub fn authorize(
        &self,
        class: RouteClass,
        headers: &HeaderMap,
        ctx: &mut RequestContext,
    ) -> Result<(), AuthRejection> {
        if !class.requires_auth() {
            return Ok(());
        }

        match authenticate(headers) {
            Ok(identity) => {
                tracing::debug!(
                    correlation_id = %ctx.correlation_id(),
                    user_id = %identity.subject_id,
                    user_email = identity.email.as_deref().unwrap_or(""),
                    path = %ctx.path(),
                    "Authenticated request"
                );
                ctx.attach_identity(identity);
                Ok(())
            }
            Err(rejection) => {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id(),
                    path = %ctx.path(),
                    reason = rejection.code(),
                    "Rejected request: {rejection}"
                );
                Err(rejection)
            }
        }
    }
}

impl Default for AuthFilter {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Validate the `Authorization` header of a protected request and derive the
/// caller's identity from the token claims.
pub fn authenticate(headers: &HeaderMap) -> Result<Identity, AuthRejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthRejection::MissingCredential)?;
    let value = value
        .to_str()
        .map_err(|_| AuthRejection::MalformedCredential)?;
    // HTTP parsers drop trailing whitespace, so `Bearer ` arrives as `Bearer`.
    if value == BEARER_SCHEME {
        return Err(AuthRejection::EmptyCredential);
    }
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthRejection::MalformedCredential)?
        .trim();
    if token.is_empty() {
        return Err(AuthRejection::EmptyCredential);
    }

    let claims = decode_claims(token).ok_or(AuthRejection::UnparseableCredential)?;
    identity_from_claims(&claims).ok_or(AuthRejection::MissingSubject)
}

/// Decode the payload of a compact JWS (`header.payload.signature`). The
/// header must also be a JSON object; the signature is not inspected.
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let (header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }
    decode_json_object(header)?;
    decode_json_object(payload)
}

fn decode_json_object(segment: &str) -> Option<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn identity_from_claims(claims: &Map<String, Value>) -> Option<Identity> {
    let subject_id = claim_string(claims, "sub").or_else(|| claim_string(claims, "userId"))?;
    Some(Identity {
        subject_id,
        email: claim_string(claims, "email"),
        role: claim_string(claims, "role"),
    })
}

/// String view of a claim. Multi-valued claims yield their first entry.
fn claim_string(claims: &Map<String, Value>, name: &str) -> Option<String> {
    let value = match claims.get(name)? {
        Value::Array(values) => values.first()?,
        other => other,
    };
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
