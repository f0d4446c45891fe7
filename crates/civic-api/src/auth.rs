//! # Authentication Middleware
//!
//! Resolves the bearer token into the [`Actor`] the workflow acts on behalf
//! of. Token issuance lives elsewhere; this layer only decodes and checks.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{actor_id}:{department}:{secret}
//! ```
//!
//! `role` is one of `citizen`, `clerk`, `field_agent`, `supervisor`, `admin`.
//! `department` may be empty. The secret is compared in constant time.
//!
//! ## Development Mode
//!
//! When no secret is configured, requests without credentials run as a
//! fixed development admin, and tokens are still decoded (secret unchecked)
//! so role-specific flows can be exercised locally.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use civic_core::{Actor, ActorId, DepartmentId, Role};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// The authenticated caller, injected into request extensions by
/// [`auth_middleware`] and extracted by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub Actor);

impl CallerIdentity {
    /// The fixed identity used when authentication is disabled.
    pub fn development() -> Self {
        Self(Actor::new(ActorId::from_uuid(Uuid::nil()), Role::Admin))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// reveal the length mismatch.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Decode `{role}:{actor_id}:{department}:{secret}` into an [`Actor`].
///
/// With `expected_secret = None` the secret segment is not checked.
pub fn parse_bearer_token(provided: &str, expected_secret: Option<&str>) -> Result<Actor, String> {
    let parts: Vec<&str> = provided.splitn(4, ':').collect();
    let [role_str, actor_str, department_str, secret] = parts.as_slice() else {
        return Err(
            "invalid token format, expected {role}:{actor_id}:{department}:{secret}".into(),
        );
    };

    if let Some(expected) = expected_secret {
        if !constant_time_token_eq(secret, expected) {
            return Err("invalid bearer token".into());
        }
    }

    // Tokens carry the lower-case form only.
    let role = role_str
        .parse::<Role>()
        .ok()
        .filter(|_| role_str.bytes().all(|b| !b.is_ascii_uppercase()))
        .ok_or_else(|| format!("unknown role: {role_str}"))?;

    let actor_id: ActorId = actor_str
        .parse()
        .map_err(|e| format!("invalid actor_id: {e}"))?;

    let mut actor = Actor::new(actor_id, role);
    if !department_str.is_empty() {
        let department =
            DepartmentId::new(*department_str).map_err(|e| format!("invalid department: {e}"))?;
        actor = actor.with_department(department);
    }
    Ok(actor)
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller from the `Authorization` header and inject a
/// [`CallerIdentity`] into request extensions.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let identity = match (auth_header, expected.as_deref()) {
        (None, None) => Ok(CallerIdentity::development()),
        (None, Some(_)) => Err("missing authorization header".to_string()),
        (Some(value), expected) => match value.strip_prefix("Bearer ") {
            Some(token) => parse_bearer_token(token, expected).map(CallerIdentity),
            None => Err("authorization header must use Bearer scheme".to_string()),
        },
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
