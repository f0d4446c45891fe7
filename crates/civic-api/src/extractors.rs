//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers that map Axum
//! rejections onto [`AppError`], and the [`IfMatch`] extractor carrying the
//! caller's expected version for optimistic concurrency.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query};
use axum::http::header::IF_MATCH;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::Json;
use civic_core::RequestId;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract query parameters, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract query parameters and validate them using the [`Validate`] trait.
pub fn extract_validated_query<T: Validate>(
    result: Result<Query<T>, QueryRejection>,
) -> Result<T, AppError> {
    let value = extract_query(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Extract the `{id}` path segment as a [`RequestId`].
pub fn extract_request_id(
    result: Result<Path<RequestId>, PathRejection>,
) -> Result<RequestId, AppError> {
    result
        .map(|Path(id)| id)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

// ── If-Match / ETag ─────────────────────────────────────────────────────────

/// The version a write is based on, taken from the `If-Match` header.
///
/// Accepts the bare number (`3`), the strong entity tag this API emits
/// (`"3"`), and a weak tag (`W/"3"`). A missing or malformed header is a
/// validation error: every write must state the version it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfMatch(pub u64);

/// Parse an `If-Match` header value into a version.
pub fn parse_if_match(value: &str) -> Result<u64, String> {
    let tag = value.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    let tag = tag
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag);
    tag.parse::<u64>().map_err(|_| {
        format!("If-Match must carry the request version as an entity tag, got '{value}'")
    })
}

/// Entity tag for a request version, as sent in `ETag`.
pub fn etag(version: u64) -> HeaderValue {
    // Digits and quotes are always valid header bytes.
    HeaderValue::from_str(&format!("\"{version}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("\"\""))
}

impl<S: Send + Sync> FromRequestParts<S> for IfMatch {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(IF_MATCH)
            .ok_or_else(|| AppError::Validation("missing If-Match header".to_string()))?;
        let value = header
            .to_str()
            .map_err(|_| AppError::Validation("If-Match header is not valid ASCII".to_string()))?;
        parse_if_match(value).map(IfMatch).map_err(AppError::Validation)
    }
}
