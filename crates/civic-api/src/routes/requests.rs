//! # Service Request API
//!
//! Submission, reads, workflow transitions, detail edits, audit history and
//! the caller's available actions. Every write carries `If-Match` with the
//! version the caller read; every single-request response carries that
//! version back as `ETag`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use civic_core::{ActorId, DepartmentId, RequestId};
use civic_workflow::{
    AuditEvent, AuditPageRequest, DetailsPatch, EditCommand, ListFilter, RequestDetails,
    RequestStatus, ServiceRequest, TransitionCommand,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{
    etag, extract_json, extract_request_id, extract_validated_query, IfMatch, Validate,
};
use crate::routes::TransitionRuleResponse;
use crate::state::AppState;

// ── Request DTOs ────────────────────────────────────────────────────────────

/// Body of `POST /requests`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    /// Short summary, 1 to 200 characters.
    pub title: String,
    /// Free-text description, up to 5000 characters.
    #[serde(default)]
    pub description: String,
    /// Service category, e.g. `pothole`.
    pub category: String,
    /// Street address or landmark.
    #[serde(default)]
    pub location: Option<String>,
}

impl CreateRequestBody {
    fn into_details(self) -> RequestDetails {
        RequestDetails {
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
        }
    }
}

/// Body of `POST /requests/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionBody {
    /// Action name, e.g. `triage`, `start`, `reject`.
    pub action: String,
    /// Free-text reason; required for `reject` by default.
    #[serde(default)]
    pub reason: Option<String>,
    /// Assignee to set; only accepted by `triage`.
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    /// Department to route to; only accepted by `triage`.
    #[serde(default)]
    pub department_id: Option<String>,
}

/// Body of `PATCH /requests/{id}`. Omitted fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EditRequestBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
}

/// Query parameters for `GET /requests`.
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Validate for ListParams {
    fn validate(&self) -> Result<(), String> {
        match self.offset {
            Some(offset) if offset as u64 > MAX_POSITION => {
                Err(format!("offset must not exceed {MAX_POSITION}"))
            }
            _ => Ok(()),
        }
    }
}

/// Query parameters for `GET /requests/{id}/history`.
#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

impl Validate for HistoryParams {
    fn validate(&self) -> Result<(), String> {
        match self.after {
            Some(after) if after > MAX_POSITION => {
                Err(format!("after must not exceed {MAX_POSITION}"))
            }
            _ => Ok(()),
        }
    }
}

/// Largest paging position a store can address (`BIGINT`).
const MAX_POSITION: u64 = i64::MAX as u64;

// ── Response DTOs ───────────────────────────────────────────────────────────

/// A service request as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequestResponse {
    pub id: Uuid,
    /// Lifecycle status, e.g. `IN_PROGRESS`.
    pub status: String,
    /// Optimistic concurrency version; send it back in `If-Match`.
    pub version: u64,
    pub creator_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub department_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<ServiceRequest> for RequestResponse {
    fn from(r: ServiceRequest) -> Self {
        Self {
            id: *r.id.as_uuid(),
            status: r.status.as_str().to_string(),
            version: r.version,
            creator_id: *r.creator_id.as_uuid(),
            assignee_id: r.assignee_id.map(|a| *a.as_uuid()),
            department_id: r.department_id.map(String::from),
            title: r.details.title,
            description: r.details.description,
            category: r.details.category,
            location: r.details.location,
            created_at: r.created_at,
            updated_at: r.updated_at,
            closed_at: r.closed_at,
        }
    }
}

/// One committed transition.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEventResponse {
    /// Position in the request's history, starting at 1.
    pub sequence_number: u64,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: Uuid,
    pub actor_role: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Hash of the previous event, or 64 zeros for the first.
    pub previous_hash: String,
    /// SHA-256 over this event and `previous_hash`, hex encoded.
    pub event_hash: String,
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(e: AuditEvent) -> Self {
        Self {
            sequence_number: e.sequence_number,
            action: e.action.as_str().to_string(),
            from_status: e.from_status.as_str().to_string(),
            to_status: e.to_status.as_str().to_string(),
            actor_id: *e.actor_id.as_uuid(),
            actor_role: e.actor_role.as_str().to_string(),
            reason: e.reason,
            created_at: e.created_at,
            previous_hash: e.previous_hash,
            event_hash: e.event_hash,
        }
    }
}

/// One page of a request's history.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub request_id: Uuid,
    /// Events in ascending sequence order.
    pub events: Vec<AuditEventResponse>,
    /// Pass as `after` to fetch the next page; absent on the last page.
    pub next_after: Option<u64>,
}

/// Actions the caller may perform on a request right now.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableActionsResponse {
    pub request_id: Uuid,
    pub status: String,
    pub version: u64,
    pub actions: Vec<TransitionRuleResponse>,
}

fn with_etag(status: StatusCode, request: ServiceRequest) -> Response {
    let tag = etag(request.version);
    (
        status,
        [(header::ETAG, tag)],
        Json(RequestResponse::from(request)),
    )
        .into_response()
}

/// Build the service requests router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests", get(list_requests).post(create_request))
        .route("/requests/{id}", get(get_request).patch(edit_request))
        .route("/requests/{id}/status", post(transition_request))
        .route("/requests/{id}/history", get(request_history))
        .route("/requests/{id}/actions", get(available_actions))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /requests: file a new service request.
#[utoipa::path(
    post,
    path = "/requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request filed as SUBMITTED, version 0", body = RequestResponse),
        (status = 400, description = "Invalid details", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthenticated", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn create_request(
    State(state): State<AppState>,
    CallerIdentity(actor): CallerIdentity,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = extract_json(body)?;
    let created = state.engine.submit(&actor, body.into_details()).await?;
    Ok(with_etag(StatusCode::CREATED, created))
}

/// GET /requests: list requests, newest first.
#[utoipa::path(
    get,
    path = "/requests",
    params(
        ("status" = Option<String>, Query, description = "Only requests in this status"),
        ("limit" = Option<usize>, Query, description = "Max items to return (default 100, max 1000)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)"),
    ),
    responses(
        (status = 200, description = "Matching requests", body = Vec<RequestResponse>),
        (status = 400, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<RequestResponse>>, AppError> {
    let params = extract_validated_query(params)?;
    let status = params
        .status
        .as_deref()
        .map(|name| {
            RequestStatus::from_name(name)
                .ok_or_else(|| AppError::Validation(format!("unknown status '{name}'")))
        })
        .transpose()?;
    let filter = ListFilter::new(status, params.limit, params.offset);
    let requests = state.engine.list(&filter).await?;
    Ok(Json(requests.into_iter().map(RequestResponse::from).collect()))
}

/// GET /requests/{id}: current state of a request.
#[utoipa::path(
    get,
    path = "/requests/{id}",
    params(("id" = Uuid, Path, description = "Service request ID")),
    responses(
        (status = 200, description = "Request found; ETag carries the version", body = RequestResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    path: Result<Path<RequestId>, PathRejection>,
) -> Result<Response, AppError> {
    let id = extract_request_id(path)?;
    let request = state.engine.get(id).await?;
    Ok(with_etag(StatusCode::OK, request))
}

/// POST /requests/{id}/status: apply a workflow action.
///
/// `INVALID_TRANSITION` and `VERSION_CONFLICT` are both 409; only the
/// latter is worth retrying, after re-reading the request.
#[utoipa::path(
    post,
    path = "/requests/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Service request ID"),
        ("If-Match" = String, Header, description = "Version the caller last read"),
    ),
    request_body = TransitionBody,
    responses(
        (status = 200, description = "Transition committed", body = RequestResponse),
        (status = 400, description = "Missing If-Match or invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Role may not perform this action", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "INVALID_TRANSITION or VERSION_CONFLICT", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn transition_request(
    State(state): State<AppState>,
    CallerIdentity(actor): CallerIdentity,
    path: Result<Path<RequestId>, PathRejection>,
    IfMatch(expected_version): IfMatch,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = extract_request_id(path)?;
    let body = extract_json(body)?;

    let department_id = body.department_id.map(DepartmentId::new).transpose()?;
    let assignee_id = body.assignee_id.map(ActorId::from_uuid);

    let mut cmd = TransitionCommand::new(id, body.action, actor, expected_version)
        .with_assignment(assignee_id, department_id);
    if let Some(reason) = body.reason {
        cmd = cmd.with_reason(reason);
    }

    let updated = state.engine.apply(cmd).await?;
    Ok(with_etag(StatusCode::OK, updated))
}

/// PATCH /requests/{id}: edit the citizen-supplied details.
#[utoipa::path(
    patch,
    path = "/requests/{id}",
    params(
        ("id" = Uuid, Path, description = "Service request ID"),
        ("If-Match" = String, Header, description = "Version the caller last read"),
    ),
    request_body = EditRequestBody,
    responses(
        (status = 200, description = "Details updated", body = RequestResponse),
        (status = 400, description = "Invalid edit", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not edit this request", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Version conflict", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn edit_request(
    State(state): State<AppState>,
    CallerIdentity(actor): CallerIdentity,
    path: Result<Path<RequestId>, PathRejection>,
    IfMatch(expected_version): IfMatch,
    body: Result<Json<EditRequestBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = extract_request_id(path)?;
    let body = extract_json(body)?;

    let cmd = EditCommand {
        request_id: id,
        actor,
        expected_version,
        patch: DetailsPatch {
            title: body.title,
            description: body.description,
            category: body.category,
            location: body.location,
        },
    };
    let updated = state.engine.edit_details(cmd).await?;
    Ok(with_etag(StatusCode::OK, updated))
}

/// GET /requests/{id}/history: paged audit history.
#[utoipa::path(
    get,
    path = "/requests/{id}/history",
    params(
        ("id" = Uuid, Path, description = "Service request ID"),
        ("after" = Option<u64>, Query, description = "Return events after this sequence number"),
        ("limit" = Option<usize>, Query, description = "Max events to return (default 100, max 1000)"),
    ),
    responses(
        (status = 200, description = "History page", body = HistoryResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn request_history(
    State(state): State<AppState>,
    path: Result<Path<RequestId>, PathRejection>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, AppError> {
    let id = extract_request_id(path)?;
    let params = extract_validated_query(params)?;
    let page = state
        .engine
        .history(id, AuditPageRequest::new(params.after, params.limit))
        .await?;
    Ok(Json(HistoryResponse {
        request_id: *id.as_uuid(),
        events: page.events.into_iter().map(AuditEventResponse::from).collect(),
        next_after: page.next_after,
    }))
}

/// GET /requests/{id}/actions: what the caller may do next.
#[utoipa::path(
    get,
    path = "/requests/{id}/actions",
    params(("id" = Uuid, Path, description = "Service request ID")),
    responses(
        (status = 200, description = "Actions permitted for the caller's role", body = AvailableActionsResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn available_actions(
    State(state): State<AppState>,
    CallerIdentity(actor): CallerIdentity,
    path: Result<Path<RequestId>, PathRejection>,
) -> Result<Json<AvailableActionsResponse>, AppError> {
    let id = extract_request_id(path)?;
    let (request, rules) = state.engine.available_actions(id, actor.role).await?;
    let policy = state.engine.policy();
    Ok(Json(AvailableActionsResponse {
        request_id: *request.id.as_uuid(),
        status: request.status.as_str().to_string(),
        version: request.version,
        actions: rules
            .into_iter()
            .map(|r| TransitionRuleResponse::from_rule(r, policy))
            .collect(),
    }))
}
