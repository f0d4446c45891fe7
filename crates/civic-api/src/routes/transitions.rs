//! # Transition Table API
//!
//! Read-only view of the lifecycle transition table, optionally narrowed to
//! the rules leaving one status.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use civic_workflow::{table, RequestStatus};
use serde::Deserialize;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::routes::TransitionRuleResponse;
use crate::state::AppState;

/// Query parameters for `GET /transitions`.
#[derive(Debug, Deserialize, Default)]
pub struct TransitionsParams {
    /// Only rules leaving this status, e.g. `IN_PROGRESS`.
    pub from: Option<String>,
}

/// Build the transitions router.
pub fn router() -> Router<AppState> {
    Router::new().route("/transitions", get(list_transitions))
}

/// GET /transitions: the transition table.
#[utoipa::path(
    get,
    path = "/transitions",
    params(("from" = Option<String>, Query, description = "Only rules leaving this status")),
    responses(
        (status = 200, description = "Transition rules in declaration order", body = Vec<TransitionRuleResponse>),
        (status = 400, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub async fn list_transitions(
    State(state): State<AppState>,
    params: Result<Query<TransitionsParams>, QueryRejection>,
) -> Result<Json<Vec<TransitionRuleResponse>>, AppError> {
    let params = extract_query(params)?;
    let from = params
        .from
        .as_deref()
        .map(|name| {
            RequestStatus::from_name(name)
                .ok_or_else(|| AppError::Validation(format!("unknown status '{name}'")))
        })
        .transpose()?;

    let policy = state.engine.policy();
    let rules = table::rules()
        .iter()
        .filter(|r| from.map_or(true, |f| r.from == f))
        .map(|r| TransitionRuleResponse::from_rule(r, policy))
        .collect();
    Ok(Json(rules))
}
