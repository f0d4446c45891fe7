//! # API Route Modules
//!
//! - `requests`: service request submission, reads, workflow transitions,
//!   detail edits, audit history, and per-caller available actions.
//! - `transitions`: the declarative transition table, read-only.

pub mod requests;
pub mod transitions;

use civic_workflow::{Effect, TransitionRule, WorkflowPolicy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One row of the transition table as exposed over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionRuleResponse {
    /// Status the request must be in, e.g. `SUBMITTED`.
    pub from: String,
    /// Action name, e.g. `triage`.
    pub action: String,
    /// Status after the transition.
    pub to: String,
    /// Roles allowed to invoke the transition.
    pub authorized_roles: Vec<String>,
    /// Side effect: `none`, `assign`, `close` or `reopen`.
    pub effect: String,
    /// Whether this action must carry a non-empty reason.
    pub reason_required: bool,
}

impl TransitionRuleResponse {
    pub(crate) fn from_rule(rule: &TransitionRule, policy: &WorkflowPolicy) -> Self {
        let effect = match rule.effect {
            Effect::None => "none",
            Effect::Assign => "assign",
            Effect::Close => "close",
            Effect::Reopen => "reopen",
        };
        Self {
            from: rule.from.as_str().to_string(),
            action: rule.action.as_str().to_string(),
            to: rule.to.as_str().to_string(),
            authorized_roles: rule
                .authorized_roles
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            effect: effect.to_string(),
            reason_required: policy.requires_reason(rule.action),
        }
    }
}
