//! # Workflow Engine
//!
//! Validates a requested action against the transition table and the actor's
//! role, then commits the new state and its audit event through the store in
//! one atomic compare-and-swap.
//!
//! ## Check Order
//!
//! 1. Load the request (`NOT_FOUND`).
//! 2. Base version (`VERSION_CONFLICT`). A caller holding a stale copy judged
//!    the action against a status that may no longer hold, so staleness is
//!    reported before anything derived from that status.
//! 3. Look up `(status, action)` (`INVALID_TRANSITION`, also for unknown names).
//! 4. Role membership in the rule (`FORBIDDEN`).
//! 5. Reason and assignment input (`VALIDATION_ERROR`).
//! 6. Commit. A racing writer that slipped in between load and commit is
//!    caught by the store and also reported as `VERSION_CONFLICT`.
//!
//! Steps 2 to 5 are the pure function [`plan_transition`]; the engine adds
//! loading, committing, logging, and metrics around it. Nothing is retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use civic_core::{Actor, ActorId, DepartmentId, RequestId, Role};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::audit::{AuditDraft, AuditPage, AuditPageRequest};
use crate::error::WorkflowError;
use crate::request::{DetailsPatch, RequestDetails, ServiceRequest};
use crate::status::RequestStatus;
use crate::store::{ListFilter, Mutation, WorkflowStore};
use crate::table::{self, Effect, TransitionRule};

/// Counter of transition attempts, labelled by action and outcome code.
pub const TRANSITIONS_TOTAL: &str = "civic_workflow_transitions_total";

// ─── Policy ──────────────────────────────────────────────────────────

/// Tunable business rules, fixed at engine construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Actions that must carry a non-empty reason, in addition to `reject`.
    pub reason_required: Vec<Action>,
    /// Longest accepted reason, in characters.
    pub max_reason_len: usize,
}

impl WorkflowPolicy {
    /// Default maximum reason length.
    pub const DEFAULT_MAX_REASON_LEN: usize = 2000;

    /// Whether `action` must carry a reason under this policy.
    ///
    /// `reject` always does, whatever the configured list says.
    pub fn requires_reason(&self, action: Action) -> bool {
        action == Action::Reject || self.reason_required.contains(&action)
    }
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            reason_required: vec![Action::Reject],
            max_reason_len: Self::DEFAULT_MAX_REASON_LEN,
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────

/// A request to move a service request through the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommand {
    /// Target request.
    pub request_id: RequestId,
    /// Action name as supplied by the caller.
    pub action: String,
    /// Who is acting.
    pub actor: Actor,
    /// Version the caller last read.
    pub expected_version: u64,
    /// Free-text explanation.
    pub reason: Option<String>,
    /// New assignee; only meaningful for actions with the assign effect.
    pub assignee_id: Option<ActorId>,
    /// New department; only meaningful for actions with the assign effect.
    pub department_id: Option<DepartmentId>,
}

impl TransitionCommand {
    /// A command with no reason and no assignment input.
    pub fn new(
        request_id: RequestId,
        action: impl Into<String>,
        actor: Actor,
        expected_version: u64,
    ) -> Self {
        Self {
            request_id,
            action: action.into(),
            actor,
            expected_version,
            reason: None,
            assignee_id: None,
            department_id: None,
        }
    }

    /// Attach a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach assignment input.
    pub fn with_assignment(
        mut self,
        assignee_id: Option<ActorId>,
        department_id: Option<DepartmentId>,
    ) -> Self {
        self.assignee_id = assignee_id;
        self.department_id = department_id;
        self
    }
}

/// A request to edit the citizen-supplied details of a service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditCommand {
    /// Target request.
    pub request_id: RequestId,
    /// Who is editing.
    pub actor: Actor,
    /// Version the caller last read.
    pub expected_version: u64,
    /// Fields to change.
    pub patch: DetailsPatch,
}

/// Staff roles allowed to edit details of any non-terminal request.
const DETAIL_EDITORS: &[Role] = &[Role::Clerk, Role::Supervisor, Role::Admin];

// ─── Pure Planning ───────────────────────────────────────────────────

/// Decide the outcome of `cmd` against `current` without touching storage.
///
/// On success returns the mutation to commit at `cmd.expected_version`.
pub fn plan_transition(
    current: &ServiceRequest,
    cmd: &TransitionCommand,
    policy: &WorkflowPolicy,
    now: DateTime<Utc>,
) -> Result<Mutation, WorkflowError> {
    check_version(current, cmd.expected_version)?;

    let rule = resolve_rule(current.status, &cmd.action)?;

    if !rule.authorizes(cmd.actor.role) {
        return Err(WorkflowError::forbidden(cmd.actor.role, rule.action, rule.from));
    }

    let reason = normalize_reason(cmd.reason.as_deref(), rule.action, policy)?;

    let assigns = cmd.assignee_id.is_some() || cmd.department_id.is_some();
    if assigns && rule.effect != Effect::Assign {
        return Err(WorkflowError::Validation(format!(
            "action '{}' does not accept assignee or department",
            rule.action
        )));
    }

    let mut next = current.clone();
    next.status = rule.to;
    next.updated_at = now;
    match rule.effect {
        Effect::None => {}
        Effect::Assign => {
            if let Some(assignee) = cmd.assignee_id {
                next.assignee_id = Some(assignee);
            }
            if let Some(department) = &cmd.department_id {
                next.department_id = Some(department.clone());
            }
        }
        Effect::Close => next.closed_at = Some(now),
        Effect::Reopen => next.closed_at = None,
    }

    Ok(Mutation {
        next,
        audit: Some(AuditDraft {
            action: rule.action,
            from_status: rule.from,
            to_status: rule.to,
            actor_id: cmd.actor.actor_id,
            actor_role: cmd.actor.role,
            reason,
            created_at: now,
        }),
    })
}

/// Decide the outcome of a details edit without touching storage.
///
/// The creator may edit while the request is `SUBMITTED` or
/// `WAITING_ON_CITIZEN`; clerks, supervisors and admins while it is not
/// terminal. Edits are versioned but not audited.
pub fn plan_edit(
    current: &ServiceRequest,
    cmd: &EditCommand,
    now: DateTime<Utc>,
) -> Result<Mutation, WorkflowError> {
    check_version(current, cmd.expected_version)?;

    let is_editor = DETAIL_EDITORS.contains(&cmd.actor.role);
    let is_creator = cmd.actor.actor_id == current.creator_id;
    if !is_editor && !is_creator {
        return Err(WorkflowError::Forbidden {
            role: cmd.actor.role,
            operation: "edit details of another actor's request".to_string(),
        });
    }

    let editable = if is_editor {
        !current.is_terminal()
    } else {
        matches!(
            current.status,
            RequestStatus::Submitted | RequestStatus::WaitingOnCitizen
        )
    };
    if !editable {
        return Err(WorkflowError::Validation(format!(
            "details cannot be edited while the request is {}",
            current.status
        )));
    }

    if cmd.patch.is_empty() {
        return Err(WorkflowError::Validation(
            "edit must change at least one field".to_string(),
        ));
    }
    let details = cmd.patch.apply_to(&current.details);
    details.validate().map_err(WorkflowError::Validation)?;

    let mut next = current.clone();
    next.details = details;
    next.updated_at = now;
    Ok(Mutation { next, audit: None })
}

fn resolve_rule(
    status: RequestStatus,
    action_name: &str,
) -> Result<&'static TransitionRule, WorkflowError> {
    Action::from_name(action_name)
        .and_then(|action| table::lookup(status, action))
        .ok_or_else(|| WorkflowError::InvalidTransition {
            status,
            action: action_name.to_string(),
        })
}

fn check_version(current: &ServiceRequest, expected: u64) -> Result<(), WorkflowError> {
    if current.version != expected {
        return Err(WorkflowError::VersionConflict {
            id: current.id,
            expected,
            current: current.version,
        });
    }
    Ok(())
}

/// Trim the reason, enforce presence and length. Blank reasons become `None`.
fn normalize_reason(
    reason: Option<&str>,
    action: Action,
    policy: &WorkflowPolicy,
) -> Result<Option<String>, WorkflowError> {
    let trimmed = reason.map(str::trim).filter(|r| !r.is_empty());
    match trimmed {
        None if policy.requires_reason(action) => Err(WorkflowError::Validation(format!(
            "action '{action}' requires a non-empty reason"
        ))),
        Some(r) if r.chars().count() > policy.max_reason_len => {
            Err(WorkflowError::Validation(format!(
                "reason must not exceed {} characters",
                policy.max_reason_len
            )))
        }
        other => Ok(other.map(str::to_string)),
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

/// The service request lifecycle engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    policy: WorkflowPolicy,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Build an engine over `store` with an explicit policy.
    pub fn new(store: Arc<dyn WorkflowStore>, policy: WorkflowPolicy) -> Self {
        Self { store, policy }
    }

    /// The policy this engine enforces.
    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// File a new request as `SUBMITTED`, version 0. Writes no audit event.
    pub async fn submit(
        &self,
        creator: &Actor,
        details: RequestDetails,
    ) -> Result<ServiceRequest, WorkflowError> {
        details.validate().map_err(WorkflowError::Validation)?;
        let request = ServiceRequest::submitted(creator.actor_id, details, Utc::now());
        let stored = self.store.insert(request).await?;
        tracing::info!(
            request_id = %stored.id,
            creator_id = %stored.creator_id,
            category = %stored.details.category,
            "service request submitted"
        );
        Ok(stored)
    }

    /// Current state of a request.
    pub async fn get(&self, id: RequestId) -> Result<ServiceRequest, WorkflowError> {
        Ok(self.store.load(id).await?)
    }

    /// Requests matching `filter`, newest first.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ServiceRequest>, WorkflowError> {
        Ok(self.store.list(filter).await?)
    }

    /// Apply a workflow action. See the module docs for the check order.
    pub async fn apply(&self, cmd: TransitionCommand) -> Result<ServiceRequest, WorkflowError> {
        let result = self.try_apply(&cmd).await;
        let outcome = match &result {
            Ok(_) => "committed",
            Err(e) => e.code(),
        };
        let action_label = Action::from_name(&cmd.action).map_or("unknown", |a| a.as_str());
        counter!(TRANSITIONS_TOTAL, "action" => action_label, "outcome" => outcome).increment(1);

        match &result {
            Ok(updated) => tracing::info!(
                request_id = %updated.id,
                action = action_label,
                to = %updated.status,
                version = updated.version,
                actor_id = %cmd.actor.actor_id,
                role = %cmd.actor.role,
                "service request transitioned"
            ),
            Err(e) if e.is_retryable() => tracing::warn!(
                request_id = %cmd.request_id,
                action = %cmd.action,
                expected_version = cmd.expected_version,
                error = %e,
                "transition lost optimistic concurrency check"
            ),
            Err(WorkflowError::Store(msg)) => tracing::error!(
                request_id = %cmd.request_id,
                action = %cmd.action,
                error = %msg,
                "transition failed in store"
            ),
            Err(e) => tracing::debug!(
                request_id = %cmd.request_id,
                action = %cmd.action,
                code = e.code(),
                error = %e,
                "transition refused"
            ),
        }
        result
    }

    async fn try_apply(&self, cmd: &TransitionCommand) -> Result<ServiceRequest, WorkflowError> {
        let current = self.store.load(cmd.request_id).await?;
        let mutation = plan_transition(&current, cmd, &self.policy, Utc::now())?;
        Ok(self
            .store
            .commit(cmd.request_id, cmd.expected_version, mutation)
            .await?)
    }

    /// Edit the citizen-supplied details under optimistic concurrency.
    pub async fn edit_details(&self, cmd: EditCommand) -> Result<ServiceRequest, WorkflowError> {
        let current = self.store.load(cmd.request_id).await?;
        let mutation = plan_edit(&current, &cmd, Utc::now())?;
        let updated = self
            .store
            .commit(cmd.request_id, cmd.expected_version, mutation)
            .await
            .map_err(WorkflowError::from)?;
        tracing::info!(
            request_id = %updated.id,
            version = updated.version,
            actor_id = %cmd.actor.actor_id,
            "service request details edited"
        );
        Ok(updated)
    }

    /// One page of the request's transition history.
    pub async fn history(
        &self,
        id: RequestId,
        page: AuditPageRequest,
    ) -> Result<AuditPage, WorkflowError> {
        Ok(self.store.list_for(id, page).await?)
    }

    /// The request plus the rules `role` may invoke from its current status.
    pub async fn available_actions(
        &self,
        id: RequestId,
        role: Role,
    ) -> Result<(ServiceRequest, Vec<&'static TransitionRule>), WorkflowError> {
        let request = self.store.load(id).await?;
        let rules = table::permitted_actions(request.status, role).collect();
        Ok((request, rules))
    }

    /// Cheap round-trip to the store, used by readiness probes.
    pub async fn ping(&self) -> Result<(), WorkflowError> {
        self.store.list(&ListFilter::new(None, Some(1), None)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::verify_chain;
    use crate::memory::MemoryStore;
    use crate::request::fixtures::details;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(MemoryStore::new()), WorkflowPolicy::default())
    }

    fn actor(role: Role) -> Actor {
        Actor::new(ActorId::new(), role)
    }

    async fn submitted(engine: &WorkflowEngine) -> ServiceRequest {
        engine.submit(&actor(Role::Citizen), details()).await.unwrap()
    }

    async fn drive(engine: &WorkflowEngine, id: RequestId, steps: &[(&str, Role)]) -> ServiceRequest {
        let mut current = engine.get(id).await.unwrap();
        for (action, role) in steps {
            let mut cmd = TransitionCommand::new(id, *action, actor(*role), current.version);
            if *action == "reject" {
                cmd = cmd.with_reason("duplicate");
            }
            current = engine.apply(cmd).await.unwrap();
        }
        current
    }

    // ─── Scenario ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_triage_conflict_invalid_then_start() {
        let engine = engine();
        let req = submitted(&engine).await;
        assert_eq!(req.status, RequestStatus::Submitted);
        assert_eq!(req.version, 0);

        let triaged = engine
            .apply(TransitionCommand::new(req.id, "triage", actor(Role::Clerk), 0))
            .await
            .unwrap();
        assert_eq!(triaged.status, RequestStatus::Triaged);
        assert_eq!(triaged.version, 1);

        let err = engine
            .apply(TransitionCommand::new(req.id, "resolve", actor(Role::FieldAgent), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VERSION_CONFLICT");
        assert!(err.is_retryable());

        let err = engine
            .apply(TransitionCommand::new(req.id, "resolve", actor(Role::FieldAgent), 1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        let started = engine
            .apply(TransitionCommand::new(req.id, "start", actor(Role::FieldAgent), 1))
            .await
            .unwrap();
        assert_eq!(started.status, RequestStatus::InProgress);
        assert_eq!(started.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_on_legal_action_is_conflict() {
        let engine = engine();
        let req = submitted(&engine).await;
        drive(&engine, req.id, &[("triage", Role::Clerk)]).await;

        let err = engine
            .apply(TransitionCommand::new(req.id, "start", actor(Role::FieldAgent), 0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::VersionConflict {
                id: req.id,
                expected: 0,
                current: 1
            }
        );
    }

    // ─── Failure Kinds ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let engine = engine();
        let id = RequestId::new();
        let err = engine
            .apply(TransitionCommand::new(id, "triage", actor(Role::Clerk), 0))
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::NotFound(id));
    }

    #[tokio::test]
    async fn test_unknown_action_is_invalid_transition() {
        let engine = engine();
        let req = submitted(&engine).await;
        let err = engine
            .apply(TransitionCommand::new(req.id, "escalate", actor(Role::Admin), 0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::InvalidTransition {
                status: RequestStatus::Submitted,
                action: "escalate".to_string()
            }
        );
        assert_eq!(engine.get(req.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_unlisted_role_is_forbidden_and_state_unchanged() {
        let engine = engine();
        let req = submitted(&engine).await;
        let err = engine
            .apply(TransitionCommand::new(req.id, "triage", actor(Role::FieldAgent), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        let after = engine.get(req.id).await.unwrap();
        assert_eq!(after, req);
    }

    #[tokio::test]
    async fn test_staleness_reported_before_role() {
        let engine = engine();
        let req = submitted(&engine).await;
        let err = engine
            .apply(TransitionCommand::new(req.id, "triage", actor(Role::Citizen), 7))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VERSION_CONFLICT");

        let err = engine
            .apply(TransitionCommand::new(req.id, "triage", actor(Role::Citizen), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_terminal_statuses_reject_every_action() {
        let engine = engine();
        let rejected = submitted(&engine).await;
        drive(&engine, rejected.id, &[("reject", Role::Clerk)]).await;
        let closed = submitted(&engine).await;
        drive(
            &engine,
            closed.id,
            &[
                ("triage", Role::Clerk),
                ("start", Role::FieldAgent),
                ("resolve", Role::FieldAgent),
                ("close", Role::Clerk),
            ],
        )
        .await;

        for id in [rejected.id, closed.id] {
            let current = engine.get(id).await.unwrap();
            for action in Action::ALL {
                let err = engine
                    .apply(TransitionCommand::new(id, action.as_str(), actor(Role::Admin), current.version))
                    .await
                    .unwrap_err();
                assert_eq!(err.code(), "INVALID_TRANSITION", "{action} from {}", current.status);
            }
        }
    }

    // ─── Reasons ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let engine = engine();
        let req = submitted(&engine).await;

        for reason in [None, Some(""), Some("   ")] {
            let mut cmd = TransitionCommand::new(req.id, "reject", actor(Role::Clerk), 0);
            cmd.reason = reason.map(str::to_string);
            let err = engine.apply(cmd).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        assert_eq!(engine.get(req.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_reject_with_reason_records_it() {
        let engine = engine();
        let req = submitted(&engine).await;
        let rejected = engine
            .apply(
                TransitionCommand::new(req.id, "reject", actor(Role::Supervisor), 0)
                    .with_reason("  duplicate of an open request  "),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert!(rejected.closed_at.is_some());

        let page = engine.history(req.id, AuditPageRequest::first()).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(
            page.events[0].reason.as_deref(),
            Some("duplicate of an open request")
        );
        assert_eq!(page.events[0].actor_role, Role::Supervisor);
    }

    #[tokio::test]
    async fn test_overlong_reason_rejected() {
        let policy = WorkflowPolicy {
            max_reason_len: 10,
            ..WorkflowPolicy::default()
        };
        let engine = WorkflowEngine::new(Arc::new(MemoryStore::new()), policy);
        let req = submitted(&engine).await;
        let err = engine
            .apply(
                TransitionCommand::new(req.id, "triage", actor(Role::Clerk), 0)
                    .with_reason("x".repeat(11)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_policy_can_require_more_reasons() {
        let policy = WorkflowPolicy {
            reason_required: vec![Action::Reject, Action::Reopen],
            ..WorkflowPolicy::default()
        };
        let engine = WorkflowEngine::new(Arc::new(MemoryStore::new()), policy);
        let req = submitted(&engine).await;
        let resolved = drive(
            &engine,
            req.id,
            &[
                ("triage", Role::Clerk),
                ("start", Role::FieldAgent),
                ("resolve", Role::FieldAgent),
            ],
        )
        .await;
        let err = engine
            .apply(TransitionCommand::new(req.id, "reopen", actor(Role::Clerk), resolved.version))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_reject_gated_even_when_policy_omits_it() {
        let policy = WorkflowPolicy {
            reason_required: vec![Action::Triage],
            ..WorkflowPolicy::default()
        };
        assert!(policy.requires_reason(Action::Reject));

        let engine = WorkflowEngine::new(Arc::new(MemoryStore::new()), policy);
        let req = submitted(&engine).await;
        let err = engine
            .apply(TransitionCommand::new(req.id, "reject", actor(Role::Clerk), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(engine.get(req.id).await.unwrap().status, RequestStatus::Submitted);
    }

    // ─── Effects ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_triage_assigns_and_keeps_prior_values() {
        let engine = engine();
        let req = submitted(&engine).await;
        let assignee = ActorId::new();
        let dept = DepartmentId::new("public-works").unwrap();

        let triaged = engine
            .apply(
                TransitionCommand::new(req.id, "triage", actor(Role::Clerk), 0)
                    .with_assignment(Some(assignee), Some(dept.clone())),
            )
            .await
            .unwrap();
        assert_eq!(triaged.assignee_id, Some(assignee));
        assert_eq!(triaged.department_id, Some(dept));
    }

    #[tokio::test]
    async fn test_assignment_on_non_assign_action_rejected() {
        let engine = engine();
        let req = submitted(&engine).await;
        drive(&engine, req.id, &[("triage", Role::Clerk)]).await;
        let err = engine
            .apply(
                TransitionCommand::new(req.id, "start", actor(Role::FieldAgent), 1)
                    .with_assignment(Some(ActorId::new()), None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_close_sets_and_reopen_clears_closed_at() {
        let engine = engine();
        let req = submitted(&engine).await;
        let resolved = drive(
            &engine,
            req.id,
            &[
                ("triage", Role::Clerk),
                ("start", Role::FieldAgent),
                ("resolve", Role::FieldAgent),
            ],
        )
        .await;
        assert!(resolved.closed_at.is_none());

        let reopened = drive(&engine, req.id, &[("reopen", Role::Clerk)]).await;
        assert_eq!(reopened.status, RequestStatus::InProgress);
        assert!(reopened.closed_at.is_none());

        let closed = drive(
            &engine,
            req.id,
            &[("resolve", Role::Supervisor), ("close", Role::Clerk)],
        )
        .await;
        assert_eq!(closed.status, RequestStatus::Closed);
        assert!(closed.closed_at.is_some());
    }

    // ─── Audit ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_audit_sequence_is_gapless() {
        let engine = engine();
        let req = submitted(&engine).await;
        let steps = [
            ("triage", Role::Clerk),
            ("start", Role::FieldAgent),
            ("wait_for_citizen", Role::FieldAgent),
            ("resume_progress", Role::Clerk),
            ("resolve", Role::FieldAgent),
            ("reopen", Role::Supervisor),
            ("resolve", Role::Admin),
            ("close", Role::Clerk),
        ];
        let last = drive(&engine, req.id, &steps).await;
        assert_eq!(last.version, steps.len() as u64);

        // A refused attempt in between must not leave a gap.
        let _ = engine
            .apply(TransitionCommand::new(req.id, "reopen", actor(Role::Clerk), last.version))
            .await
            .unwrap_err();

        let page = engine.history(req.id, AuditPageRequest::first()).await.unwrap();
        let seqs: Vec<u64> = page.events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, (1..=steps.len() as u64).collect::<Vec<_>>());
        assert!(verify_chain(&page.events).is_valid());
        assert_eq!(page.events[0].from_status, RequestStatus::Submitted);
        assert_eq!(page.events[7].to_status, RequestStatus::Closed);
    }

    // ─── Concurrency ────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_apply_exactly_one_wins() {
        let engine = engine();
        let req = submitted(&engine).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .apply(TransitionCommand::new(req.id, "triage", actor(Role::Clerk), 0))
                    .await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(updated) => {
                    wins += 1;
                    assert_eq!(updated.version, 1);
                }
                Err(e) => {
                    assert!(e.is_retryable(), "unexpected error {e:?}");
                    conflicts += 1;
                }
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);

        let page = engine.history(req.id, AuditPageRequest::first()).await.unwrap();
        assert_eq!(page.events.len(), 1);
    }

    // ─── Details Edits ──────────────────────────────────────────────

    fn retitle(id: RequestId, actor: Actor, version: u64) -> EditCommand {
        EditCommand {
            request_id: id,
            actor,
            expected_version: version,
            patch: DetailsPatch {
                title: Some("Pothole on Elm Street".to_string()),
                ..DetailsPatch::default()
            },
        }
    }

    #[tokio::test]
    async fn test_creator_edits_submitted_request() {
        let engine = engine();
        let creator = actor(Role::Citizen);
        let req = engine.submit(&creator, details()).await.unwrap();

        let edited = engine.edit_details(retitle(req.id, creator, 0)).await.unwrap();
        assert_eq!(edited.version, 1);
        assert_eq!(edited.details.title, "Pothole on Elm Street");
        assert_eq!(edited.status, RequestStatus::Submitted);

        let page = engine.history(req.id, AuditPageRequest::first()).await.unwrap();
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn test_creator_cannot_edit_after_triage() {
        let engine = engine();
        let creator = actor(Role::Citizen);
        let req = engine.submit(&creator, details()).await.unwrap();
        drive(&engine, req.id, &[("triage", Role::Clerk)]).await;

        let err = engine.edit_details(retitle(req.id, creator, 1)).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_other_citizen_cannot_edit() {
        let engine = engine();
        let req = submitted(&engine).await;
        let err = engine
            .edit_details(retitle(req.id, actor(Role::Citizen), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let err = engine
            .edit_details(retitle(req.id, actor(Role::FieldAgent), 0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_staff_edits_until_terminal() {
        let engine = engine();
        let req = submitted(&engine).await;
        let in_progress = drive(&engine, req.id, &[("triage", Role::Clerk), ("start", Role::FieldAgent)]).await;

        let edited = engine
            .edit_details(retitle(req.id, actor(Role::Supervisor), in_progress.version))
            .await
            .unwrap();
        assert_eq!(edited.version, 3);

        let rejected = drive(&engine, req.id, &[("reject", Role::Clerk)]).await;
        let err = engine
            .edit_details(retitle(req.id, actor(Role::Admin), rejected.version))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_stale_edit_is_conflict() {
        let engine = engine();
        let creator = actor(Role::Citizen);
        let req = engine.submit(&creator, details()).await.unwrap();
        engine.edit_details(retitle(req.id, creator.clone(), 0)).await.unwrap();
        let err = engine.edit_details(retitle(req.id, creator, 0)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_or_invalid_patch_rejected() {
        let engine = engine();
        let creator = actor(Role::Citizen);
        let req = engine.submit(&creator, details()).await.unwrap();

        let mut cmd = retitle(req.id, creator.clone(), 0);
        cmd.patch = DetailsPatch::default();
        assert_eq!(engine.edit_details(cmd).await.unwrap_err().code(), "VALIDATION_ERROR");

        let mut cmd = retitle(req.id, creator, 0);
        cmd.patch.title = Some(" ".to_string());
        assert_eq!(engine.edit_details(cmd).await.unwrap_err().code(), "VALIDATION_ERROR");
    }

    // ─── Queries ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_submit_validates_details() {
        let engine = engine();
        let mut bad = details();
        bad.category = String::new();
        let err = engine.submit(&actor(Role::Citizen), bad).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_available_actions_follow_role() {
        let engine = engine();
        let req = submitted(&engine).await;

        let (_, clerk) = engine.available_actions(req.id, Role::Clerk).await.unwrap();
        let names: Vec<&str> = clerk.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(names, vec!["triage", "request_more_info", "reject"]);

        let (_, citizen) = engine.available_actions(req.id, Role::Citizen).await.unwrap();
        assert!(citizen.is_empty());
    }

    #[tokio::test]
    async fn test_ping_succeeds_on_memory_store() {
        assert!(engine().ping().await.is_ok());
    }
}
