//! # Transition Table
//!
//! The single declarative source of truth for the workflow: for every legal
//! `(status, action)` pair, the resulting status, the roles allowed to invoke
//! it, and the side effects the commit applies.
//!
//! The table is closed-world. A pair that is not listed is an invalid
//! transition, whatever the action or the caller's role. Terminal statuses
//! (`CLOSED`, `REJECTED`) have no rows at all.
//!
//! Role sets are explicit per row. A role is authorized only if it appears in
//! the row; there is no role hierarchy.

use civic_core::Role;
use serde::Serialize;

use crate::action::Action;
use crate::status::RequestStatus;

use civic_core::Role::{Admin, Clerk, FieldAgent, Supervisor};

/// Side effect applied by the commit of a transition, beyond the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Status change only.
    None,
    /// Sets assignee and/or department from the command.
    Assign,
    /// Stamps `closed_at`.
    Close,
    /// Clears `closed_at`.
    Reopen,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    /// Status the request must be in.
    pub from: RequestStatus,
    /// Action being requested.
    pub action: Action,
    /// Status after the commit.
    pub to: RequestStatus,
    /// Roles allowed to invoke this transition.
    pub authorized_roles: &'static [Role],
    /// Side effect applied on commit.
    pub effect: Effect,
}

impl TransitionRule {
    /// Whether `role` is explicitly listed for this transition.
    pub fn authorizes(&self, role: Role) -> bool {
        self.authorized_roles.contains(&role)
    }
}

const DESK: &[Role] = &[Clerk, Supervisor, Admin];
const DESK_AND_FIELD: &[Role] = &[Clerk, FieldAgent, Supervisor, Admin];
const FIELD: &[Role] = &[FieldAgent, Supervisor, Admin];

const fn rule(
    from: RequestStatus,
    action: Action,
    to: RequestStatus,
    authorized_roles: &'static [Role],
    effect: Effect,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to,
        authorized_roles,
        effect,
    }
}

/// Every legal transition.
pub static TRANSITIONS: [TransitionRule; 14] = {
    use Action::*;
    use RequestStatus::*;
    [
        rule(Submitted, Triage, Triaged, DESK, Effect::Assign),
        rule(Submitted, RequestMoreInfo, WaitingOnCitizen, DESK, Effect::None),
        rule(Submitted, Reject, Rejected, DESK, Effect::Close),
        rule(Triaged, Start, InProgress, DESK_AND_FIELD, Effect::None),
        rule(Triaged, RequestMoreInfo, WaitingOnCitizen, DESK, Effect::None),
        rule(Triaged, Reject, Rejected, DESK, Effect::Close),
        rule(InProgress, Resolve, Resolved, FIELD, Effect::None),
        rule(InProgress, WaitForCitizen, WaitingOnCitizen, FIELD, Effect::None),
        rule(InProgress, RequestMoreInfo, WaitingOnCitizen, FIELD, Effect::None),
        rule(InProgress, Reject, Rejected, DESK, Effect::Close),
        rule(WaitingOnCitizen, ResumeProgress, InProgress, DESK, Effect::None),
        rule(WaitingOnCitizen, CloseNoResponse, Closed, DESK, Effect::Close),
        rule(Resolved, Close, Closed, DESK, Effect::Close),
        rule(Resolved, Reopen, InProgress, DESK, Effect::Reopen),
    ]
};

/// All rules, in declaration order.
pub fn rules() -> &'static [TransitionRule] {
    &TRANSITIONS
}

/// Find the rule for `(from, action)`, if the pair is legal.
pub fn lookup(from: RequestStatus, action: Action) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.action == action)
}

/// Rules leaving `from`, regardless of role.
pub fn actions_from(from: RequestStatus) -> impl Iterator<Item = &'static TransitionRule> {
    TRANSITIONS.iter().filter(move |r| r.from == from)
}

/// Rules leaving `from` that `role` may invoke.
pub fn permitted_actions(
    from: RequestStatus,
    role: Role,
) -> impl Iterator<Item = &'static TransitionRule> {
    actions_from(from).filter(move |r| r.authorizes(role))
}
