//! # Request Status
//!
//! The lifecycle states of a service request.
//!
//! ```text
//! SUBMITTED ──triage──▶ TRIAGED ──start──▶ IN_PROGRESS ──resolve──▶ RESOLVED ──close──▶ CLOSED
//!     │                    │                 │    ▲                    │
//!     │                    │                 │    └──────reopen────────┘
//!     │                    │                 ▼
//!     └──request_more_info─┴──────────▶ WAITING_ON_CITIZEN ──close_no_response──▶ CLOSED
//!
//! SUBMITTED / TRIAGED / IN_PROGRESS ──reject──▶ REJECTED
//! ```
//!
//! The arrows are owned by [`crate::table`]; this module only names the states.

use serde::{Deserialize, Serialize};

/// The lifecycle status of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Filed by a citizen, not yet looked at.
    Submitted,
    /// Routed to a department and (optionally) an assignee.
    Triaged,
    /// Work is underway.
    InProgress,
    /// Blocked on information from the citizen.
    WaitingOnCitizen,
    /// Work is done, awaiting confirmation.
    Resolved,
    /// Closed (terminal).
    Closed,
    /// Rejected (terminal).
    Rejected,
}

impl RequestStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [RequestStatus; 7] = [
        RequestStatus::Submitted,
        RequestStatus::Triaged,
        RequestStatus::InProgress,
        RequestStatus::WaitingOnCitizen,
        RequestStatus::Resolved,
        RequestStatus::Closed,
        RequestStatus::Rejected,
    ];

    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Triaged => "TRIAGED",
            Self::InProgress => "IN_PROGRESS",
            Self::WaitingOnCitizen => "WAITING_ON_CITIZEN",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Convert a canonical status name back into a `RequestStatus`.
    ///
    /// Only the exact upper-case names are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Whether this status is terminal. Terminal requests accept no actions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
