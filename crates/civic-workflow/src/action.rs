//! # Workflow Actions
//!
//! The named actions a caller may request. Whether an action is legal for a
//! given status, and for which roles, is decided solely by
//! [`crate::table`].

use serde::{Deserialize, Serialize};

/// A named workflow action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Route a new request to a department.
    Triage,
    /// Ask the citizen for more information.
    RequestMoreInfo,
    /// Decline the request. Requires a reason by default.
    Reject,
    /// Begin work.
    Start,
    /// Mark the work as done.
    Resolve,
    /// Pause work until the citizen responds.
    WaitForCitizen,
    /// Resume work after the citizen responded.
    ResumeProgress,
    /// Close a request whose citizen never responded.
    CloseNoResponse,
    /// Close a resolved request.
    Close,
    /// Send a resolved request back to work.
    Reopen,
}

impl Action {
    /// Every action.
    pub const ALL: [Action; 10] = [
        Action::Triage,
        Action::RequestMoreInfo,
        Action::Reject,
        Action::Start,
        Action::Resolve,
        Action::WaitForCitizen,
        Action::ResumeProgress,
        Action::CloseNoResponse,
        Action::Close,
        Action::Reopen,
    ];

    /// The wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::RequestMoreInfo => "request_more_info",
            Self::Reject => "reject",
            Self::Start => "start",
            Self::Resolve => "resolve",
            Self::WaitForCitizen => "wait_for_citizen",
            Self::ResumeProgress => "resume_progress",
            Self::CloseNoResponse => "close_no_response",
            Self::Close => "close",
            Self::Reopen => "reopen",
        }
    }

    /// Resolve a wire name. Unknown names yield `None`; the engine reports
    /// them as invalid transitions, not as malformed input.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
