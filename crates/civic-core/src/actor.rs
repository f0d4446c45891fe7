//! # Actors and Roles
//!
//! The authenticated principal as seen by the workflow: who they are, which
//! role they act in, and which department they belong to. Token issuance and
//! session handling live outside this stack; the API layer decodes an
//! [`Actor`] from the bearer token and the core trusts it as-is.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{ActorId, DepartmentId};

/// Roles recognised by the service-request workflow.
///
/// Deliberately not `Ord`: there is no hierarchy. A supervisor may perform an
/// action only because the transition table lists `SUPERVISOR` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Resident who files requests.
    Citizen,
    /// Front-desk staff: triage and administrative transitions.
    Clerk,
    /// Crew member performing the work on site.
    FieldAgent,
    /// Department supervisor.
    Supervisor,
    /// System administrator.
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::Citizen,
        Role::Clerk,
        Role::FieldAgent,
        Role::Supervisor,
        Role::Admin,
    ];

    /// Canonical upper-case name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Citizen => "CITIZEN",
            Self::Clerk => "CLERK",
            Self::FieldAgent => "FIELD_AGENT",
            Self::Supervisor => "SUPERVISOR",
            Self::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses both the canonical form (`FIELD_AGENT`) and the token form
/// (`field_agent`).
impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CITIZEN" => Ok(Self::Citizen),
            "CLERK" => Ok(Self::Clerk),
            "FIELD_AGENT" => Ok(Self::FieldAgent),
            "SUPERVISOR" => Ok(Self::Supervisor),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

/// An authenticated principal acting on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier of the principal.
    pub actor_id: ActorId,
    /// Role the principal acts in for this request.
    pub role: Role,
    /// Department affiliation, if any. Citizens have none.
    pub department_id: Option<DepartmentId>,
}

impl Actor {
    /// Build an actor without a department affiliation.
    pub fn new(actor_id: ActorId, role: Role) -> Self {
        Self {
            actor_id,
            role,
            department_id: None,
        }
    }

    /// Attach a department affiliation.
    pub fn with_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }
}
