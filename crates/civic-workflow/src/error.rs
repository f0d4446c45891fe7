//! # Workflow Errors
//!
//! Typed failures of the lifecycle engine and of the request store.
//!
//! Every [`WorkflowError`] carries a stable machine-readable [`code`]
//! (`NOT_FOUND`, `INVALID_TRANSITION`, ...). Only `VERSION_CONFLICT` is
//! retryable, and only after the caller re-reads the request.
//!
//! [`code`]: WorkflowError::code

use civic_core::{RequestId, Role};
use thiserror::Error;

use crate::action::Action;
use crate::status::RequestStatus;

/// Errors returned by a [`crate::store::RequestStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No request with this id.
    #[error("service request {0} not found")]
    NotFound(RequestId),

    /// The stored version differs from the caller's base version.
    #[error("version conflict on service request {id}: expected {expected}, stored {current}")]
    VersionConflict {
        /// The request.
        id: RequestId,
        /// Version the caller based its write on.
        expected: u64,
        /// Version actually stored.
        current: u64,
    },

    /// A request with this id already exists.
    #[error("service request {0} already exists")]
    AlreadyExists(RequestId),

    /// The backend failed. Nothing was applied.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors returned by [`crate::engine::WorkflowEngine`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// The request does not exist.
    #[error("service request {0} not found")]
    NotFound(RequestId),

    /// `(status, action)` is not in the transition table. Also covers unknown
    /// action names.
    #[error("action '{action}' is not a valid transition from {status}")]
    InvalidTransition {
        /// Status of the request when the action was attempted.
        status: RequestStatus,
        /// Action name as supplied by the caller.
        action: String,
    },

    /// The caller's role is not listed for this transition or edit.
    #[error("role {role} is not permitted to {operation}")]
    Forbidden {
        /// The caller's role.
        role: Role,
        /// What was attempted, e.g. `reject from SUBMITTED`.
        operation: String,
    },

    /// The caller's expected version is stale.
    #[error("version conflict on service request {id}: expected {expected}, current {current}")]
    VersionConflict {
        /// The request.
        id: RequestId,
        /// Version supplied by the caller.
        expected: u64,
        /// Version currently stored.
        current: u64,
    },

    /// Input failed a business rule (e.g. `reject` without a reason).
    #[error("validation error: {0}")]
    Validation(String),

    /// The store failed; nothing was applied.
    #[error("store error: {0}")]
    Store(String),
}

impl WorkflowError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Whether a caller may retry after re-reading the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub(crate) fn forbidden(role: Role, action: Action, status: RequestStatus) -> Self {
        Self::Forbidden {
            role,
            operation: format!("{action} from {status}"),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::VersionConflict {
                id,
                expected,
                current,
            } => Self::VersionConflict {
                id,
                expected,
                current,
            },
            StoreError::AlreadyExists(_) | StoreError::Backend(_) => Self::Store(err.to_string()),
        }
    }
}
