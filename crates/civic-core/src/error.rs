//! # Error Hierarchy
//!
//! Validation errors raised when constructing domain primitives from
//! untrusted input (headers, request bodies, CLI arguments).

use thiserror::Error;

/// Validation errors for domain primitive newtypes.
///
/// Each variant carries the rejected input so operators can diagnose
/// misconfiguration without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier is not a valid UUID.
    #[error("invalid {kind} identifier: \"{value}\" (expected a UUID)")]
    InvalidIdentifier {
        /// Which identifier kind was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Department identifier is empty or malformed.
    #[error("invalid department ID: \"{0}\" (expected 1-64 characters of [A-Za-z0-9_-])")]
    InvalidDepartmentId(String),

    /// Role name is not one of the known roles.
    #[error("unknown role: \"{0}\" (expected citizen, clerk, field_agent, supervisor, or admin)")]
    UnknownRole(String),
}
