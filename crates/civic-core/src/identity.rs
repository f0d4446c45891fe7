//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers used throughout the stack.
//!
//! UUID-based identifiers ([`RequestId`], [`ActorId`]) are always valid by
//! construction; parsing from strings returns a [`ValidationError`].
//! [`DepartmentId`] is a short slug validated at construction.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers
// ---------------------------------------------------------------------------

/// Opaque, immutable identifier of a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random request identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a request identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentifier {
                kind: "request",
                value: s.to_string(),
            })
    }
}

/// Identifier of an authenticated principal (citizen or staff member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Create a new random actor identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an actor identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActorId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidIdentifier {
                kind: "actor",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// String-based identifiers (validated at construction)
// ---------------------------------------------------------------------------

/// Municipal department slug, e.g. `public-works` or `street_lighting`.
///
/// 1 to 64 characters drawn from ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DepartmentId(String);

impl DepartmentId {
    const MAX_LEN: usize = 64;

    /// Create a validated department identifier.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let valid = !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidDepartmentId(s))
        }
    }

    /// Return the department identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DepartmentId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DepartmentId> for String {
    fn from(value: DepartmentId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_parses_uuid() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn request_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<RequestId>().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidIdentifier { kind: "request", .. }
        ));
    }

    #[test]
    fn actor_id_rejects_garbage() {
        let err = "42".parse::<ActorId>().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidIdentifier { kind: "actor", .. }
        ));
    }

    #[test]
    fn request_id_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&RequestId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn department_accepts_slugs() {
        assert!(DepartmentId::new("public-works").is_ok());
        assert!(DepartmentId::new("street_lighting").is_ok());
        assert!(DepartmentId::new("PW1").is_ok());
    }

    #[test]
    fn department_rejects_empty_and_spaces() {
        assert!(DepartmentId::new("").is_err());
        assert!(DepartmentId::new("public works").is_err());
        assert!(DepartmentId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn department_deserialization_validates() {
        let ok: DepartmentId = serde_json::from_str("\"parks\"").unwrap();
        assert_eq!(ok.as_str(), "parks");
        assert!(serde_json::from_str::<DepartmentId>("\"bad slug!\"").is_err());
    }
}
