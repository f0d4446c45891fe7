//! # Service Request Record
//!
//! The persisted state of a request as owned by the request store. Status,
//! version, and the timestamps are only ever changed through a store
//! `commit`; see [`crate::engine`].

use chrono::{DateTime, Utc};
use civic_core::{ActorId, DepartmentId, RequestId};
use serde::{Deserialize, Serialize};

use crate::status::RequestStatus;

/// Citizen-supplied description of the issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    /// Short summary, e.g. "Pothole on Elm St".
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Category slug, e.g. `pothole`, `streetlight`.
    pub category: String,
    /// Free-text location (address or cross streets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RequestDetails {
    /// Maximum title length in characters.
    pub const MAX_TITLE_LEN: usize = 200;
    /// Maximum description length in characters.
    pub const MAX_DESCRIPTION_LEN: usize = 5000;
    /// Maximum category length in characters.
    pub const MAX_CATEGORY_LEN: usize = 64;
    /// Maximum location length in characters.
    pub const MAX_LOCATION_LEN: usize = 500;

    /// Check field constraints. Returns a human-readable message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.title.chars().count() > Self::MAX_TITLE_LEN {
            return Err(format!(
                "title must not exceed {} characters",
                Self::MAX_TITLE_LEN
            ));
        }
        if self.description.chars().count() > Self::MAX_DESCRIPTION_LEN {
            return Err(format!(
                "description must not exceed {} characters",
                Self::MAX_DESCRIPTION_LEN
            ));
        }
        if self.category.trim().is_empty() {
            return Err("category must not be empty".to_string());
        }
        if self.category.chars().count() > Self::MAX_CATEGORY_LEN {
            return Err(format!(
                "category must not exceed {} characters",
                Self::MAX_CATEGORY_LEN
            ));
        }
        if let Some(location) = &self.location {
            if location.chars().count() > Self::MAX_LOCATION_LEN {
                return Err(format!(
                    "location must not exceed {} characters",
                    Self::MAX_LOCATION_LEN
                ));
            }
        }
        Ok(())
    }
}

/// Partial update of [`RequestDetails`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New category.
    #[serde(default)]
    pub category: Option<String>,
    /// New location.
    #[serde(default)]
    pub location: Option<String>,
}

impl DetailsPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.location.is_none()
    }

    /// Apply the patch to a copy of `details`.
    pub fn apply_to(&self, details: &RequestDetails) -> RequestDetails {
        let mut next = details.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(category) = &self.category {
            next.category = category.clone();
        }
        if let Some(location) = &self.location {
            next.location = Some(location.clone());
        }
        next
    }
}

/// A service request as held by the request store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Immutable identifier.
    pub id: RequestId,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Optimistic-concurrency version. 0 on creation, +1 per commit.
    pub version: u64,
    /// Citizen who filed the request. Never changes.
    pub creator_id: ActorId,
    /// Staff member the request is assigned to.
    pub assignee_id: Option<ActorId>,
    /// Department the request is routed to.
    pub department_id: Option<DepartmentId>,
    /// Citizen-supplied description.
    pub details: RequestDetails,
    /// When the request was filed.
    pub created_at: DateTime<Utc>,
    /// When the request was last committed.
    pub updated_at: DateTime<Utc>,
    /// When the request entered a terminal status.
    pub closed_at: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    /// A freshly filed request: `SUBMITTED`, version 0.
    pub fn submitted(creator_id: ActorId, details: RequestDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: RequestId::new(),
            status: RequestStatus::Submitted,
            version: 0,
            creator_id,
            assignee_id: None,
            department_id: None,
            details,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    /// Whether the request is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::details;
    use super::*;

    #[test]
    fn submitted_starts_at_version_zero() {
        let req = ServiceRequest::submitted(ActorId::new(), details(), Utc::now());
        assert_eq!(req.status, RequestStatus::Submitted);
        assert_eq!(req.version, 0);
        assert!(req.closed_at.is_none());
        assert!(req.assignee_id.is_none());
        assert_eq!(req.created_at, req.updated_at);
    }

    #[test]
    fn valid_details_pass() {
        assert!(details().validate().is_ok());
    }

    #[test]
    fn blank_title_rejected() {
        let mut d = details();
        d.title = "   ".to_string();
        assert!(d.validate().unwrap_err().contains("title"));
    }

    #[test]
    fn overlong_title_rejected() {
        let mut d = details();
        d.title = "x".repeat(RequestDetails::MAX_TITLE_LEN + 1);
        assert!(d.validate().is_err());
    }

    #[test]
    fn blank_category_rejected() {
        let mut d = details();
        d.category = String::new();
        assert!(d.validate().unwrap_err().contains("category"));
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let patch = DetailsPatch {
            title: Some("Pothole on Elm Street".to_string()),
            ..DetailsPatch::default()
        };
        let next = patch.apply_to(&details());
        assert_eq!(next.title, "Pothole on Elm Street");
        assert_eq!(next.category, "pothole");
        assert_eq!(next.location.as_deref(), Some("Elm St & 4th Ave"));
    }

    #[test]
    fn empty_patch_detected() {
        assert!(DetailsPatch::default().is_empty());
        let patch = DetailsPatch {
            location: Some("Oak".to_string()),
            ..DetailsPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn service_request_serialization() {
        let req = ServiceRequest::submitted(ActorId::new(), details(), Utc::now());
        let json = serde_json::to_string(&req).unwrap();
        let parsed: ServiceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);
        assert!(json.contains("\"SUBMITTED\""));
    }
}
