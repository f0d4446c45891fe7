//! # Request State Store
//!
//! The persistence seam of the workflow. The engine owns the decision of
//! *what* to write; a store owns *how* to write it atomically.
//!
//! `commit` is the only mutation path for an existing request. It is a
//! compare-and-swap on the version counter: the store applies the mutation
//! only if the stored version equals `expected_version`, sets the new version
//! to `expected_version + 1`, and appends the optional audit draft in the same
//! atomic unit. Nothing is ever partially applied.

use async_trait::async_trait;
use civic_core::RequestId;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditDraft, AuditPage, AuditPageRequest};
use crate::error::StoreError;
use crate::request::ServiceRequest;
use crate::status::RequestStatus;

/// The new state of a request plus the audit record of how it got there.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Request state to persist. The store overwrites `version` and keeps
    /// the stored `id`, `creator_id` and `created_at`.
    pub next: ServiceRequest,
    /// Audit draft to append in the same commit. Field edits carry none.
    pub audit: Option<AuditDraft>,
}

/// Listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only requests in this status.
    pub status: Option<RequestStatus>,
    /// Page size.
    pub limit: usize,
    /// Number of requests to skip.
    pub offset: usize,
}

impl ListFilter {
    /// Default page size.
    pub const DEFAULT_LIMIT: usize = 100;
    /// Largest page a caller may request.
    pub const MAX_LIMIT: usize = 1000;

    /// Build a filter, clamping `limit` into `1..=MAX_LIMIT`.
    pub fn new(status: Option<RequestStatus>, limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            status,
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for ListFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Owns persisted request records.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a newly created request.
    async fn insert(&self, request: ServiceRequest) -> Result<ServiceRequest, StoreError>;

    /// Read the current state of a request.
    async fn load(&self, id: RequestId) -> Result<ServiceRequest, StoreError>;

    /// Atomically apply `mutation` if the stored version is `expected_version`.
    async fn commit(
        &self,
        id: RequestId,
        expected_version: u64,
        mutation: Mutation,
    ) -> Result<ServiceRequest, StoreError>;

    /// Requests matching `filter`, newest first.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ServiceRequest>, StoreError>;
}

/// Read side of the per-request audit log. Appends happen only in
/// [`RequestStore::commit`].
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// One page of a request's history in ascending sequence order.
    /// Unknown requests are `NotFound`, not an empty page.
    async fn list_for(
        &self,
        id: RequestId,
        page: AuditPageRequest,
    ) -> Result<AuditPage, StoreError>;
}

/// A backend providing both requests and their audit log.
pub trait WorkflowStore: RequestStore + AuditLog {}

impl<T: RequestStore + AuditLog> WorkflowStore for T {}
