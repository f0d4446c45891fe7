//! # In-Memory Store
//!
//! [`WorkflowStore`](crate::store::WorkflowStore) backed by a `parking_lot`
//! `RwLock<HashMap>`. Used by tests and by the API server when no database
//! is configured.
//!
//! Every operation takes the lock for a single synchronous record operation
//! and releases it before returning; the lock is never held across `.await`.
//! `parking_lot::RwLock` does not poison, so a panicking writer cannot wedge
//! the store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use civic_core::RequestId;
use parking_lot::RwLock;

use crate::audit::{AuditEvent, AuditPage, AuditPageRequest, GENESIS_HASH};
use crate::error::StoreError;
use crate::request::ServiceRequest;
use crate::store::{AuditLog, ListFilter, Mutation, RequestStore};

#[derive(Debug, Clone)]
struct Entry {
    request: ServiceRequest,
    audit: Vec<AuditEvent>,
}

/// Thread-safe, cloneable in-memory request store with per-request audit log.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<RequestId, Entry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically read-validate-update one entry under a single write lock.
    fn try_update<R>(
        &self,
        id: RequestId,
        f: impl FnOnce(&mut Entry) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(entry)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert(&self, request: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let mut guard = self.data.write();
        if guard.contains_key(&request.id) {
            return Err(StoreError::AlreadyExists(request.id));
        }
        guard.insert(
            request.id,
            Entry {
                request: request.clone(),
                audit: Vec::new(),
            },
        );
        Ok(request)
    }

    async fn load(&self, id: RequestId) -> Result<ServiceRequest, StoreError> {
        self.data
            .read()
            .get(&id)
            .map(|e| e.request.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn commit(
        &self,
        id: RequestId,
        expected_version: u64,
        mutation: Mutation,
    ) -> Result<ServiceRequest, StoreError> {
        self.try_update(id, |entry| {
            let current = entry.request.version;
            if current != expected_version {
                return Err(StoreError::VersionConflict {
                    id,
                    expected: expected_version,
                    current,
                });
            }

            let mut next = mutation.next;
            next.id = entry.request.id;
            next.creator_id = entry.request.creator_id;
            next.created_at = entry.request.created_at;
            next.version = expected_version + 1;

            // Seal before touching the entry so a failure leaves it untouched.
            let sealed = mutation.audit.map(|draft| {
                let previous_hash = entry
                    .audit
                    .last()
                    .map_or(GENESIS_HASH, |e| e.event_hash.as_str());
                let sequence = entry.audit.len() as u64 + 1;
                draft.seal(id, sequence, previous_hash)
            });

            entry.request = next.clone();
            if let Some(event) = sealed {
                entry.audit.push(event);
            }
            Ok(next)
        })
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ServiceRequest>, StoreError> {
        let mut matching: Vec<ServiceRequest> = self
            .data
            .read()
            .values()
            .filter(|e| filter.status.map_or(true, |s| e.request.status == s))
            .map(|e| e.request.clone())
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn list_for(
        &self,
        id: RequestId,
        page: AuditPageRequest,
    ) -> Result<AuditPage, StoreError> {
        let guard = self.data.read();
        let entry = guard.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(AuditPage::from_history(&entry.audit, page))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use civic_core::{ActorId, Role};

    use super::*;
    use crate::action::Action;
    use crate::audit::{verify_chain, AuditDraft};
    use crate::request::fixtures::details;
    use crate::status::RequestStatus;

    fn submitted() -> ServiceRequest {
        ServiceRequest::submitted(ActorId::new(), details(), Utc::now())
    }

    fn triage(req: &ServiceRequest) -> Mutation {
        let mut next = req.clone();
        next.status = RequestStatus::Triaged;
        Mutation {
            next,
            audit: Some(AuditDraft {
                action: Action::Triage,
                from_status: RequestStatus::Submitted,
                to_status: RequestStatus::Triaged,
                actor_id: ActorId::new(),
                actor_role: Role::Clerk,
                reason: None,
                created_at: Utc::now(),
            }),
        }
    }

    #[tokio::test]
    async fn insert_then_load() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        assert_eq!(store.load(req.id).await.unwrap(), req);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        let err = store.insert(req.clone()).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(req.id));
    }

    #[tokio::test]
    async fn load_unknown_is_not_found() {
        let store = MemoryStore::new();
        let id = RequestId::new();
        assert_eq!(store.load(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn commit_bumps_version_and_appends_audit() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();

        let updated = store.commit(req.id, 0, triage(&req)).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.status, RequestStatus::Triaged);

        let page = store.list_for(req.id, AuditPageRequest::first()).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].sequence_number, 1);
        assert_eq!(page.events[0].previous_hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn stale_commit_is_conflict_and_changes_nothing() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        store.commit(req.id, 0, triage(&req)).await.unwrap();

        let err = store.commit(req.id, 0, triage(&req)).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                id: req.id,
                expected: 0,
                current: 1
            }
        );
        assert_eq!(store.load(req.id).await.unwrap().version, 1);
        let page = store.list_for(req.id, AuditPageRequest::first()).await.unwrap();
        assert_eq!(page.events.len(), 1);
    }

    #[tokio::test]
    async fn commit_cannot_rewrite_identity_fields() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        let mut mutation = triage(&req);
        mutation.next.creator_id = ActorId::new();
        mutation.next.created_at = req.created_at + Duration::days(1);
        mutation.next.version = 42;

        let updated = store.commit(req.id, 0, mutation).await.unwrap();
        assert_eq!(updated.creator_id, req.creator_id);
        assert_eq!(updated.created_at, req.created_at);
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn commit_without_audit_keeps_history_empty() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        let mut next = req.clone();
        next.details.title = "Edited".to_string();
        store
            .commit(req.id, 0, Mutation { next, audit: None })
            .await
            .unwrap();
        let page = store.list_for(req.id, AuditPageRequest::first()).await.unwrap();
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn audit_chain_verifies_across_commits() {
        let store = MemoryStore::new();
        let req = store.insert(submitted()).await.unwrap();
        for v in 0..4 {
            store.commit(req.id, v, triage(&req)).await.unwrap();
        }
        let page = store.list_for(req.id, AuditPageRequest::first()).await.unwrap();
        let seqs: Vec<u64> = page.events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(verify_chain(&page.events).is_valid());
    }

    #[tokio::test]
    async fn history_of_unknown_request_is_not_found() {
        let store = MemoryStore::new();
        let id = RequestId::new();
        let err = store.list_for(id, AuditPageRequest::first()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for i in 0..3 {
            let req = ServiceRequest::submitted(ActorId::new(), details(), now + Duration::seconds(i));
            ids.push(store.insert(req).await.unwrap().id);
        }
        let first = store.load(ids[0]).await.unwrap();
        store.commit(ids[0], 0, triage(&first)).await.unwrap();

        let submitted = store
            .list(&ListFilter::new(Some(RequestStatus::Submitted), None, None))
            .await
            .unwrap();
        let listed: Vec<RequestId> = submitted.iter().map(|r| r.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);

        let paged = store.list(&ListFilter::new(None, Some(1), Some(1))).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, ids[1]);
    }
}
