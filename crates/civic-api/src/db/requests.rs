//! Service request persistence.
//!
//! [`PgRequestStore`] implements the workflow store traits over two tables:
//! `service_requests` and `request_audit_events`. A commit is one
//! transaction: a conditional `UPDATE ... WHERE version = $expected`
//! followed by the audit insert. The row lock taken by the update
//! serializes concurrent commits on the same request, so sequence numbers
//! stay gapless and the hash chain stays linear.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_core::{ActorId, DepartmentId, RequestId, Role};
use civic_workflow::{
    Action, AuditEvent, AuditLog, AuditPage, AuditPageRequest, ListFilter, Mutation,
    RequestDetails, RequestStatus, RequestStore, ServiceRequest, StoreError, GENESIS_HASH,
};
use sqlx::PgPool;
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "id, status, version, creator_id, assignee_id, department_id, \
     title, description, category, location, created_at, updated_at, closed_at";

const AUDIT_COLUMNS: &str = "request_id, sequence_number, action, from_status, to_status, \
     actor_id, actor_role, reason, created_at, previous_hash, event_hash";

/// Postgres-backed request store and audit log.
#[derive(Debug, Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn to_i64(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{what} {value} overflows BIGINT")))
}

fn to_u64(value: i64, what: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("negative {what} {value} in database")))
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let result = sqlx::query(
            "INSERT INTO service_requests (id, status, version, creator_id, assignee_id, department_id,
                 title, description, category, location, created_at, updated_at, closed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(*request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(to_i64(request.version, "version")?)
        .bind(*request.creator_id.as_uuid())
        .bind(request.assignee_id.map(|a| *a.as_uuid()))
        .bind(request.department_id.as_ref().map(|d| d.as_str().to_string()))
        .bind(&request.details.title)
        .bind(&request.details.description)
        .bind(&request.details.category)
        .bind(&request.details.location)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.closed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(request.id));
        }
        Ok(request)
    }

    async fn load(&self, id: RequestId) -> Result<ServiceRequest, StoreError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_requests WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.ok_or(StoreError::NotFound(id))?.into_request()
    }

    async fn commit(
        &self,
        id: RequestId,
        expected_version: u64,
        mutation: Mutation,
    ) -> Result<ServiceRequest, StoreError> {
        let next = mutation.next;
        let new_version = expected_version
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("version counter exhausted".into()))?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query_as::<_, RequestRow>(&format!(
            "UPDATE service_requests
             SET status = $3, version = $4, assignee_id = $5, department_id = $6,
                 title = $7, description = $8, category = $9, location = $10,
                 updated_at = $11, closed_at = $12
             WHERE id = $1 AND version = $2
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(*id.as_uuid())
        .bind(to_i64(expected_version, "version")?)
        .bind(next.status.as_str())
        .bind(to_i64(new_version, "version")?)
        .bind(next.assignee_id.map(|a| *a.as_uuid()))
        .bind(next.department_id.as_ref().map(|d| d.as_str().to_string()))
        .bind(&next.details.title)
        .bind(&next.details.description)
        .bind(&next.details.category)
        .bind(&next.details.location)
        .bind(next.updated_at)
        .bind(next.closed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let Some(updated) = updated else {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM service_requests WHERE id = $1")
                    .bind(*id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(backend)?;
            tx.rollback().await.map_err(backend)?;
            return match current {
                None => Err(StoreError::NotFound(id)),
                Some(current) => Err(StoreError::VersionConflict {
                    id,
                    expected: expected_version,
                    current: to_u64(current, "version")?,
                }),
            };
        };

        if let Some(draft) = mutation.audit {
            let last: Option<(i64, String)> = sqlx::query_as(
                "SELECT sequence_number, event_hash FROM request_audit_events
                 WHERE request_id = $1 ORDER BY sequence_number DESC LIMIT 1",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;

            let (sequence, previous_hash) = match last {
                Some((seq, hash)) => (to_u64(seq, "sequence number")? + 1, hash),
                None => (1, GENESIS_HASH.to_string()),
            };
            let event = draft.seal(id, sequence, &previous_hash);

            sqlx::query(&format!(
                "INSERT INTO request_audit_events ({AUDIT_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(*event.request_id.as_uuid())
            .bind(to_i64(event.sequence_number, "sequence number")?)
            .bind(event.action.as_str())
            .bind(event.from_status.as_str())
            .bind(event.to_status.as_str())
            .bind(*event.actor_id.as_uuid())
            .bind(event.actor_role.as_str())
            .bind(&event.reason)
            .bind(event.created_at)
            .bind(&event.previous_hash)
            .bind(&event.event_hash)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        updated.into_request()
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ServiceRequest>, StoreError> {
        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_requests
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(to_i64(filter.limit as u64, "limit")?)
        .bind(to_i64(filter.offset as u64, "offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }
}

#[async_trait]
impl AuditLog for PgRequestStore {
    async fn list_for(
        &self,
        id: RequestId,
        page: AuditPageRequest,
    ) -> Result<AuditPage, StoreError> {
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM service_requests WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(id));
        }

        // One extra row tells us whether another page follows.
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM request_audit_events
             WHERE request_id = $1 AND sequence_number >= $2
             ORDER BY sequence_number ASC
             LIMIT $3"
        ))
        .bind(*id.as_uuid())
        .bind(to_i64(page.start_sequence(), "sequence number")?)
        .bind(to_i64(page.limit as u64 + 1, "limit")?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut events = rows
            .into_iter()
            .map(AuditRow::into_event)
            .collect::<Result<Vec<_>, _>>()?;
        let more = events.len() > page.limit;
        events.truncate(page.limit);
        let next_after = if more {
            events.last().map(|e| e.sequence_number)
        } else {
            None
        };
        Ok(AuditPage { events, next_after })
    }
}

// ── Row types ───────────────────────────────────────────────────────────────

fn parse_status(raw: &str) -> Result<RequestStatus, StoreError> {
    RequestStatus::from_name(raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown request status '{raw}' in database")))
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    status: String,
    version: i64,
    creator_id: Uuid,
    assignee_id: Option<Uuid>,
    department_id: Option<String>,
    title: String,
    description: String,
    category: String,
    location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    fn into_request(self) -> Result<ServiceRequest, StoreError> {
        let department_id = self
            .department_id
            .map(DepartmentId::new)
            .transpose()
            .map_err(|e| StoreError::Backend(format!("invalid department in database: {e}")))?;

        Ok(ServiceRequest {
            id: RequestId::from_uuid(self.id),
            status: parse_status(&self.status)?,
            version: to_u64(self.version, "version")?,
            creator_id: ActorId::from_uuid(self.creator_id),
            assignee_id: self.assignee_id.map(ActorId::from_uuid),
            department_id,
            details: RequestDetails {
                title: self.title,
                description: self.description,
                category: self.category,
                location: self.location,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            closed_at: self.closed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    request_id: Uuid,
    sequence_number: i64,
    action: String,
    from_status: String,
    to_status: String,
    actor_id: Uuid,
    actor_role: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    previous_hash: String,
    event_hash: String,
}

impl AuditRow {
    fn into_event(self) -> Result<AuditEvent, StoreError> {
        let action = Action::from_name(&self.action).ok_or_else(|| {
            StoreError::Backend(format!("unknown action '{}' in database", self.action))
        })?;
        let actor_role: Role = self
            .actor_role
            .parse()
            .map_err(|e| StoreError::Backend(format!("invalid actor role in database: {e}")))?;

        Ok(AuditEvent {
            request_id: RequestId::from_uuid(self.request_id),
            sequence_number: to_u64(self.sequence_number, "sequence number")?,
            action,
            from_status: parse_status(&self.from_status)?,
            to_status: parse_status(&self.to_status)?,
            actor_id: ActorId::from_uuid(self.actor_id),
            actor_role,
            reason: self.reason,
            created_at: self.created_at,
            previous_hash: self.previous_hash,
            event_hash: self.event_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_reject_out_of_range() {
        assert_eq!(to_i64(7, "version"), Ok(7));
        assert!(to_i64(u64::MAX, "version").is_err());
        assert_eq!(to_u64(7, "version"), Ok(7));
        assert!(to_u64(-1, "version").is_err());
    }

    #[test]
    fn request_row_maps_to_domain() {
        let now = Utc::now();
        let row = RequestRow {
            id: Uuid::new_v4(),
            status: "IN_PROGRESS".into(),
            version: 2,
            creator_id: Uuid::new_v4(),
            assignee_id: Some(Uuid::new_v4()),
            department_id: Some("streets".into()),
            title: "Broken light".into(),
            description: "Lamp post out".into(),
            category: "lighting".into(),
            location: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        let request = row.into_request().unwrap();
        assert_eq!(request.status, RequestStatus::InProgress);
        assert_eq!(request.version, 2);
        assert_eq!(request.department_id.unwrap().as_str(), "streets");
    }

    #[test]
    fn unknown_status_is_backend_error() {
        let now = Utc::now();
        let row = RequestRow {
            id: Uuid::new_v4(),
            status: "ARCHIVED".into(),
            version: 0,
            creator_id: Uuid::new_v4(),
            assignee_id: None,
            department_id: None,
            title: "t".into(),
            description: String::new(),
            category: "c".into(),
            location: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        assert!(matches!(row.into_request(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn audit_row_round_trips_hash_fields() {
        let row = AuditRow {
            request_id: Uuid::new_v4(),
            sequence_number: 1,
            action: "reject".into(),
            from_status: "SUBMITTED".into(),
            to_status: "REJECTED".into(),
            actor_id: Uuid::new_v4(),
            actor_role: "CLERK".into(),
            reason: Some("duplicate".into()),
            created_at: Utc::now(),
            previous_hash: GENESIS_HASH.into(),
            event_hash: "ab".repeat(32),
        };
        let event = row.into_event().unwrap();
        assert_eq!(event.action, Action::Reject);
        assert_eq!(event.actor_role, Role::Clerk);
        assert_eq!(event.previous_hash, GENESIS_HASH);
        assert_eq!(event.event_hash.len(), 64);
    }
}
