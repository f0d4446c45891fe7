//! # Audit Log
//!
//! Append-only, per-request history of committed transitions.
//!
//! The engine never writes an [`AuditEvent`] directly. It hands an
//! [`AuditDraft`] to the store inside the same `commit` as the status change;
//! the store assigns the next sequence number and seals the event into the
//! request's hash chain. A failed append fails the whole commit.
//!
//! ## Hash Chain
//!
//! Each event's hash covers the previous event's hash plus every field of the
//! event, so rewriting or dropping any past event breaks every later link.
//! The first event of a request chains from [`GENESIS_HASH`].

use chrono::{DateTime, Utc};
use civic_core::{ActorId, RequestId, Role};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::action::Action;
use crate::status::RequestStatus;

/// Previous-hash value of the first event of every request.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A transition about to be recorded, before the store has sequenced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    /// Action that was applied.
    pub action: Action,
    /// Status before the transition.
    pub from_status: RequestStatus,
    /// Status after the transition.
    pub to_status: RequestStatus,
    /// Who applied it.
    pub actor_id: ActorId,
    /// Role they acted in.
    pub actor_role: Role,
    /// Optional free-text explanation.
    pub reason: Option<String>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

impl AuditDraft {
    /// Assign the sequence number and chain hash, producing the immutable event.
    pub fn seal(self, request_id: RequestId, sequence_number: u64, previous_hash: &str) -> AuditEvent {
        let event_hash = chain_hash(
            previous_hash,
            &request_id,
            sequence_number,
            &self,
        );
        AuditEvent {
            request_id,
            sequence_number,
            action: self.action,
            from_status: self.from_status,
            to_status: self.to_status,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            reason: self.reason,
            created_at: self.created_at,
            previous_hash: previous_hash.to_string(),
            event_hash,
        }
    }
}

/// One committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Request the transition applied to.
    pub request_id: RequestId,
    /// Position in the request's history, starting at 1, gapless.
    pub sequence_number: u64,
    /// Action that was applied.
    pub action: Action,
    /// Status before the transition.
    pub from_status: RequestStatus,
    /// Status after the transition.
    pub to_status: RequestStatus,
    /// Who applied it.
    pub actor_id: ActorId,
    /// Role they acted in.
    pub actor_role: Role,
    /// Optional free-text explanation.
    pub reason: Option<String>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
    /// Hash of the preceding event, or [`GENESIS_HASH`].
    pub previous_hash: String,
    /// Hash of this event.
    pub event_hash: String,
}

impl AuditEvent {
    /// Recompute this event's hash from its contents.
    pub fn recompute_hash(&self) -> String {
        let draft = AuditDraft {
            action: self.action,
            from_status: self.from_status,
            to_status: self.to_status,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            reason: self.reason.clone(),
            created_at: self.created_at,
        };
        chain_hash(
            &self.previous_hash,
            &self.request_id,
            self.sequence_number,
            &draft,
        )
    }
}

/// SHA-256 over the previous hash and every field of the event.
///
/// Fields are separated by `|`; the reason is length-prefixed so a `|` inside
/// free text cannot forge a boundary. Timestamps are hashed at microsecond
/// precision, which is what PostgreSQL `TIMESTAMPTZ` preserves.
fn chain_hash(
    previous_hash: &str,
    request_id: &RequestId,
    sequence_number: u64,
    draft: &AuditDraft,
) -> String {
    let reason = draft.reason.as_deref().unwrap_or("");
    let input = format!(
        "{previous_hash}|{request_id}|{sequence_number}|{}|{}|{}|{}|{}|{}:{reason}|{}",
        draft.action,
        draft.from_status,
        draft.to_status,
        draft.actor_id,
        draft.actor_role,
        reason.len(),
        draft.created_at.timestamp_micros(),
    );
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Result of walking a request's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    /// Number of events inspected.
    pub total_events: usize,
    /// Sequence number of the first event that fails verification, if any.
    pub first_broken: Option<u64>,
}

impl ChainVerification {
    /// Whether every link verified.
    pub fn is_valid(&self) -> bool {
        self.first_broken.is_none()
    }
}

/// Verify an ordered, complete history of one request.
///
/// Checks sequence continuity (1, 2, 3, ...), previous-hash linkage, and each
/// event's own hash.
pub fn verify_chain(events: &[AuditEvent]) -> ChainVerification {
    let mut expected_prev = GENESIS_HASH;
    let mut first_broken = None;

    for (i, event) in events.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        let intact = event.sequence_number == expected_seq
            && event.previous_hash == expected_prev
            && event.recompute_hash() == event.event_hash;
        if !intact {
            first_broken = Some(event.sequence_number);
            break;
        }
        expected_prev = &event.event_hash;
    }

    ChainVerification {
        total_events: events.len(),
        first_broken,
    }
}

/// Restartable page request over one request's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPageRequest {
    /// Return events with a sequence number strictly greater than this.
    pub after: Option<u64>,
    /// Maximum number of events to return.
    pub limit: usize,
}

impl AuditPageRequest {
    /// Default page size.
    pub const DEFAULT_LIMIT: usize = 100;
    /// Largest page a caller may request.
    pub const MAX_LIMIT: usize = 1000;

    /// Build a page request, clamping `limit` into `1..=MAX_LIMIT`.
    pub fn new(after: Option<u64>, limit: Option<usize>) -> Self {
        Self {
            after,
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    /// The whole history from the start, one maximal page at a time.
    pub fn first() -> Self {
        Self::new(None, None)
    }

    /// Sequence number of the first event this page may contain.
    pub fn start_sequence(&self) -> u64 {
        self.after.map_or(1, |a| a.saturating_add(1))
    }
}

impl Default for AuditPageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// One page of a request's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPage {
    /// Events in ascending sequence order.
    pub events: Vec<AuditEvent>,
    /// Pass as `after` to fetch the next page; `None` when this page is the last.
    pub next_after: Option<u64>,
}

impl AuditPage {
    /// Slice a complete, ordered history into the requested page.
    pub fn from_history(history: &[AuditEvent], page: AuditPageRequest) -> Self {
        let start = page.start_sequence();
        let events: Vec<AuditEvent> = history
            .iter()
            .filter(|e| e.sequence_number >= start)
            .take(page.limit)
            .cloned()
            .collect();
        let last_seen = events.last().map(|e| e.sequence_number);
        let more = match last_seen {
            Some(last) => history.iter().any(|e| e.sequence_number > last),
            None => false,
        };
        Self {
            next_after: if more { last_seen } else { None },
            events,
        }
    }
}
