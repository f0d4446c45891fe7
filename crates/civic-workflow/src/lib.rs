//! # civic-workflow: Service Request Lifecycle Engine
//!
//! The finite-state workflow that moves a service request from submission to
//! closure, decides who may drive each step, and reconciles concurrent edits.
//!
//! ## Components
//!
//! - **Transition table** (`table.rs`): the closed-world mapping
//!   `(status, action) → (next status, authorized roles, effect)`. Pure data.
//!
//! - **Engine** (`engine.rs`): validates an action against the table and the
//!   actor's role, then commits through the store. All policy is an explicit
//!   [`WorkflowPolicy`] value; there are no global switches.
//!
//! - **Store** (`store.rs`, `memory.rs`): [`RequestStore::commit`] is a
//!   compare-and-swap on the version counter and the only way to mutate a
//!   stored request. [`MemoryStore`] is the in-process implementation.
//!
//! - **Audit log** (`audit.rs`): gapless, hash-chained, per-request history,
//!   appended inside the same commit as the status change.
//!
//! ## Concurrency
//!
//! There is no lock manager and no cross-request coordination. Of two
//! callers racing from the same version, the store lets exactly one commit;
//! the other gets [`WorkflowError::VersionConflict`] and must re-read.

pub mod action;
pub mod audit;
pub mod engine;
pub mod error;
pub mod memory;
pub mod request;
pub mod status;
pub mod store;
pub mod table;

// ─── Re-exports ─────────────────────────────────────────────────────

pub use action::Action;
pub use audit::{
    verify_chain, AuditDraft, AuditEvent, AuditPage, AuditPageRequest, ChainVerification,
    GENESIS_HASH,
};
pub use engine::{
    plan_edit, plan_transition, EditCommand, TransitionCommand, WorkflowEngine, WorkflowPolicy,
};
pub use error::{StoreError, WorkflowError};
pub use memory::MemoryStore;
pub use request::{DetailsPatch, RequestDetails, ServiceRequest};
pub use status::RequestStatus;
pub use store::{AuditLog, ListFilter, Mutation, RequestStore, WorkflowStore};
pub use table::{Effect, TransitionRule};
