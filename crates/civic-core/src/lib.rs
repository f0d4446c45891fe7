#![deny(missing_docs)]

//! # civic-core: Foundational Types for the Service Request Stack
//!
//! Every other crate in the workspace depends on this one. It has no internal
//! crate dependencies: only `serde`, `thiserror`, and `uuid`.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`RequestId`] cannot be passed
//!    where an [`ActorId`] is expected.
//!
//! 2. **One [`Role`] enum.** Roles are a closed set with no implied ordering.
//!    Authorization is decided by explicit role-set membership in the workflow
//!    transition table, never by comparing roles.
//!
//! 3. **Structured [`ValidationError`]s.** Constructors that can fail return a
//!    typed error carrying the rejected input.

pub mod actor;
pub mod error;
pub mod identity;

pub use actor::{Actor, Role};
pub use error::ValidationError;
pub use identity::{ActorId, DepartmentId, RequestId};
