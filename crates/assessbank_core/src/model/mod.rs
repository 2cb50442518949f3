//! Assessment bank domain model.
//!
//! # Responsibility
//! - Define the versioned assessment/section/assignment shapes used by the
//!   reconciliation engine and the store.
//! - Keep the transient parsed-file shape (`Frontmatter`) next to the
//!   persisted ones so attribute comparison lives in one place.
//!
//! # Invariants
//! - Assignments are immutable once stored; edits create new assignments.
//! - Sections reference assignments by id and never own copies.
//! - At most one assessment per tag is latest after a batch completes.

pub mod assessment;
pub mod assignment;
pub mod frontmatter;
