//! Repository layer: the persistent store contract and its SQLite backend.
//!
//! # Responsibility
//! - Define the lookup/write operations the reconciliation engine needs.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Stored assignments are insert-only.
//! - Writes happen on the caller's connection or transaction; the store
//!   never commits on its own.

pub mod assessment_repo;
