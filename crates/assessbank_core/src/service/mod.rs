//! Reconciliation services.
//!
//! # Responsibility
//! - Drive one batch of file changes through config sync, additions,
//!   deletions and modifications into a new assessment generation.
//! - Keep per-batch state (`batch`), persistence ordering (`commit`) and
//!   filesystem side effects (`rename`, `scan`) out of the engine.

pub mod batch;
pub mod commit;
pub mod error;
pub mod rename;
pub mod scan;
pub mod updater;
