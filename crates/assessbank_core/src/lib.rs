//! Core engine for the versioned assessment bank.
//! Question files in, immutable assessment generations out.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod service;

pub use config::{BankConfig, ConfigError, DEFAULT_CONFIG_FILE};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::assessment::{Assessment, AssessmentKey, Section};
pub use model::assignment::{Assignment, AssignmentId, AssignmentRef, AssignmentType};
pub use model::frontmatter::Frontmatter;
pub use parser::frontmatter::{FileParsingError, FrontmatterError, FrontmatterParser};
pub use repo::assessment_repo::{
    AssessmentStore, SqliteAssessmentStore, StoreError, StoreResult,
};
pub use service::error::{InvariantViolation, UpdateError};
pub use service::rename::{RenameFailure, RenameReport};
pub use service::scan::collect_question_files;
pub use service::updater::{AssessmentUpdater, ChangeSet, ParsedChanges, UpdateReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
