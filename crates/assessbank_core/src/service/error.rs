//! Error taxonomy for reconciliation batches.
//!
//! - `Parsing`: a question file could not be turned into metadata.
//! - `Invariant`: the data or the request contradicts a catalog invariant.
//!   Always fatal; the batch transaction is rolled back.
//! - `Store` / `Db`: persistence failures.

use crate::db::DbError;
use crate::model::assessment::AssessmentKey;
use crate::model::assignment::AssignmentId;
use crate::parser::frontmatter::FileParsingError;
use crate::repo::assessment_repo::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An edit targets a tag that has no latest assessment.
    MissingLatestAssessment(String),
    /// An edit targets a tag retired earlier in the same batch.
    TagRetired(String),
    /// Config sync tried to create a second generation for one tag.
    DuplicateGeneration(String),
    /// Forking was requested from a non-latest generation.
    ForkFromHistorical(AssessmentKey),
    /// Two sections of one assessment share a title.
    DuplicateSectionTitle { tag: String, title: String },
    /// A modified file has no `_qid<N>` marker.
    ModifiedFileWithoutId(String),
    /// A modified file names an assignment id the store does not know.
    MissingAssignment { id: AssignmentId, path: String },
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingLatestAssessment(tag) => {
                write!(f, "no latest assessment exists for tag {tag}")
            }
            Self::TagRetired(tag) => {
                write!(f, "tag {tag} was retired in this batch and cannot be edited")
            }
            Self::DuplicateGeneration(tag) => {
                write!(f, "tag {tag} already has a pending generation in this batch")
            }
            Self::ForkFromHistorical(key) => {
                write!(f, "assessment {key} is not latest and cannot be forked")
            }
            Self::DuplicateSectionTitle { tag, title } => write!(
                f,
                "assessment for tag {tag} has multiple sections titled `{title}`"
            ),
            Self::ModifiedFileWithoutId(path) => {
                write!(f, "could not find qid for modified question file at {path}")
            }
            Self::MissingAssignment { id, path } => write!(
                f,
                "for modified file {path} with qid {id} there is no existing assignment"
            ),
        }
    }
}

impl Error for InvariantViolation {}

#[derive(Debug)]
pub enum UpdateError {
    Parsing(FileParsingError),
    Invariant(InvariantViolation),
    Store(StoreError),
    Db(DbError),
    Scan { path: PathBuf, source: std::io::Error },
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parsing(err) => write!(f, "parsing error: {err}"),
            Self::Invariant(err) => write!(f, "invariant violation: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Scan { path, source } => {
                write!(f, "failed to scan `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parsing(err) => Some(err),
            Self::Invariant(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Scan { source, .. } => Some(source),
        }
    }
}

impl From<FileParsingError> for UpdateError {
    fn from(value: FileParsingError) -> Self {
        Self::Parsing(value)
    }
}

impl From<InvariantViolation> for UpdateError {
    fn from(value: InvariantViolation) -> Self {
        Self::Invariant(value)
    }
}

impl From<StoreError> for UpdateError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<DbError> for UpdateError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for UpdateError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
