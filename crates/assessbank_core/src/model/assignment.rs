//! Assignment (content item) model.
//!
//! # Invariants
//! - `id` is generated by the store on first persistence and never changes.
//! - A stored assignment is never edited; changed attributes produce a new
//!   row and historical assessments keep pointing at the old one.

use std::fmt::{Display, Formatter};

/// Store-generated numeric identifier, also embedded in filenames as `_qid<N>`.
pub type AssignmentId = i64;

/// Index of an assignment created during the current batch.
///
/// Only meaningful inside one `PendingBatch`; resolved to a stored id on
/// commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingAssignmentId(pub usize);

/// Question kind declared in a file's frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentType {
    MultipleChoice,
    Open,
    Coding,
}

impl AssignmentType {
    const ALL: [AssignmentType; 3] = [Self::MultipleChoice, Self::Open, Self::Coding];

    /// Parses a frontmatter `type` label (`multiple-choice`, `multipleChoice`,
    /// `open`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.matches_option(label))
    }

    /// Column value stored in `assignments.assignment_type`.
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::Open => "open",
            Self::Coding => "coding",
        }
    }

    /// Inverse of [`AssignmentType::as_db_str`].
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "multiple_choice" => Some(Self::MultipleChoice),
            "open" => Some(Self::Open),
            "coding" => Some(Self::Coding),
            _ => None,
        }
    }

    /// Whether a config question option (`multiple-choice`, `multipleChoice`,
    /// `multiple_choice`, ...) names this type.
    pub fn matches_option(self, option: &str) -> bool {
        let normalized: String = option
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let own: String = self.as_db_str().chars().filter(|c| *c != '_').collect();
        normalized == own
    }
}

impl Display for AssignmentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::MultipleChoice => "multiple-choice",
            Self::Open => "open",
            Self::Coding => "coding",
        };
        f.write_str(label)
    }
}

/// Persisted assignment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: AssignmentId,
    /// Source path with the `_qid<N>` marker removed.
    pub base_file_path: String,
    pub assignment_type: AssignmentType,
    pub available_points: i64,
    /// Optional time limit.
    pub available_seconds: Option<i64>,
}

/// Assignment created in the current batch, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentDraft {
    pub base_file_path: String,
    pub assignment_type: AssignmentType,
    pub available_points: i64,
    pub available_seconds: Option<i64>,
}

/// Reference held by a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentRef {
    Stored(AssignmentId),
    Pending(PendingAssignmentId),
}

impl AssignmentRef {
    pub fn stored_id(self) -> Option<AssignmentId> {
        match self {
            Self::Stored(id) => Some(id),
            Self::Pending(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AssignmentType;

    #[test]
    fn type_roundtrips_through_db_value() {
        for kind in [
            AssignmentType::MultipleChoice,
            AssignmentType::Open,
            AssignmentType::Coding,
        ] {
            assert_eq!(AssignmentType::from_db_str(kind.as_db_str()), Some(kind));
        }
        assert_eq!(AssignmentType::from_db_str("essay"), None);
    }

    #[test]
    fn config_option_spellings_match() {
        assert!(AssignmentType::MultipleChoice.matches_option("multiple-choice"));
        assert!(AssignmentType::MultipleChoice.matches_option("multipleChoice"));
        assert!(AssignmentType::Open.matches_option("Open"));
        assert!(!AssignmentType::Open.matches_option("coding"));
    }

    #[test]
    fn labels_parse_in_every_spelling() {
        assert_eq!(
            AssignmentType::from_label("multiple-choice"),
            Some(AssignmentType::MultipleChoice)
        );
        assert_eq!(
            AssignmentType::from_label("multipleChoice"),
            Some(AssignmentType::MultipleChoice)
        );
        assert_eq!(AssignmentType::from_label("open"), Some(AssignmentType::Open));
        assert_eq!(AssignmentType::from_label("essay"), None);
    }
}
